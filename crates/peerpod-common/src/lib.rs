//! Shared plumbing for the peer-pod test tooling
//!
//! - [`telemetry`] - tracing subscriber setup honouring `RUST_LOG` / `LOG_LEVEL`
//! - [`kube_utils`] - kube client construction, polling and readiness waits
//! - [`error`] - error type shared by the helpers in this crate

pub mod error;
pub mod kube_utils;
pub mod telemetry;

pub use error::Error;

/// Result type alias using the common Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Runtime class that schedules a pod into its own PodVM
pub const PEER_POD_RUNTIME_CLASS: &str = "kata-remote";
