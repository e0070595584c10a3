//! Error types for the shared helpers

use thiserror::Error;

/// Errors raised by the kube helpers
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// A wait did not observe its condition in time
    #[error("timed out after {timeout_secs}s waiting for {what}")]
    Timeout {
        /// What was being waited on
        what: String,
        /// Configured timeout in seconds
        timeout_secs: u64,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Operation that failed (e.g. "create_client")
        context: String,
        /// Description of what failed
        message: String,
    },
}

impl Error {
    /// Create an internal error tagged with the operation that produced it
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            context: context.into(),
            message: msg.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(what: impl Into<String>, timeout: std::time::Duration) -> Self {
        Self::Timeout {
            what: what.into(),
            timeout_secs: timeout.as_secs(),
        }
    }
}
