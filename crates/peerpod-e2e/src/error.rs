//! Error types for the e2e harness
//!
//! Every variant is fatal to the test case that raised it. The one tolerated
//! condition (a job that completed once amid start errors) is not an error at
//! all; it surfaces as [`crate::Outcome::Skipped`].

use std::time::Duration;

use thiserror::Error;

/// Harness result type
pub type Result<T> = std::result::Result<T, HarnessError>;

/// Reasons a test case fails
#[derive(Debug, Error)]
pub enum HarnessError {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// Error from the shared kube helpers
    #[error(transparent)]
    Common(#[from] peerpod_common::Error),

    /// A fatal wait ran out of time
    #[error("timed out after {}s waiting for {what}", timeout.as_secs())]
    Timeout {
        /// What was being waited on
        what: String,
        /// Configured timeout
        timeout: Duration,
    },

    /// A command could not be executed in a container
    #[error("exec of {command:?} in {pod}/{container} failed: {message}")]
    Exec {
        /// Pod the command ran in
        pod: String,
        /// Container the command ran in
        container: String,
        /// argv of the command
        command: Vec<String>,
        /// Failure reported by the API server or the stream
        message: String,
    },

    /// A verification command's stdout failed its predicate
    #[error("Command {command:?} running in container {container} produced unexpected output on stdout: {stdout}")]
    UnexpectedOutput {
        /// argv of the command
        command: Vec<String>,
        /// Container the command ran in
        container: String,
        /// Captured stdout
        stdout: String,
    },

    /// The pod under test was not found when listing its namespace
    #[error("pod {namespace}/{name} not found")]
    PodNotFound {
        /// Namespace searched
        namespace: String,
        /// Pod name
        name: String,
    },

    /// The workload is not backed by a PodVM
    #[error("no PodVM backs pod {pod}: {message}")]
    MissingPodVm {
        /// Pod that was checked
        pod: String,
        /// Why the assertion failed
        message: String,
    },

    /// Every pod of a job failed to start
    #[error("job {job} failed: {message}")]
    JobFailed {
        /// Job name
        job: String,
        /// Description of the failure
        message: String,
    },

    /// Workload logs did not contain what the case expected
    #[error("logs of pod {pod} do not contain {expected:?}: {actual:?}")]
    LogMismatch {
        /// Pod whose logs were read
        pod: String,
        /// Expected substring
        expected: String,
        /// Logs actually read
        actual: String,
    },

    /// Setup precondition not met (e.g. a service has no endpoints)
    #[error("setup failed: {0}")]
    Setup(String),

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Operation that failed
        context: String,
        /// Description of what failed
        message: String,
    },
}

impl HarnessError {
    /// Create an exec error
    pub fn exec(
        pod: impl Into<String>,
        container: impl Into<String>,
        command: &[String],
        message: impl Into<String>,
    ) -> Self {
        Self::Exec {
            pod: pod.into(),
            container: container.into(),
            command: command.to_vec(),
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(what: impl Into<String>, timeout: Duration) -> Self {
        Self::Timeout {
            what: what.into(),
            timeout,
        }
    }

    /// Create an internal error tagged with the operation that produced it
    pub fn internal(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Internal {
            context: context.into(),
            message: message.into(),
        }
    }

    /// Whether the failure was a timeout, from either this crate or the shared helpers
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::Common(peerpod_common::Error::Timeout { .. })
        )
    }
}
