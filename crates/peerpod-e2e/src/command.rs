//! Verification commands executed inside a running test pod

use std::fmt;
use std::sync::Arc;

use tracing::{error, info};

type StdoutPredicate = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// A command to run in a container plus the check applied to its stdout
#[derive(Clone)]
pub struct TestCommand {
    container: String,
    command: Vec<String>,
    predicate: StdoutPredicate,
}

impl TestCommand {
    /// Build a command with an arbitrary stdout predicate
    pub fn new<S, F>(container: impl Into<String>, command: &[S], predicate: F) -> Self
    where
        S: AsRef<str>,
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        Self {
            container: container.into(),
            command: command.iter().map(|s| s.as_ref().to_string()).collect(),
            predicate: Arc::new(predicate),
        }
    }

    /// Succeeds when stdout is exactly `expected`
    ///
    /// `what` names the value in the log lines (e.g. "Username from secret").
    pub fn stdout_equals<S: AsRef<str>>(
        container: impl Into<String>,
        command: &[S],
        what: &str,
        expected: &str,
    ) -> Self {
        let what = what.to_string();
        let expected = expected.to_string();
        Self::new(container, command, move |stdout| {
            if stdout == expected {
                info!("{} inside pod: {}", what, stdout);
                true
            } else {
                error!("{} unexpected. Expected {}, got {}", what, expected, stdout);
                false
            }
        })
    }

    /// Succeeds when the command printed anything at all
    pub fn stdout_not_empty<S: AsRef<str>>(
        container: impl Into<String>,
        command: &[S],
        what: &str,
    ) -> Self {
        let what = what.to_string();
        Self::new(container, command, move |stdout| {
            if stdout.is_empty() {
                info!("No output from {}", what);
                false
            } else {
                info!("Output of {}: {}", what, stdout);
                true
            }
        })
    }

    /// Target container
    pub fn container(&self) -> &str {
        &self.container
    }

    /// argv
    pub fn command(&self) -> &[String] {
        &self.command
    }

    /// Apply the stdout predicate
    pub fn check(&self, stdout: &str) -> bool {
        (self.predicate)(stdout)
    }
}

impl fmt::Debug for TestCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestCommand")
            .field("container", &self.container)
            .field("command", &self.command)
            .finish_non_exhaustive()
    }
}
