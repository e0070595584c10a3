//! Run-all-and-report execution of a suite of test cases
//!
//! Each case runs to completion regardless of earlier failures; the summary
//! at the end lists every case with its status and duration.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::FutureExt;
use tokio::time::Instant;
use tracing::info;

use crate::{Outcome, Result};

/// Final status of one case
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Status {
    /// Every check held
    Passed,
    /// Ran to the end but did not count as a pass; carries the reason
    Skipped(String),
    /// Returned an error or panicked; carries the message
    Failed(String),
}

impl Status {
    fn tag(&self) -> &'static str {
        match self {
            Status::Passed => "PASS",
            Status::Skipped(_) => "SKIP",
            Status::Failed(_) => "FAIL",
        }
    }

    fn detail(&self) -> Option<&str> {
        match self {
            Status::Passed => None,
            Status::Skipped(reason) => Some(reason),
            Status::Failed(error) => Some(error),
        }
    }
}

/// Recorded result of one case
#[derive(Clone, Debug)]
pub struct TestResult {
    /// Case name as passed to [`TestHarness::run`]
    pub name: String,
    /// How the case ended
    pub status: Status,
    /// Wall-clock time the case took
    pub duration: Duration,
}

/// Collects case results and prints the suite summary
#[derive(Clone)]
pub struct TestHarness {
    suite: String,
    results: Arc<Mutex<Vec<TestResult>>>,
}

const MAX_DETAIL_LEN: usize = 200;

impl TestHarness {
    /// Empty harness for the suite named `suite`
    pub fn new(suite: &str) -> Self {
        Self {
            suite: suite.to_string(),
            results: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn results(&self) -> MutexGuard<'_, Vec<TestResult>> {
        self.results.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Run one case, recording a panic as a failure
    pub async fn run<F, Fut>(&self, name: &str, f: F)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Outcome>>,
    {
        let start = Instant::now();
        let status = match AssertUnwindSafe(f()).catch_unwind().await {
            Ok(Ok(Outcome::Passed)) => Status::Passed,
            Ok(Ok(Outcome::Skipped(reason))) => Status::Skipped(reason),
            Ok(Err(e)) => Status::Failed(e.to_string()),
            Err(panic) => {
                let msg = if let Some(s) = panic.downcast_ref::<&str>() {
                    s.to_string()
                } else if let Some(s) = panic.downcast_ref::<String>() {
                    s.clone()
                } else {
                    "unknown panic".to_string()
                };
                Status::Failed(format!("PANIC: {msg}"))
            }
        };
        self.record(name, status, start.elapsed());
    }

    /// Record a result for a case run outside [`TestHarness::run`]
    pub fn record(&self, name: &str, status: Status, duration: Duration) {
        self.results().push(TestResult {
            name: name.to_string(),
            status,
            duration,
        });
    }

    /// Snapshot of the results recorded so far
    pub fn results_snapshot(&self) -> Vec<TestResult> {
        self.results().clone()
    }

    /// Log the summary; errors if any case failed
    pub fn finish(&self) -> std::result::Result<(), String> {
        let results = self.results();
        let total_duration: Duration = results.iter().map(|r| r.duration).sum();
        let count = |f: fn(&Status) -> bool| results.iter().filter(|r| f(&r.status)).count();
        let passed = count(|s| matches!(s, Status::Passed));
        let skipped = count(|s| matches!(s, Status::Skipped(_)));
        let failed = count(|s| matches!(s, Status::Failed(_)));

        info!("========================================");
        info!("  {}", self.suite.to_uppercase());
        info!("========================================");
        for r in results.iter() {
            info!(
                "  {}  {:40} {:.1}s",
                r.status.tag(),
                r.name,
                r.duration.as_secs_f64()
            );
            if let Some(detail) = r.status.detail() {
                let truncated: String = detail.chars().take(MAX_DETAIL_LEN).collect();
                info!("        -> {truncated}");
            }
        }
        info!("----------------------------------------");
        info!(
            "  {} passed, {} skipped, {} failed ({:.1}s total)",
            passed,
            skipped,
            failed,
            total_duration.as_secs_f64()
        );
        info!("========================================");

        if failed > 0 {
            let failures: Vec<_> = results
                .iter()
                .filter(|r| matches!(r.status, Status::Failed(_)))
                .map(|r| r.name.as_str())
                .collect();
            Err(format!(
                "{} test(s) failed in {}: {}",
                failed,
                self.suite,
                failures.join(", ")
            ))
        } else {
            Ok(())
        }
    }
}
