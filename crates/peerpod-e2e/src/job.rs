//! Classification of the pods a batch job spawned
//!
//! PodVM creation can fail transiently, so a job may leave behind pods whose
//! container never started alongside the retry that finally ran. These
//! helpers count both kinds and decide whether the case fails, is skipped,
//! or goes on to check the job's output.

use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;

/// Label the job controller puts on every pod it creates
pub const JOB_NAME_LABEL: &str = "job-name";
/// Termination reason of a container that never started
pub const REASON_START_ERROR: &str = "StartError";
/// Termination reason of a container that exited successfully
pub const REASON_COMPLETED: &str = "Completed";

/// Tally of a job's pods by how their containers terminated
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct JobPodCounts {
    /// Pods listed for the job
    pub total: usize,
    /// Pods with at least one container that terminated with `StartError`
    pub errored: usize,
    /// Pods with at least one container that terminated with `Completed`
    pub completed: usize,
    /// Name of the first completed pod, whose logs carry the job output
    pub completed_pod: Option<String>,
}

/// What the counts mean for the test case
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JobVerdict {
    /// No pod ran; the case fails
    Failed(String),
    /// Exactly one pod completed after start errors; the case is skipped
    /// once the output has been checked
    CompletedAfterRetry,
    /// Check the completed pod's output
    CheckOutput,
}

/// Selector matching every pod of `job`
pub fn job_pod_selector(job: &str) -> String {
    format!("{}={}", JOB_NAME_LABEL, job)
}

fn terminated_reasons(pod: &Pod) -> impl Iterator<Item = &str> {
    pod.status
        .iter()
        .flat_map(|s| s.container_statuses.iter().flatten())
        .filter_map(|cs| cs.state.as_ref())
        .filter_map(|state| state.terminated.as_ref())
        .filter_map(|t| t.reason.as_deref())
}

/// Count how the job's pods terminated
pub fn count_job_pods(pods: &[Pod]) -> JobPodCounts {
    let mut counts = JobPodCounts {
        total: pods.len(),
        ..Default::default()
    };

    // A pod counts once per reason, however many of its containers hit it
    for pod in pods {
        if terminated_reasons(pod).any(|r| r == REASON_START_ERROR) {
            counts.errored += 1;
        }
        if terminated_reasons(pod).any(|r| r == REASON_COMPLETED) {
            counts.completed += 1;
            if counts.completed_pod.is_none() {
                counts.completed_pod = Some(pod.name_any());
            }
        }
    }

    counts
}

impl JobPodCounts {
    /// Decide the fate of the case from the counts
    pub fn verdict(&self) -> JobVerdict {
        if self.total == 0 {
            return JobVerdict::Failed("no pods found for job".to_string());
        }
        if self.completed == 0 && self.errored >= self.total {
            return JobVerdict::Failed(format!(
                "all {} pod(s) terminated with {}",
                self.total, REASON_START_ERROR
            ));
        }
        if self.completed == 0 {
            return JobVerdict::Failed(format!(
                "none of {} pod(s) terminated with {}",
                self.total, REASON_COMPLETED
            ));
        }
        if self.completed == 1 && self.errored >= 1 {
            return JobVerdict::CompletedAfterRetry;
        }
        JobVerdict::CheckOutput
    }
}
