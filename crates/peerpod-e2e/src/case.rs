//! Test case runner
//!
//! A [`TestCase`] groups one workload (a pod, or a batch job), an optional
//! config map and secret, and the commands used to verify the workload from
//! the inside. [`TestCase::run`] drives it through setup, assessment and
//! teardown against a [`ClusterClient`]:
//!
//! ```text
//! setup:    namespace -> config map -> secret -> pod (wait Running) | job (wait Complete)
//! assess:   PodVM check -> exec each command | count job pods -> check job log
//! teardown: pod | job+pods -> config map -> secret -> namespace
//! ```
//!
//! Teardown always runs once setup has started and only deletes what this
//! run created.

use std::time::Duration;

use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{ConfigMap, Pod, Secret};
use kube::ResourceExt;
use tracing::{error, info, warn};

use crate::assert::CloudAssert;
use crate::client::ClusterClient;
use crate::command::TestCommand;
use crate::job::{count_job_pods, job_pod_selector, JobVerdict};
use crate::{HarnessError, Result};

/// How long setup waits for a pod to reach `Running`
pub const WAIT_POD_RUNNING_TIMEOUT: Duration = Duration::from_secs(300);
/// How long setup waits for a job to complete before moving on
pub const WAIT_JOB_COMPLETE_TIMEOUT: Duration = Duration::from_secs(300);

/// Timeouts applied by the runner
#[derive(Clone, Debug)]
pub struct HarnessConfig {
    /// Fatal: the case fails if the pod is not running in time
    pub pod_running_timeout: Duration,
    /// Not fatal: a job still running after this is only logged
    pub job_complete_timeout: Duration,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            pod_running_timeout: WAIT_POD_RUNNING_TIMEOUT,
            job_complete_timeout: WAIT_JOB_COMPLETE_TIMEOUT,
        }
    }
}

/// What a test case runs
#[derive(Clone, Debug)]
pub enum Workload {
    /// A standalone pod, verified by exec'ing commands into it
    Pod(Pod),
    /// A batch job, verified through its pods' termination states and logs
    Job {
        /// The job to submit
        job: Job,
        /// Substring the completed pod's log must contain
        expected_log: String,
    },
}

impl Workload {
    fn name(&self) -> String {
        match self {
            Workload::Pod(pod) => pod.name_any(),
            Workload::Job { job, .. } => job.name_any(),
        }
    }

    fn namespace(&self) -> Option<String> {
        match self {
            Workload::Pod(pod) => pod.namespace(),
            Workload::Job { job, .. } => job.namespace(),
        }
    }
}

/// Successful end states of a test case
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Every check held
    Passed,
    /// Checks held but the run is not trustworthy enough to count as a pass
    Skipped(String),
}

/// Objects setup actually created, consulted by teardown
#[derive(Clone, Debug, Default, PartialEq, Eq)]
struct CreatedObjects {
    namespace: bool,
    config_map: bool,
    secret: bool,
    pod: bool,
    job: bool,
}

/// Collects deletion results during teardown, keeping the first failure
#[derive(Default)]
pub(crate) struct Deletions {
    first_error: Option<HarnessError>,
}

impl Deletions {
    pub(crate) fn record(&mut self, result: Result<()>, what: &str, name: &str) {
        match result {
            Ok(()) => info!("Deleting {}... {}", what, name),
            Err(e) => {
                error!(error = %e, "Failed to delete {} {}", what, name);
                self.first_error.get_or_insert(e);
            }
        }
    }

    pub(crate) fn finish(self) -> Result<()> {
        match self.first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Merge the run result with the teardown result; the earlier error wins
pub(crate) fn settle(case: &str, result: Result<Outcome>, teardown: Result<()>) -> Result<Outcome> {
    match (result, teardown) {
        (Ok(outcome), Ok(())) => Ok(outcome),
        (Ok(_), Err(e)) => Err(e),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(teardown_err)) => {
            error!(case = %case, error = %teardown_err, "Teardown failed after earlier failure");
            Err(e)
        }
    }
}

/// One end-to-end scenario
#[derive(Clone, Debug)]
pub struct TestCase {
    assess_message: String,
    workload: Workload,
    config_map: Option<ConfigMap>,
    secret: Option<Secret>,
    test_commands: Vec<TestCommand>,
    config: HarnessConfig,
}

impl TestCase {
    /// Case around a standalone pod
    pub fn new(assess_message: impl Into<String>, pod: Pod) -> Self {
        Self::with_workload(assess_message, Workload::Pod(pod))
    }

    /// Case around a batch job whose completed pod must log `expected_log`
    pub fn new_job(
        assess_message: impl Into<String>,
        job: Job,
        expected_log: impl Into<String>,
    ) -> Self {
        Self::with_workload(
            assess_message,
            Workload::Job {
                job,
                expected_log: expected_log.into(),
            },
        )
    }

    fn with_workload(assess_message: impl Into<String>, workload: Workload) -> Self {
        Self {
            assess_message: assess_message.into(),
            workload,
            config_map: None,
            secret: None,
            test_commands: Vec::new(),
            config: HarnessConfig::default(),
        }
    }

    /// Create `config_map` before the workload
    pub fn with_config_map(mut self, config_map: ConfigMap) -> Self {
        self.config_map = Some(config_map);
        self
    }

    /// Create `secret` before the workload
    pub fn with_secret(mut self, secret: Secret) -> Self {
        self.secret = Some(secret);
        self
    }

    /// Commands executed, in order, once the pod is running
    pub fn with_test_commands(mut self, test_commands: Vec<TestCommand>) -> Self {
        self.test_commands = test_commands;
        self
    }

    /// Override the runner timeouts
    pub fn with_config(mut self, config: HarnessConfig) -> Self {
        self.config = config;
        self
    }

    /// Human-readable case name, e.g. "nginx Pod"
    pub fn name(&self) -> String {
        match &self.workload {
            Workload::Pod(pod) => format!("{} Pod", pod.name_any()),
            Workload::Job { job, .. } => format!("{} Job", job.name_any()),
        }
    }

    /// Message describing what the assessment proves
    pub fn assess_message(&self) -> &str {
        &self.assess_message
    }

    /// Run setup, assessment and teardown
    ///
    /// The first failure aborts the remaining setup/assessment steps;
    /// teardown still runs. If teardown fails too, its error is logged and
    /// the earlier one returned.
    pub async fn run(
        self,
        client: &dyn ClusterClient,
        assert: &dyn CloudAssert,
    ) -> Result<Outcome> {
        let namespace = self.workload.namespace().ok_or_else(|| {
            HarnessError::internal("run", format!("{} has no namespace", self.name()))
        })?;
        let case = self.name();

        info!(case = %case, "Setup");
        let mut created = CreatedObjects::default();
        let result = match self.setup(client, &namespace, &mut created).await {
            Ok(()) => {
                info!(case = %case, "Assess: {}", self.assess_message);
                self.assess(client, assert, &namespace).await
            }
            Err(e) => Err(e),
        };

        info!(case = %case, "Teardown");
        let teardown = self.teardown(client, &namespace, &created).await;

        settle(&case, result, teardown)
    }

    async fn setup(
        &self,
        client: &dyn ClusterClient,
        namespace: &str,
        created: &mut CreatedObjects,
    ) -> Result<()> {
        created.namespace = client.ensure_namespace(namespace).await?;

        if let Some(config_map) = &self.config_map {
            client.create_config_map(config_map).await?;
            created.config_map = true;
        }

        if let Some(secret) = &self.secret {
            client.create_secret(secret).await?;
            created.secret = true;
        }

        let name = self.workload.name();
        match &self.workload {
            Workload::Pod(pod) => {
                client.create_pod(pod).await?;
                created.pod = true;
                client
                    .wait_for_pod_running(namespace, &name, self.config.pod_running_timeout)
                    .await?;
            }
            Workload::Job { job, .. } => {
                client.create_job(job).await?;
                created.job = true;
                match client
                    .wait_for_job_complete(namespace, &name, self.config.job_complete_timeout)
                    .await
                {
                    Ok(()) => {}
                    Err(e) if e.is_timeout() => {
                        warn!(job = %name, error = %e, "Job did not complete in time, assessing anyway");
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        Ok(())
    }

    async fn assess(
        &self,
        client: &dyn ClusterClient,
        assert: &dyn CloudAssert,
        namespace: &str,
    ) -> Result<Outcome> {
        match &self.workload {
            Workload::Pod(pod) => self.assess_pod(client, assert, namespace, &pod.name_any()).await,
            Workload::Job { job, expected_log } => {
                self.assess_job(client, namespace, &job.name_any(), expected_log)
                    .await
            }
        }
    }

    async fn assess_pod(
        &self,
        client: &dyn ClusterClient,
        assert: &dyn CloudAssert,
        namespace: &str,
        pod: &str,
    ) -> Result<Outcome> {
        assert.has_pod_vm(namespace, pod).await?;

        let pods = client.list_pods(namespace, "").await?;
        if !pods.iter().any(|p| p.name_any() == pod) {
            return Err(HarnessError::PodNotFound {
                namespace: namespace.to_string(),
                name: pod.to_string(),
            });
        }

        for test_command in &self.test_commands {
            let output = client
                .exec_in_pod(namespace, pod, test_command.container(), test_command.command())
                .await
                .inspect_err(|e| error!(pod = %pod, error = %e, "Exec failed"))?;

            if !test_command.check(&output.stdout) {
                return Err(HarnessError::UnexpectedOutput {
                    command: test_command.command().to_vec(),
                    container: test_command.container().to_string(),
                    stdout: output.stdout,
                });
            }
        }

        Ok(Outcome::Passed)
    }

    async fn assess_job(
        &self,
        client: &dyn ClusterClient,
        namespace: &str,
        job: &str,
        expected_log: &str,
    ) -> Result<Outcome> {
        let pods = client.list_pods(namespace, &job_pod_selector(job)).await?;
        let counts = count_job_pods(&pods);
        info!(
            job = %job,
            total = counts.total,
            errored = counts.errored,
            completed = counts.completed,
            "Job pods"
        );

        let verdict = counts.verdict();
        if let JobVerdict::Failed(message) = verdict {
            return Err(HarnessError::JobFailed {
                job: job.to_string(),
                message,
            });
        }

        let completed_pod = counts.completed_pod.as_deref().ok_or_else(|| {
            HarnessError::internal("assess_job", "completed count without a completed pod")
        })?;
        let logs = client
            .logs_after_started_event(namespace, completed_pod)
            .await?;
        if !logs.contains(expected_log) {
            return Err(HarnessError::LogMismatch {
                pod: completed_pod.to_string(),
                expected: expected_log.to_string(),
                actual: logs,
            });
        }
        info!(job = %job, pod = %completed_pod, "Job output: {}", logs.trim());

        match verdict {
            JobVerdict::CompletedAfterRetry => Ok(Outcome::Skipped(format!(
                "job {} completed only after {} start error(s); expected completion on the first attempt",
                job, counts.errored
            ))),
            _ => Ok(Outcome::Passed),
        }
    }

    /// Delete everything setup created, attempting every deletion and
    /// returning the first error
    ///
    /// Config maps and secrets are deleted from the namespace they were
    /// created in, which may differ from the workload's.
    async fn teardown(
        &self,
        client: &dyn ClusterClient,
        namespace: &str,
        created: &CreatedObjects,
    ) -> Result<()> {
        let mut deletions = Deletions::default();

        let name = self.workload.name();
        if created.pod {
            deletions.record(client.delete_pod(namespace, &name).await, "pod", &name);
        }
        if created.job {
            deletions.record(client.delete_job(namespace, &name).await, "job", &name);
        }

        if let Some(config_map) = self.config_map.as_ref().filter(|_| created.config_map) {
            let cm_name = config_map.name_any();
            let cm_namespace = config_map.namespace().unwrap_or_else(|| namespace.to_string());
            deletions.record(
                client.delete_config_map(&cm_namespace, &cm_name).await,
                "Configmap",
                &cm_name,
            );
        }

        if let Some(secret) = self.secret.as_ref().filter(|_| created.secret) {
            let secret_name = secret.name_any();
            let secret_namespace = secret.namespace().unwrap_or_else(|| namespace.to_string());
            deletions.record(
                client.delete_secret(&secret_namespace, &secret_name).await,
                "Secret",
                &secret_name,
            );
        }

        if created.namespace {
            deletions.record(client.delete_namespace(namespace).await, "namespace", namespace);
        }

        deletions.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use k8s_openapi::api::core::v1::{
        ContainerState, ContainerStateTerminated, ContainerStatus, PodStatus,
    };
    use kube::api::ObjectMeta;
    use mockall::Sequence;

    use crate::assert::MockCloudAssert;
    use crate::client::{ExecOutput, MockClusterClient};
    use crate::fixtures::{
        new_config_map, new_job, new_nginx_pod, new_nginx_pod_with_config_map, new_secret,
    };
    use crate::job::{REASON_COMPLETED, REASON_START_ERROR};

    const NS: &str = "default-abc1234";

    fn config_map_case() -> TestCase {
        let pod = new_nginx_pod_with_config_map(NS, "nginx-config");
        let config_map = new_config_map(
            NS,
            "nginx-config",
            BTreeMap::from([("example.txt".to_string(), "Hello, world".to_string())]),
        );
        TestCase::new("Configmap is created and contains data", pod)
            .with_config_map(config_map)
            .with_test_commands(vec![TestCommand::stdout_equals(
                "nginx-configmap",
                &["cat", "/etc/config/example.txt"],
                "Data inside configmap",
                "Hello, world",
            )])
    }

    fn job_pod(name: &str, reason: &str) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(NS.to_string()),
                ..Default::default()
            },
            status: Some(PodStatus {
                container_statuses: Some(vec![ContainerStatus {
                    name: "job-pi".to_string(),
                    state: Some(ContainerState {
                        terminated: Some(ContainerStateTerminated {
                            reason: Some(reason.to_string()),
                            ..Default::default()
                        }),
                        ..Default::default()
                    }),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn assert_ok() -> MockCloudAssert {
        let mut assert = MockCloudAssert::new();
        assert.expect_has_pod_vm().returning(|_, _| Ok(()));
        assert
    }

    #[tokio::test]
    async fn config_map_case_runs_in_order_and_cleans_up() {
        let mut seq = Sequence::new();
        let mut client = MockClusterClient::new();
        let mut assert = MockCloudAssert::new();

        client
            .expect_ensure_namespace()
            .withf(|ns| ns == NS)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(false));
        client
            .expect_create_config_map()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        client
            .expect_create_pod()
            .withf(|pod| pod.name_any() == "nginx-configmap-pod")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        client
            .expect_wait_for_pod_running()
            .withf(|ns, name, timeout| {
                ns == NS && name == "nginx-configmap-pod" && *timeout == WAIT_POD_RUNNING_TIMEOUT
            })
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(()));
        assert
            .expect_has_pod_vm()
            .withf(|ns, pod| ns == NS && pod == "nginx-configmap-pod")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));
        client
            .expect_list_pods()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|ns, _| Ok(vec![new_nginx_pod_with_config_map(ns, "nginx-config")]));
        client
            .expect_exec_in_pod()
            .withf(|_, pod, container, command| {
                pod == "nginx-configmap-pod"
                    && container == "nginx-configmap"
                    && command == ["cat", "/etc/config/example.txt"]
            })
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _, _| {
                Ok(ExecOutput {
                    stdout: "Hello, world".to_string(),
                    stderr: String::new(),
                })
            });
        client
            .expect_delete_pod()
            .withf(|ns, name| ns == NS && name == "nginx-configmap-pod")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));
        client
            .expect_delete_config_map()
            .withf(|ns, name| ns == NS && name == "nginx-config")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));

        let outcome = config_map_case().run(&client, &assert).await.unwrap();
        assert_eq!(outcome, Outcome::Passed);
    }

    #[tokio::test]
    async fn unexpected_output_fails_but_still_tears_down() {
        let mut client = MockClusterClient::new();
        client.expect_ensure_namespace().returning(|_| Ok(false));
        client.expect_create_config_map().returning(|_| Ok(()));
        client.expect_create_pod().returning(|_| Ok(()));
        client
            .expect_wait_for_pod_running()
            .returning(|_, _, _| Ok(()));
        client
            .expect_list_pods()
            .returning(|ns, _| Ok(vec![new_nginx_pod_with_config_map(ns, "nginx-config")]));
        client.expect_exec_in_pod().returning(|_, _, _, _| {
            Ok(ExecOutput {
                stdout: "Goodbye".to_string(),
                stderr: String::new(),
            })
        });
        client.expect_delete_pod().times(1).returning(|_, _| Ok(()));
        client
            .expect_delete_config_map()
            .times(1)
            .returning(|_, _| Ok(()));

        let err = config_map_case()
            .run(&client, &assert_ok())
            .await
            .unwrap_err();
        assert!(matches!(err, HarnessError::UnexpectedOutput { ref stdout, .. } if stdout == "Goodbye"));
    }

    #[tokio::test]
    async fn pod_not_running_skips_assessment() {
        let mut client = MockClusterClient::new();
        client.expect_ensure_namespace().returning(|_| Ok(false));
        client.expect_create_config_map().returning(|_| Ok(()));
        client.expect_create_pod().returning(|_| Ok(()));
        client.expect_wait_for_pod_running().returning(|_, _, timeout| {
            Err(HarnessError::timeout("pod to be running", timeout))
        });
        client.expect_exec_in_pod().never();
        client.expect_list_pods().never();
        client.expect_delete_pod().times(1).returning(|_, _| Ok(()));
        client
            .expect_delete_config_map()
            .times(1)
            .returning(|_, _| Ok(()));

        let mut assert = MockCloudAssert::new();
        assert.expect_has_pod_vm().never();

        let err = config_map_case().run(&client, &assert).await.unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn failed_pod_creation_only_deletes_what_exists() {
        let mut client = MockClusterClient::new();
        client.expect_ensure_namespace().returning(|_| Ok(false));
        client.expect_create_config_map().returning(|_| Ok(()));
        client
            .expect_create_pod()
            .returning(|_| Err(HarnessError::Setup("admission denied".to_string())));
        client.expect_wait_for_pod_running().never();
        client.expect_delete_pod().never();
        client
            .expect_delete_config_map()
            .times(1)
            .returning(|_, _| Ok(()));

        let err = config_map_case()
            .run(&client, &assert_ok())
            .await
            .unwrap_err();
        assert!(matches!(err, HarnessError::Setup(_)));
    }

    #[tokio::test]
    async fn config_map_and_secret_are_deleted_from_their_own_namespace() {
        let mut client = MockClusterClient::new();
        client.expect_ensure_namespace().returning(|_| Ok(false));
        client
            .expect_create_config_map()
            .withf(|cm| cm.namespace().as_deref() == Some("shared-config"))
            .times(1)
            .returning(|_| Ok(()));
        client
            .expect_create_secret()
            .withf(|secret| secret.namespace().as_deref() == Some("shared-config"))
            .times(1)
            .returning(|_| Ok(()));
        client.expect_create_pod().returning(|_| Ok(()));
        client
            .expect_wait_for_pod_running()
            .returning(|_, _, _| Ok(()));
        client
            .expect_list_pods()
            .returning(|ns, _| Ok(vec![new_nginx_pod_with_config_map(ns, "nginx-config")]));
        client.expect_delete_pod().times(1).returning(|_, _| Ok(()));
        client
            .expect_delete_config_map()
            .withf(|ns, name| ns == "shared-config" && name == "nginx-config")
            .times(1)
            .returning(|_, _| Ok(()));
        client
            .expect_delete_secret()
            .withf(|ns, name| ns == "shared-config" && name == "nginx-secret")
            .times(1)
            .returning(|_, _| Ok(()));

        let outcome = TestCase::new(
            "Configmap is created and contains data",
            new_nginx_pod_with_config_map(NS, "nginx-config"),
        )
        .with_config_map(new_config_map("shared-config", "nginx-config", BTreeMap::new()))
        .with_secret(new_secret("shared-config", "nginx-secret", BTreeMap::new()))
        .run(&client, &assert_ok())
        .await
        .unwrap();
        assert_eq!(outcome, Outcome::Passed);
    }

    #[tokio::test]
    async fn created_namespace_is_deleted_last() {
        let mut seq = Sequence::new();
        let mut client = MockClusterClient::new();
        client
            .expect_ensure_namespace()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(true));
        client
            .expect_create_pod()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        client
            .expect_wait_for_pod_running()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(()));
        client
            .expect_list_pods()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|ns, _| Ok(vec![new_nginx_pod(ns)]));
        client
            .expect_delete_pod()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));
        client
            .expect_delete_namespace()
            .withf(|ns| ns == NS)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));

        let outcome = TestCase::new("PodVM is created", new_nginx_pod(NS))
            .run(&client, &assert_ok())
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::Passed);
    }

    #[tokio::test]
    async fn missing_pod_vm_fails() {
        let mut client = MockClusterClient::new();
        client.expect_ensure_namespace().returning(|_| Ok(false));
        client.expect_create_pod().returning(|_| Ok(()));
        client
            .expect_wait_for_pod_running()
            .returning(|_, _, _| Ok(()));
        client.expect_list_pods().never();
        client.expect_delete_pod().times(1).returning(|_, _| Ok(()));

        let mut assert = MockCloudAssert::new();
        assert.expect_has_pod_vm().returning(|_, pod| {
            Err(HarnessError::MissingPodVm {
                pod: pod.to_string(),
                message: "no instance".to_string(),
            })
        });

        let err = TestCase::new("PodVM is created", new_nginx_pod(NS))
            .run(&client, &assert)
            .await
            .unwrap_err();
        assert!(matches!(err, HarnessError::MissingPodVm { .. }));
    }

    #[tokio::test]
    async fn exec_error_fails() {
        let mut client = MockClusterClient::new();
        client.expect_ensure_namespace().returning(|_| Ok(false));
        client.expect_create_pod().returning(|_| Ok(()));
        client
            .expect_wait_for_pod_running()
            .returning(|_, _, _| Ok(()));
        client
            .expect_list_pods()
            .returning(|ns, _| Ok(vec![new_nginx_pod(ns)]));
        client
            .expect_exec_in_pod()
            .returning(|_, pod, container, command| {
                Err(HarnessError::exec(pod, container, command, "command terminated with exit code 1"))
            });
        client.expect_delete_pod().times(1).returning(|_, _| Ok(()));

        let err = TestCase::new("PodVM is created", new_nginx_pod(NS))
            .with_test_commands(vec![TestCommand::stdout_not_empty("nginx", &["false"], "false")])
            .run(&client, &assert_ok())
            .await
            .unwrap_err();
        assert!(matches!(err, HarnessError::Exec { .. }));
    }

    #[tokio::test]
    async fn teardown_error_is_fatal() {
        let mut client = MockClusterClient::new();
        client.expect_ensure_namespace().returning(|_| Ok(false));
        client.expect_create_config_map().returning(|_| Ok(()));
        client.expect_create_pod().returning(|_| Ok(()));
        client
            .expect_wait_for_pod_running()
            .returning(|_, _, _| Ok(()));
        client
            .expect_list_pods()
            .returning(|ns, _| Ok(vec![new_nginx_pod_with_config_map(ns, "nginx-config")]));
        client.expect_exec_in_pod().returning(|_, _, _, _| {
            Ok(ExecOutput {
                stdout: "Hello, world".to_string(),
                stderr: String::new(),
            })
        });
        client
            .expect_delete_pod()
            .returning(|_, _| Err(HarnessError::internal("delete", "api unavailable")));
        // Deletion keeps going after the first failure
        client
            .expect_delete_config_map()
            .times(1)
            .returning(|_, _| Ok(()));

        let err = config_map_case()
            .run(&client, &assert_ok())
            .await
            .unwrap_err();
        assert!(matches!(err, HarnessError::Internal { .. }));
    }

    fn job_client(pods: Vec<Pod>, log: &'static str, completes: bool) -> MockClusterClient {
        let mut client = MockClusterClient::new();
        client.expect_ensure_namespace().returning(|_| Ok(false));
        client
            .expect_create_job()
            .withf(|job| job.name_any() == "job-pi")
            .times(1)
            .returning(|_| Ok(()));
        client
            .expect_wait_for_job_complete()
            .returning(move |_, _, timeout| {
                if completes {
                    Ok(())
                } else {
                    Err(HarnessError::timeout("job to complete", timeout))
                }
            });
        client
            .expect_list_pods()
            .withf(|ns, selector| ns == NS && selector == "job-name=job-pi")
            .returning(move |_, _| Ok(pods.clone()));
        client
            .expect_logs_after_started_event()
            .returning(move |_, _| Ok(log.to_string()));
        client
            .expect_delete_job()
            .withf(|ns, name| ns == NS && name == "job-pi")
            .times(1)
            .returning(|_, _| Ok(()));
        client.expect_create_pod().never();
        client.expect_delete_pod().never();
        client.expect_delete_config_map().never();
        client.expect_delete_secret().never();
        client
    }

    fn job_case() -> TestCase {
        TestCase::new_job("Job has been created", new_job(NS, "job-pi"), "3.14")
    }

    #[tokio::test]
    async fn completed_job_passes() {
        let client = job_client(
            vec![job_pod("job-pi-a", REASON_COMPLETED)],
            "3.14156\n",
            true,
        );
        let mut assert = MockCloudAssert::new();
        assert.expect_has_pod_vm().never();

        let outcome = job_case().run(&client, &assert).await.unwrap();
        assert_eq!(outcome, Outcome::Passed);
    }

    #[tokio::test]
    async fn job_with_only_start_errors_fails() {
        let client = job_client(
            vec![
                job_pod("job-pi-a", REASON_START_ERROR),
                job_pod("job-pi-b", REASON_START_ERROR),
            ],
            "",
            true,
        );
        let err = job_case().run(&client, &assert_ok()).await.unwrap_err();
        assert!(matches!(err, HarnessError::JobFailed { .. }));
    }

    #[tokio::test]
    async fn job_completing_after_start_errors_is_skipped() {
        let client = job_client(
            vec![
                job_pod("job-pi-a", REASON_START_ERROR),
                job_pod("job-pi-b", REASON_COMPLETED),
            ],
            "3.14156",
            true,
        );
        let outcome = job_case().run(&client, &assert_ok()).await.unwrap();
        assert!(matches!(outcome, Outcome::Skipped(_)));
    }

    #[tokio::test]
    async fn job_log_mismatch_fails() {
        let client = job_client(
            vec![job_pod("job-pi-a", REASON_COMPLETED)],
            "bc: not found",
            true,
        );
        let err = job_case().run(&client, &assert_ok()).await.unwrap_err();
        assert!(matches!(err, HarnessError::LogMismatch { .. }));
    }

    #[tokio::test]
    async fn job_completion_timeout_is_only_logged() {
        let client = job_client(
            vec![job_pod("job-pi-a", REASON_COMPLETED)],
            "3.14156",
            false,
        );
        let outcome = job_case().run(&client, &assert_ok()).await.unwrap();
        assert_eq!(outcome, Outcome::Passed);
    }

    #[test]
    fn case_names_follow_workload() {
        assert_eq!(TestCase::new("x", new_nginx_pod(NS)).name(), "nginx Pod");
        assert_eq!(job_case().name(), "job-pi Job");
        assert_eq!(job_case().assess_message(), "Job has been created");
    }
}
