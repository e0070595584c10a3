//! Cluster operations used by the harness
//!
//! Provides a trait-based abstraction over the Kubernetes API so the runner
//! can be tested against a mock while real runs go through
//! [`crate::kube_client::KubeClusterClient`].

use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::DaemonSet;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{ConfigMap, Pod, Secret};

#[cfg(test)]
use mockall::automock;

use crate::Result;

/// Captured output of a command executed inside a container
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExecOutput {
    /// Everything the command wrote to stdout
    pub stdout: String,
    /// Everything the command wrote to stderr
    pub stderr: String,
}

/// Kubernetes operations the harness performs against the cluster under test
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Create the namespace if missing; `true` when this call created it
    async fn ensure_namespace(&self, name: &str) -> Result<bool>;

    /// Delete a namespace
    async fn delete_namespace(&self, name: &str) -> Result<()>;

    /// Create a config map in its own namespace
    async fn create_config_map(&self, config_map: &ConfigMap) -> Result<()>;

    /// Delete a config map
    async fn delete_config_map(&self, namespace: &str, name: &str) -> Result<()>;

    /// Create a secret in its own namespace
    async fn create_secret(&self, secret: &Secret) -> Result<()>;

    /// Delete a secret
    async fn delete_secret(&self, namespace: &str, name: &str) -> Result<()>;

    /// Create a pod in its own namespace
    async fn create_pod(&self, pod: &Pod) -> Result<()>;

    /// Fetch a pod, `None` when it does not exist
    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Option<Pod>>;

    /// Delete a pod
    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<()>;

    /// Create a batch job in its own namespace
    async fn create_job(&self, job: &Job) -> Result<()>;

    /// Delete a job together with every pod it spawned
    async fn delete_job(&self, namespace: &str, name: &str) -> Result<()>;

    /// Create a daemon set in its own namespace
    async fn create_daemon_set(&self, daemon_set: &DaemonSet) -> Result<()>;

    /// Delete a daemon set
    async fn delete_daemon_set(&self, namespace: &str, name: &str) -> Result<()>;

    /// Block until the pod reports phase `Running`; timing out is an error
    async fn wait_for_pod_running(&self, namespace: &str, name: &str, timeout: Duration)
        -> Result<()>;

    /// Block until the pod reports the given phase (e.g. `Succeeded`)
    async fn wait_for_pod_phase(
        &self,
        namespace: &str,
        name: &str,
        phase: &str,
        timeout: Duration,
    ) -> Result<()>;

    /// Block until the job has a `Complete` condition; timing out is an error
    async fn wait_for_job_complete(&self, namespace: &str, name: &str, timeout: Duration)
        -> Result<()>;

    /// List pods in a namespace; an empty selector lists all of them
    async fn list_pods(&self, namespace: &str, label_selector: &str) -> Result<Vec<Pod>>;

    /// Run `command` in `container` of `pod` and capture its output
    ///
    /// A non-zero exit status is an error.
    async fn exec_in_pod(
        &self,
        namespace: &str,
        pod: &str,
        container: &str,
        command: &[String],
    ) -> Result<ExecOutput>;

    /// Read the full log of a pod's (single) container
    async fn pod_logs(&self, namespace: &str, pod: &str) -> Result<String>;

    /// Watch the pod's events until a `Started` event shows up, stop the
    /// watch, then return the pod's log
    async fn logs_after_started_event(&self, namespace: &str, pod: &str) -> Result<String>;

    /// IP addresses behind a service's endpoints
    async fn endpoint_addresses(&self, namespace: &str, service: &str) -> Result<Vec<String>>;
}
