//! [`ClusterClient`] backed by a real kube-rs client

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use k8s_openapi::api::apps::v1::DaemonSet;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{ConfigMap, Endpoints, Event, Pod, Secret};
use kube::api::{Api, AttachParams, DeleteParams, ListParams, LogParams, PostParams, PropagationPolicy};
use kube::runtime::wait::{await_condition, conditions};
use kube::runtime::{watcher, WatchStreamExt};
use kube::{Client, ResourceExt};
use tokio::io::AsyncReadExt;
use tracing::{debug, info};

use peerpod_common::kube_utils::{self, is_not_found, poll_until};

use crate::client::{ClusterClient, ExecOutput};
use crate::job::job_pod_selector;
use crate::{HarnessError, Result};

/// Event reason the kubelet records once a container has started
pub const STARTED_EVENT_REASON: &str = "Started";

/// Cluster client talking to a live API server
#[derive(Clone)]
pub struct KubeClusterClient {
    client: Client,
}

impl KubeClusterClient {
    /// Wrap an existing kube client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build a client from a kubeconfig path, or infer one when `None`
    pub async fn connect(kubeconfig: Option<&Path>) -> Result<Self> {
        Ok(Self::new(kube_utils::create_client(kubeconfig).await?))
    }

    fn pods(&self, namespace: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), namespace)
    }

    async fn create_namespaced<K>(&self, obj: &K) -> Result<()>
    where
        K: kube::Resource<Scope = k8s_openapi::NamespaceResourceScope>
            + Clone
            + serde::Serialize
            + serde::de::DeserializeOwned
            + std::fmt::Debug,
        K::DynamicType: Default,
    {
        let namespace = obj.namespace().ok_or_else(|| {
            HarnessError::internal("create", format!("{} has no namespace", obj.name_any()))
        })?;
        let api: Api<K> = Api::namespaced(self.client.clone(), &namespace);
        api.create(&PostParams::default(), obj).await?;
        debug!(namespace = %namespace, name = %obj.name_any(), "Created object");
        Ok(())
    }

    async fn delete_namespaced<K>(&self, namespace: &str, name: &str, params: &DeleteParams) -> Result<()>
    where
        K: kube::Resource<Scope = k8s_openapi::NamespaceResourceScope>
            + Clone
            + serde::de::DeserializeOwned
            + std::fmt::Debug,
        K::DynamicType: Default,
    {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        api.delete(name, params).await?;
        Ok(())
    }
}

#[async_trait]
impl ClusterClient for KubeClusterClient {
    async fn ensure_namespace(&self, name: &str) -> Result<bool> {
        Ok(kube_utils::ensure_namespace(&self.client, name).await?)
    }

    async fn delete_namespace(&self, name: &str) -> Result<()> {
        Ok(kube_utils::delete_namespace(&self.client, name).await?)
    }

    async fn create_config_map(&self, config_map: &ConfigMap) -> Result<()> {
        self.create_namespaced(config_map).await
    }

    async fn delete_config_map(&self, namespace: &str, name: &str) -> Result<()> {
        self.delete_namespaced::<ConfigMap>(namespace, name, &DeleteParams::default())
            .await
    }

    async fn create_secret(&self, secret: &Secret) -> Result<()> {
        self.create_namespaced(secret).await
    }

    async fn delete_secret(&self, namespace: &str, name: &str) -> Result<()> {
        self.delete_namespaced::<Secret>(namespace, name, &DeleteParams::default())
            .await
    }

    async fn create_pod(&self, pod: &Pod) -> Result<()> {
        self.create_namespaced(pod).await
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Option<Pod>> {
        Ok(self.pods(namespace).get_opt(name).await?)
    }

    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<()> {
        self.delete_namespaced::<Pod>(namespace, name, &DeleteParams::default())
            .await
    }

    async fn create_job(&self, job: &Job) -> Result<()> {
        self.create_namespaced(job).await
    }

    async fn delete_job(&self, namespace: &str, name: &str) -> Result<()> {
        let params = DeleteParams {
            propagation_policy: Some(PropagationPolicy::Background),
            ..DeleteParams::default()
        };
        self.delete_namespaced::<Job>(namespace, name, &params).await?;

        // Background propagation lets the job object go first; remove its
        // pods now so the namespace is clean when the next case starts.
        for pod in self.list_pods(namespace, &job_pod_selector(name)).await? {
            let pod_name = pod.name_any();
            match self.delete_pod(namespace, &pod_name).await {
                Ok(()) => info!("Deleting pod... {}", pod_name),
                Err(HarnessError::Kube { source }) if is_not_found(&source) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    async fn create_daemon_set(&self, daemon_set: &DaemonSet) -> Result<()> {
        self.create_namespaced(daemon_set).await
    }

    async fn delete_daemon_set(&self, namespace: &str, name: &str) -> Result<()> {
        self.delete_namespaced::<DaemonSet>(namespace, name, &DeleteParams::default())
            .await
    }

    async fn wait_for_pod_running(
        &self,
        namespace: &str,
        name: &str,
        timeout: Duration,
    ) -> Result<()> {
        let running = await_condition(self.pods(namespace), name, conditions::is_pod_running());
        match tokio::time::timeout(timeout, running).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(HarnessError::internal("wait_for_pod_running", e.to_string())),
            Err(_) => Err(HarnessError::timeout(
                format!("pod {}/{} to be running", namespace, name),
                timeout,
            )),
        }
    }

    async fn wait_for_pod_phase(
        &self,
        namespace: &str,
        name: &str,
        phase: &str,
        timeout: Duration,
    ) -> Result<()> {
        let pods = self.pods(namespace);
        let name_owned = name.to_string();
        let phase_owned = phase.to_string();

        poll_until(
            timeout,
            kube_utils::DEFAULT_POLL_INTERVAL,
            format!("pod {}/{} to reach phase {}", namespace, name, phase),
            || {
                let pods = pods.clone();
                let name = name_owned.clone();
                let phase = phase_owned.clone();
                async move {
                    let current = pods
                        .get_opt(&name)
                        .await?
                        .and_then(|p| p.status)
                        .and_then(|s| s.phase);
                    Ok(current.as_deref() == Some(phase.as_str()))
                }
            },
        )
        .await?;
        Ok(())
    }

    async fn wait_for_job_complete(
        &self,
        namespace: &str,
        name: &str,
        timeout: Duration,
    ) -> Result<()> {
        let jobs: Api<Job> = Api::namespaced(self.client.clone(), namespace);
        let completed = await_condition(jobs, name, conditions::is_job_completed());
        match tokio::time::timeout(timeout, completed).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(HarnessError::internal("wait_for_job_complete", e.to_string())),
            Err(_) => Err(HarnessError::timeout(
                format!("job {}/{} to complete", namespace, name),
                timeout,
            )),
        }
    }

    async fn list_pods(&self, namespace: &str, label_selector: &str) -> Result<Vec<Pod>> {
        let params = if label_selector.is_empty() {
            ListParams::default()
        } else {
            ListParams::default().labels(label_selector)
        };
        Ok(self.pods(namespace).list(&params).await?.items)
    }

    async fn exec_in_pod(
        &self,
        namespace: &str,
        pod: &str,
        container: &str,
        command: &[String],
    ) -> Result<ExecOutput> {
        let params = AttachParams::default()
            .container(container)
            .stdin(false)
            .stdout(true)
            .stderr(true);
        let mut attached = self
            .pods(namespace)
            .exec(pod, command.to_vec(), &params)
            .await
            .map_err(|e| HarnessError::exec(pod, container, command, e.to_string()))?;

        let mut stdout_reader = attached
            .stdout()
            .ok_or_else(|| HarnessError::exec(pod, container, command, "stdout not attached"))?;
        let mut stderr_reader = attached
            .stderr()
            .ok_or_else(|| HarnessError::exec(pod, container, command, "stderr not attached"))?;
        let status = attached.take_status();

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let (out_res, err_res) = tokio::join!(
            stdout_reader.read_to_end(&mut stdout),
            stderr_reader.read_to_end(&mut stderr)
        );
        out_res.map_err(|e| HarnessError::exec(pod, container, command, e.to_string()))?;
        err_res.map_err(|e| HarnessError::exec(pod, container, command, e.to_string()))?;

        let output = ExecOutput {
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
        };

        // The status channel carries the exit code; anything but Success
        // means the command itself failed.
        if let Some(status) = status {
            if let Some(status) = status.await {
                if status.status.as_deref() != Some("Success") {
                    let message = status
                        .message
                        .unwrap_or_else(|| "command exited with failure".to_string());
                    return Err(HarnessError::exec(
                        pod,
                        container,
                        command,
                        format!("{} (stderr: {})", message, output.stderr.trim()),
                    ));
                }
            }
        }

        attached
            .join()
            .await
            .map_err(|e| HarnessError::exec(pod, container, command, e.to_string()))?;

        Ok(output)
    }

    async fn pod_logs(&self, namespace: &str, pod: &str) -> Result<String> {
        Ok(self.pods(namespace).logs(pod, &LogParams::default()).await?)
    }

    async fn logs_after_started_event(&self, namespace: &str, pod: &str) -> Result<String> {
        let events: Api<Event> = Api::namespaced(self.client.clone(), namespace);
        let config = watcher::Config::default().fields(&format!("involvedObject.name={}", pod));
        let mut stream = watcher(events, config).applied_objects().boxed();

        // The initial list replays past events, so a pod that already ran
        // to completion still yields its Started event here.
        while let Some(event) = stream
            .try_next()
            .await
            .map_err(|e| HarnessError::internal("watch_events", e.to_string()))?
        {
            if event.reason.as_deref() == Some(STARTED_EVENT_REASON) {
                debug!(namespace = %namespace, pod = %pod, "Observed Started event");
                break;
            }
        }
        drop(stream);

        self.pod_logs(namespace, pod).await
    }

    async fn endpoint_addresses(&self, namespace: &str, service: &str) -> Result<Vec<String>> {
        let api: Api<Endpoints> = Api::namespaced(self.client.clone(), namespace);
        let endpoints = api.list(&ListParams::default()).await?;
        Ok(endpoints
            .items
            .into_iter()
            .filter(|ep| ep.name_any() == service)
            .flat_map(|ep| ep.subsets.unwrap_or_default())
            .flat_map(|subset| subset.addresses.unwrap_or_default())
            .map(|addr| addr.ip)
            .collect())
    }
}
