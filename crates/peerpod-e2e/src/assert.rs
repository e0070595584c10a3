//! Assertions about the execution environment behind a workload
//!
//! Cloud-specific checks (e.g. "a VM named after this pod exists in the
//! VPC") plug in through [`CloudAssert`]. [`RuntimeClassAssert`] is the
//! provider-neutral check that only needs the cluster API.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

#[cfg(test)]
use mockall::automock;

use crate::client::ClusterClient;
use crate::fixtures::PEER_POD_RUNTIME_CLASS;
use crate::{HarnessError, Result};

/// Assertions to perform on the cloud provider
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CloudAssert: Send + Sync {
    /// Assert there is a PodVM backing `pod`
    async fn has_pod_vm(&self, namespace: &str, pod: &str) -> Result<()>;
}

/// Confirms the pod was admitted with the peer-pod runtime class and was
/// scheduled onto a node
pub struct RuntimeClassAssert {
    client: Arc<dyn ClusterClient>,
    runtime_class: String,
}

impl RuntimeClassAssert {
    /// Check for the default `kata-remote` runtime class
    pub fn new(client: Arc<dyn ClusterClient>) -> Self {
        Self::with_runtime_class(client, PEER_POD_RUNTIME_CLASS)
    }

    /// Check for a specific runtime class
    pub fn with_runtime_class(client: Arc<dyn ClusterClient>, runtime_class: &str) -> Self {
        Self {
            client,
            runtime_class: runtime_class.to_string(),
        }
    }
}

#[async_trait]
impl CloudAssert for RuntimeClassAssert {
    async fn has_pod_vm(&self, namespace: &str, pod: &str) -> Result<()> {
        let found = self
            .client
            .get_pod(namespace, pod)
            .await?
            .ok_or_else(|| HarnessError::PodNotFound {
                namespace: namespace.to_string(),
                name: pod.to_string(),
            })?;

        let spec = found.spec.unwrap_or_default();
        let runtime_class = spec.runtime_class_name.unwrap_or_default();
        if runtime_class != self.runtime_class {
            return Err(HarnessError::MissingPodVm {
                pod: pod.to_string(),
                message: format!(
                    "runtime class is {:?}, expected {:?}",
                    runtime_class, self.runtime_class
                ),
            });
        }
        let Some(node) = spec.node_name else {
            return Err(HarnessError::MissingPodVm {
                pod: pod.to_string(),
                message: "pod is not scheduled".to_string(),
            });
        };

        info!(pod = %pod, node = %node, runtime_class = %runtime_class, "PodVM backs pod");
        Ok(())
    }
}
