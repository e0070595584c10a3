//! Local provisioner backed by a kind cluster
//!
//! kind nodes share the host network, so there is no VPC to manage, and the
//! PodVM image lives wherever the adaptor's own provider expects it, so
//! uploads are not supported.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::info;

use super::CloudProvisioner;
use crate::properties::Properties;
use crate::{ProvisionerError, Result};

/// Provider name
pub const PROVIDER: &str = "kind";
/// Cluster name when `CLUSTER_NAME` is unset
pub const DEFAULT_CLUSTER_NAME: &str = "peer-pods";
/// How long `kind create cluster` waits for the control plane
pub const CLUSTER_READY_WAIT: &str = "120s";

pub const CLUSTER_NAME_KEY: &str = "CLUSTER_NAME";
pub const KUBECONFIG_KEY: &str = "KUBECONFIG";

/// One control plane and one worker; the worker carries the label the
/// adaptor daemon set selects
pub const KIND_CONFIG: &str = r#"kind: Cluster
apiVersion: kind.x-k8s.io/v1alpha4
nodes:
- role: control-plane
- role: worker
  labels:
    node.kubernetes.io/worker: ""
"#;

pub struct KindProvisioner {
    properties: Properties,
}

impl KindProvisioner {
    pub fn new(properties: Properties) -> Self {
        Self { properties }
    }

    pub fn cluster_name(&self) -> &str {
        self.properties.get_or(CLUSTER_NAME_KEY, DEFAULT_CLUSTER_NAME)
    }

    /// Where to write the cluster's kubeconfig; `None` lets kind merge it
    /// into the default one
    pub fn kubeconfig(&self) -> Option<PathBuf> {
        self.properties
            .get(KUBECONFIG_KEY)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
    }

    fn create_args(&self) -> Vec<String> {
        let mut args = vec![
            "create".to_string(),
            "cluster".to_string(),
            "--name".to_string(),
            self.cluster_name().to_string(),
            "--config".to_string(),
            "-".to_string(),
            "--wait".to_string(),
            CLUSTER_READY_WAIT.to_string(),
        ];
        if let Some(kubeconfig) = self.kubeconfig() {
            args.push("--kubeconfig".to_string());
            args.push(kubeconfig.display().to_string());
        }
        args
    }

    fn delete_args(&self) -> Vec<String> {
        let mut args = vec![
            "delete".to_string(),
            "cluster".to_string(),
            "--name".to_string(),
            self.cluster_name().to_string(),
        ];
        if let Some(kubeconfig) = self.kubeconfig() {
            args.push("--kubeconfig".to_string());
            args.push(kubeconfig.display().to_string());
        }
        args
    }
}

#[async_trait]
impl CloudProvisioner for KindProvisioner {
    async fn create_vpc(&self) -> Result<()> {
        info!("kind nodes use the host network, no VPC to create");
        Ok(())
    }

    async fn delete_vpc(&self) -> Result<()> {
        info!("kind nodes use the host network, no VPC to delete");
        Ok(())
    }

    async fn create_cluster(&self) -> Result<()> {
        info!("Creating kind cluster: {}", self.cluster_name());

        let mut child = Command::new("kind")
            .args(self.create_args())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(KIND_CONFIG.as_bytes()).await?;
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            return Err(ProvisionerError::command_failed(format!(
                "kind create cluster failed: {}",
                String::from_utf8_lossy(&output.stderr)
            )));
        }
        Ok(())
    }

    async fn delete_cluster(&self) -> Result<()> {
        info!("Deleting kind cluster: {}", self.cluster_name());

        let output = Command::new("kind")
            .args(self.delete_args())
            .output()
            .await?;

        if !output.status.success() {
            return Err(ProvisionerError::command_failed(format!(
                "kind delete cluster failed: {}",
                String::from_utf8_lossy(&output.stderr)
            )));
        }
        Ok(())
    }

    async fn upload_podvm(&self, _image: &Path) -> Result<()> {
        Err(ProvisionerError::unsupported(PROVIDER, "PodVM image upload"))
    }

    fn properties(&self) -> Properties {
        let mut properties = self.properties.clone();
        if properties.get("CLOUD_PROVIDER").is_none() {
            properties.insert("CLOUD_PROVIDER", PROVIDER);
        }
        properties
    }
}
