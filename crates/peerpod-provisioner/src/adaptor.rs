//! Cloud API adaptor deployment
//!
//! The adaptor runs as a daemon set on worker nodes and creates a PodVM for
//! every `kata-remote` pod. [`KustomizeAdaptor`] renders the provider's
//! overlay from the provisioner properties, applies it with
//! `kubectl apply -k`, then waits for the daemon set to roll out.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::info;

#[cfg(test)]
use mockall::automock;

use peerpod_common::kube_utils;

use crate::overlay::{Overlay, ADAPTOR_IMAGE_NAME};
use crate::properties::Properties;
use crate::provisioner::{kind, KNOWN_PROVIDERS};
use crate::{ProvisionerError, Result};

/// Namespace the adaptor is deployed into
pub const ADAPTOR_NAMESPACE: &str = "confidential-containers-system";
/// Daemon set running the adaptor
pub const ADAPTOR_DAEMON_SET: &str = "cloud-api-adaptor-daemonset";
/// How long to wait for the daemon set to become ready
pub const ADAPTOR_READY_TIMEOUT: Duration = Duration::from_secs(300);

/// Overrides the overlay directory
pub const OVERLAY_DIR_KEY: &str = "OVERLAY_DIR";
/// Adaptor image reference, `registry/repo[:tag]`
pub const ADAPTOR_IMAGE_KEY: &str = "CAA_IMAGE";

/// Properties consumed here or by the provisioner, never passed to the adaptor
const PROVISIONER_KEYS: &[&str] = &[
    OVERLAY_DIR_KEY,
    ADAPTOR_IMAGE_KEY,
    kind::CLUSTER_NAME_KEY,
    kind::KUBECONFIG_KEY,
];

/// Deploys the adaptor onto the provisioned cluster
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CloudApiAdaptor: Send + Sync {
    async fn deploy(&self, properties: &Properties) -> Result<()>;
}

/// Build the adaptor deployer for `provider`
pub fn new_cloud_api_adaptor(provider: &str) -> Result<Box<dyn CloudApiAdaptor>> {
    if !KNOWN_PROVIDERS.contains(&provider) {
        return Err(ProvisionerError::UnknownProvider {
            provider: provider.to_string(),
            known: KNOWN_PROVIDERS.join(", "),
        });
    }
    Ok(Box::new(KustomizeAdaptor::new(
        PathBuf::from("install/overlays").join(provider),
    )))
}

pub struct KustomizeAdaptor {
    overlay_dir: PathBuf,
}

impl KustomizeAdaptor {
    pub fn new(overlay_dir: PathBuf) -> Self {
        Self { overlay_dir }
    }

    fn overlay_dir(&self, properties: &Properties) -> PathBuf {
        properties
            .get(OVERLAY_DIR_KEY)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| self.overlay_dir.clone())
    }

    /// Fill the overlay in `dir` from `properties` and write it back
    pub fn render(&self, dir: &Path, properties: &Properties) -> Result<Overlay> {
        let mut overlay = Overlay::load(dir)?;
        if let Some(image) = properties.get(ADAPTOR_IMAGE_KEY).filter(|v| !v.is_empty()) {
            overlay.set_image(ADAPTOR_IMAGE_NAME, image);
        }
        overlay.apply_properties(properties, PROVISIONER_KEYS);
        overlay.save(dir)?;
        Ok(overlay)
    }
}

fn kubectl_apply_args(dir: &Path, kubeconfig: Option<&Path>) -> Vec<String> {
    let mut args = vec![
        "apply".to_string(),
        "-k".to_string(),
        dir.display().to_string(),
    ];
    if let Some(kubeconfig) = kubeconfig {
        args.push("--kubeconfig".to_string());
        args.push(kubeconfig.display().to_string());
    }
    args
}

#[async_trait]
impl CloudApiAdaptor for KustomizeAdaptor {
    async fn deploy(&self, properties: &Properties) -> Result<()> {
        let dir = self.overlay_dir(properties);
        let kubeconfig = properties
            .get(kind::KUBECONFIG_KEY)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);

        info!("Rendering overlay {}", dir.display());
        self.render(&dir, properties)?;

        info!("Applying cloud-api-adaptor overlay...");
        let output = Command::new("kubectl")
            .args(kubectl_apply_args(&dir, kubeconfig.as_deref()))
            .output()
            .await?;
        if !output.status.success() {
            return Err(ProvisionerError::command_failed(format!(
                "kubectl apply -k {} failed: {}",
                dir.display(),
                String::from_utf8_lossy(&output.stderr)
            )));
        }

        info!("Waiting for {}/{}...", ADAPTOR_NAMESPACE, ADAPTOR_DAEMON_SET);
        let client = kube_utils::create_client(kubeconfig.as_deref()).await?;
        kube_utils::wait_for_daemon_set_ready(
            &client,
            ADAPTOR_DAEMON_SET,
            ADAPTOR_NAMESPACE,
            ADAPTOR_READY_TIMEOUT,
        )
        .await?;
        info!("cloud-api-adaptor is ready");
        Ok(())
    }
}
