//! Cluster provisioner for the peer-pod end-to-end suite
//!
//! Creates or tears down the infrastructure a test cluster needs and deploys
//! the cloud API adaptor onto it. Provider-specific work sits behind
//! [`provisioner::CloudProvisioner`] and [`adaptor::CloudApiAdaptor`].

pub mod actions;
pub mod adaptor;
pub mod error;
pub mod overlay;
pub mod properties;
pub mod provisioner;

pub use actions::Action;
pub use error::{ProvisionerError, Result};

use std::path::PathBuf;

use clap::Parser;
use tracing::info;

/// Provision, deprovision, or upload an image for a peer-pod test cluster
#[derive(Parser, Debug)]
#[command(name = "cluster-provisioner")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// What to do
    #[arg(long, value_enum, default_value_t = Action::Provision)]
    pub action: Action,

    /// Cloud provider whose provisioner to use
    #[arg(long, env = "CLOUD_PROVIDER")]
    pub cloud_provider: Option<String>,

    /// Provisioning properties file (KEY=value lines)
    #[arg(long, env = "TEST_E2E_PROVISION_FILE")]
    pub provision_file: Option<PathBuf>,

    /// PodVM image to upload
    #[arg(long, env = "TEST_E2E_PODVM_IMAGE")]
    pub podvm_image: Option<PathBuf>,

    /// Log as JSON lines
    #[arg(long, env = "LOG_JSON")]
    pub log_json: bool,
}

impl Cli {
    /// Run the selected action
    pub async fn run(self) -> Result<()> {
        let provider = self
            .cloud_provider
            .filter(|p| !p.is_empty())
            .ok_or_else(|| ProvisionerError::config("CLOUD_PROVIDER is not set"))?;
        let provision_file = self.provision_file.filter(|p| !p.as_os_str().is_empty());
        let podvm_image = self.podvm_image.filter(|p| !p.as_os_str().is_empty());

        let provisioner =
            provisioner::get_cloud_provisioner(&provider, provision_file.as_deref())?;

        info!(action = %self.action, provider = %provider, "Running cluster-provisioner");
        actions::run_action(
            self.action,
            provisioner.as_ref(),
            podvm_image.as_deref(),
            || adaptor::new_cloud_api_adaptor(&provider),
        )
        .await
    }
}

/// Accept Go-style single-dash long flags (`-action=provision`)
pub fn normalize_args<I>(args: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    const LONG_FLAGS: &[&str] = &["action", "cloud-provider", "provision-file", "podvm-image"];

    args.into_iter()
        .map(|arg| {
            let flag = arg
                .strip_prefix('-')
                .filter(|rest| !rest.starts_with('-'))
                .map(|rest| rest.split_once('=').map_or(rest, |(name, _)| name));
            match flag {
                Some(name) if LONG_FLAGS.contains(&name) => format!("-{}", arg),
                _ => arg,
            }
        })
        .collect()
}
