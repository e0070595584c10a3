//! The three provisioning actions
//!
//! Each action is a fixed sequence of provisioner calls; the first failure
//! stops the sequence.

use std::fmt;
use std::path::Path;

use clap::ValueEnum;
use tracing::info;

use crate::adaptor::CloudApiAdaptor;
use crate::provisioner::CloudProvisioner;
use crate::{ProvisionerError, Result};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum Action {
    /// Create the VPC and cluster, upload the PodVM image if one is given,
    /// then deploy the cloud API adaptor
    #[default]
    Provision,
    /// Delete the cluster, then the VPC
    Deprovision,
    /// Upload the PodVM image
    #[value(name = "uploadimage", alias = "upload-image")]
    UploadImage,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Action::Provision => "provision",
            Action::Deprovision => "deprovision",
            Action::UploadImage => "uploadimage",
        };
        f.write_str(name)
    }
}

/// Run `action` against `provisioner`
///
/// `new_adaptor` is only called once the cluster exists, during `provision`.
pub async fn run_action<F>(
    action: Action,
    provisioner: &dyn CloudProvisioner,
    podvm_image: Option<&Path>,
    new_adaptor: F,
) -> Result<()>
where
    F: FnOnce() -> Result<Box<dyn CloudApiAdaptor>> + Send,
{
    match action {
        Action::Provision => {
            info!("Creating VPC...");
            provisioner.create_vpc().await?;

            info!("Creating Cluster...");
            provisioner.create_cluster().await?;

            if let Some(image) = podvm_image {
                info!("Uploading PodVM Image...");
                ensure_image_exists(image).await?;
                provisioner.upload_podvm(image).await?;
            }

            let adaptor = new_adaptor()?;
            info!("Deploying cloud-api-adaptor...");
            adaptor.deploy(&provisioner.properties()).await
        }
        Action::Deprovision => {
            info!("Deleting Cluster...");
            provisioner.delete_cluster().await?;

            info!("Deleting VPC...");
            provisioner.delete_vpc().await
        }
        Action::UploadImage => {
            let image = podvm_image.ok_or_else(|| {
                ProvisionerError::config("uploadimage needs TEST_E2E_PODVM_IMAGE")
            })?;
            info!("Uploading PodVM Image...");
            ensure_image_exists(image).await?;
            provisioner.upload_podvm(image).await
        }
    }
}

async fn ensure_image_exists(image: &Path) -> Result<()> {
    match tokio::fs::metadata(image).await {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(ProvisionerError::ImageNotFound {
            path: image.to_path_buf(),
        }),
        Err(e) => Err(e.into()),
    }
}
