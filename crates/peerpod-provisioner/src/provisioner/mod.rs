//! Cloud provisioners
//!
//! A provisioner owns the lifecycle of the infrastructure a peer-pod test
//! cluster runs on: the network (VPC), the cluster itself and the PodVM
//! image. Implementations are selected by provider name through
//! [`get_cloud_provisioner`].

use std::path::Path;

use async_trait::async_trait;

#[cfg(test)]
use mockall::automock;

use crate::properties::Properties;
use crate::{ProvisionerError, Result};

pub mod kind;

pub use kind::KindProvisioner;

/// Providers [`get_cloud_provisioner`] can build
pub const KNOWN_PROVIDERS: &[&str] = &[kind::PROVIDER];

/// Infrastructure lifecycle for one cloud provider
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CloudProvisioner: Send + Sync {
    async fn create_vpc(&self) -> Result<()>;

    async fn delete_vpc(&self) -> Result<()>;

    async fn create_cluster(&self) -> Result<()>;

    async fn delete_cluster(&self) -> Result<()>;

    /// Make the PodVM image at `image` available to the provider
    async fn upload_podvm(&self, image: &Path) -> Result<()>;

    /// Settings the adaptor deployment is rendered from
    fn properties(&self) -> Properties;
}

/// Build the provisioner registered for `provider`
///
/// `properties_file` is optional; when given it must exist and parse.
pub fn get_cloud_provisioner(
    provider: &str,
    properties_file: Option<&Path>,
) -> Result<Box<dyn CloudProvisioner>> {
    let properties = match properties_file {
        Some(path) => Properties::load(path)?,
        None => Properties::new(),
    };

    match provider {
        kind::PROVIDER => Ok(Box::new(KindProvisioner::new(properties))),
        other => Err(ProvisionerError::UnknownProvider {
            provider: other.to_string(),
            known: KNOWN_PROVIDERS.join(", "),
        }),
    }
}
