//! Environment the live suite reads its settings from

use std::path::PathBuf;

use crate::fixtures::random_name;

/// Path to the kubeconfig of the cluster under test
pub const KUBECONFIG_ENV: &str = "KUBECONFIG";
/// Prefix for the per-case random namespaces
pub const NAMESPACE_PREFIX_ENV: &str = "TEST_E2E_NAMESPACE_PREFIX";

const DEFAULT_NAMESPACE_PREFIX: &str = "default";
const NAMESPACE_SUFFIX_LEN: usize = 7;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct E2eEnv {
    /// `None` falls back to kube's default config inference
    pub kubeconfig: Option<PathBuf>,
    pub namespace_prefix: String,
}

impl E2eEnv {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source; empty values count as unset
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Self {
            kubeconfig: get(KUBECONFIG_ENV).map(PathBuf::from),
            namespace_prefix: get(NAMESPACE_PREFIX_ENV)
                .unwrap_or_else(|| DEFAULT_NAMESPACE_PREFIX.to_string()),
        }
    }

    /// Fresh namespace name, e.g. `default-k3m9x0a`
    pub fn random_namespace(&self) -> String {
        random_name(&self.namespace_prefix, NAMESPACE_SUFFIX_LEN)
    }
}
