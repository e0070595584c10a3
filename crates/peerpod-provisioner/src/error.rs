//! Error types for the provisioner

use std::path::PathBuf;

/// Provisioner result type
pub type Result<T> = std::result::Result<T, ProvisionerError>;

/// Provisioner errors
#[derive(Debug, thiserror::Error)]
pub enum ProvisionerError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Kube(#[from] peerpod_common::Error),

    #[error("unknown cloud provider {provider:?} (known: {known})")]
    UnknownProvider { provider: String, known: String },

    #[error("invalid properties file {path}: line {line}: {message}")]
    InvalidProperties {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("podvm image not found: {path}")]
    ImageNotFound { path: PathBuf },

    #[error("{provider} provisioner does not support {operation}")]
    Unsupported { provider: String, operation: String },

    #[error("configuration error: {message}")]
    Config { message: String },

    #[error("command failed: {message}")]
    CommandFailed { message: String },
}

impl ProvisionerError {
    pub fn command_failed(message: impl Into<String>) -> Self {
        Self::CommandFailed {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn unsupported(provider: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::Unsupported {
            provider: provider.into(),
            operation: operation.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_provider_lists_known() {
        let err = ProvisionerError::UnknownProvider {
            provider: "nimbus".to_string(),
            known: "kind".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "unknown cloud provider \"nimbus\" (known: kind)"
        );
    }

    #[test]
    fn unsupported_names_operation() {
        let err = ProvisionerError::unsupported("kind", "PodVM image upload");
        assert_eq!(
            err.to_string(),
            "kind provisioner does not support PodVM image upload"
        );
    }
}
