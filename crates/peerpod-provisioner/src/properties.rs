//! Provisioning properties
//!
//! A properties file holds `KEY=value` lines:
//!
//! ```text
//! # kind cluster
//! export CLUSTER_NAME=peer-pods
//! CAA_IMAGE="quay.io/confidential-containers/cloud-api-adaptor:latest"
//! ```
//!
//! Blank lines and `#` comments are skipped, a leading `export ` is dropped,
//! and one pair of matching single or double quotes around the value is
//! removed.

use std::collections::BTreeMap;
use std::path::Path;

use crate::{ProvisionerError, Result};

/// Key/value settings handed to a provisioner and on to the adaptor
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Properties {
    values: BTreeMap<String, String>,
}

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read and parse a properties file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents, path)
    }

    /// Parse properties text; `origin` only labels errors
    pub fn parse(contents: &str, origin: &Path) -> Result<Self> {
        let mut values = BTreeMap::new();
        for (idx, raw) in contents.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let line = line.strip_prefix("export ").unwrap_or(line).trim_start();

            let invalid = |message: &str| ProvisionerError::InvalidProperties {
                path: origin.to_path_buf(),
                line: idx + 1,
                message: message.to_string(),
            };

            let (key, value) = line
                .split_once('=')
                .ok_or_else(|| invalid("expected KEY=value"))?;
            let key = key.trim();
            if key.is_empty() {
                return Err(invalid("empty key"));
            }
            values.insert(key.to_string(), unquote(value.trim()).to_string());
        }
        Ok(Self { values })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).filter(|v| !v.is_empty()).unwrap_or(default)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}
