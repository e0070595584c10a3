//! Kustomize overlay for deploying the cloud API adaptor
//!
//! The overlay names the adaptor image, the `peer-pods-cm` literals the
//! adaptor reads its configuration from, file-sourced secrets and optional
//! strategic-merge patches. Provisioners fill it in from their properties
//! before `kubectl apply -k`.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::properties::Properties;
use crate::Result;

/// File kustomize looks for inside an overlay directory
pub const KUSTOMIZATION_FILE: &str = "kustomization.yaml";
/// Config map generator holding the adaptor settings
pub const PEER_PODS_CONFIG_MAP: &str = "peer-pods-cm";
/// Image name the base manifests reference
pub const ADAPTOR_IMAGE_NAME: &str = "cloud-api-adaptor";

const API_VERSION: &str = "kustomize.config.k8s.io/v1beta1";
const KIND: &str = "Kustomization";

/// A kustomization document
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Overlay {
    pub api_version: String,
    pub kind: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<ImageOverride>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generator_options: Option<GeneratorOptions>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub config_map_generator: Vec<Generator>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub secret_generator: Vec<Generator>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub patches_strategic_merge: Vec<String>,
}

/// `images:` entry rewriting an image reference
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageOverride {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_tag: Option<String>,
    /// `sha256:...`; takes precedence over `new_tag` in kustomize
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratorOptions {
    #[serde(default)]
    pub disable_name_suffix_hash: bool,
}

/// Config map or secret generator
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Generator {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// `KEY=value` entries
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub literals: Vec<String>,
    /// Files whose contents become entries
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<String>,
    /// Env files whose lines become entries
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub envs: Vec<String>,
}

impl Generator {
    pub fn new(name: &str, namespace: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            namespace: namespace.map(str::to_string),
            ..Default::default()
        }
    }

    /// Set `KEY=value`, replacing an existing entry for `key`
    pub fn set_literal(&mut self, key: &str, value: &str) {
        let entry = format!("{}={}", key, value);
        let prefix = format!("{}=", key);
        match self.literals.iter_mut().find(|l| l.starts_with(&prefix)) {
            Some(existing) => *existing = entry,
            None => self.literals.push(entry),
        }
    }

    pub fn literal(&self, key: &str) -> Option<&str> {
        let prefix = format!("{}=", key);
        self.literals
            .iter()
            .find_map(|l| l.strip_prefix(prefix.as_str()))
    }
}

impl Default for Overlay {
    fn default() -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            resources: Vec::new(),
            namespace: None,
            images: Vec::new(),
            generator_options: None,
            config_map_generator: Vec::new(),
            secret_generator: Vec::new(),
            patches_strategic_merge: Vec::new(),
        }
    }
}

impl Overlay {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Read `<dir>/kustomization.yaml`
    pub fn load(dir: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(dir.join(KUSTOMIZATION_FILE))?;
        Self::from_yaml(&contents)
    }

    /// Write `<dir>/kustomization.yaml`
    pub fn save(&self, dir: &Path) -> Result<()> {
        std::fs::write(dir.join(KUSTOMIZATION_FILE), self.to_yaml()?)?;
        Ok(())
    }

    /// Point `name` at `reference` (`registry/repo[:tag][@digest]`)
    pub fn set_image(&mut self, name: &str, reference: &str) {
        let parsed = split_image_reference(reference);
        let image = ImageOverride {
            name: name.to_string(),
            new_name: Some(parsed.name.to_string()),
            new_tag: parsed.tag.map(str::to_string),
            digest: parsed.digest.map(str::to_string),
        };
        match self.images.iter_mut().find(|i| i.name == name) {
            Some(existing) => *existing = image,
            None => self.images.push(image),
        }
    }

    /// Config map generator `name`, created in the overlay namespace if absent
    pub fn config_map_generator_mut(&mut self, name: &str) -> &mut Generator {
        let idx = match self.config_map_generator.iter().position(|g| g.name == name) {
            Some(idx) => idx,
            None => {
                let generator = Generator::new(name, self.namespace.as_deref());
                self.config_map_generator.push(generator);
                self.config_map_generator.len() - 1
            }
        };
        &mut self.config_map_generator[idx]
    }

    /// Copy adaptor settings into `peer-pods-cm`
    ///
    /// Keys in `skip` are consumed by the provisioner itself and stay out of
    /// the cluster.
    pub fn apply_properties(&mut self, properties: &Properties, skip: &[&str]) {
        let generator = self.config_map_generator_mut(PEER_PODS_CONFIG_MAP);
        for (key, value) in properties.iter().filter(|(k, _)| !skip.contains(k)) {
            generator.set_literal(key, value);
        }
    }
}

/// Parts of an image reference
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageReference<'a> {
    pub name: &'a str,
    pub tag: Option<&'a str>,
    pub digest: Option<&'a str>,
}

/// Split `registry:5000/repo:tag@sha256:...` into name, tag and digest
///
/// The digest follows the first `@`. A colon only separates a tag when it
/// follows the last `/` of what precedes the digest.
pub fn split_image_reference(reference: &str) -> ImageReference<'_> {
    let (rest, digest) = match reference.split_once('@') {
        Some((rest, digest)) => (rest, Some(digest)),
        None => (reference, None),
    };
    let last_segment = rest.rfind('/').map_or(0, |i| i + 1);
    let (name, tag) = match rest[last_segment..].rfind(':') {
        Some(colon) => {
            let at = last_segment + colon;
            (&rest[..at], Some(&rest[at + 1..]))
        }
        None => (rest, None),
    };
    ImageReference { name, tag, digest }
}
