use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::digest::Digest;
use crate::error::TypeError;
use crate::media::{self, NodeKind};

/// Ordered string-to-string annotations attached to a descriptor.
pub type Annotations = BTreeMap<String, String>;

/// Metadata record identifying a blob in the content store.
///
/// Field names follow the OCI descriptor encoding so that descriptors embedded
/// in manifests round-trip byte for byte.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    pub media_type: String,
    pub digest: Digest,
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub urls: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<Annotations>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,
}

impl Descriptor {
    /// Describe `data` under the given media type.
    pub fn for_content(media_type: impl Into<String>, data: &[u8]) -> Self {
        Self {
            media_type: media_type.into(),
            digest: Digest::of(data),
            size: data.len() as u64,
            urls: None,
            annotations: None,
            platform: None,
        }
    }

    /// Builder: attach a platform.
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = Some(platform);
        self
    }

    /// Builder: set one annotation.
    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations
            .get_or_insert_with(Annotations::new)
            .insert(key.into(), value.into());
        self
    }

    /// Role of this descriptor in an image tree.
    pub fn kind(&self) -> NodeKind {
        NodeKind::of(&self.media_type)
    }

    /// Returns `true` if this descriptor names a layer (plain or encrypted).
    pub fn is_layer(&self) -> bool {
        self.kind() == NodeKind::Layer
    }

    /// Returns `true` if this descriptor names an encrypted layer.
    pub fn is_encrypted(&self) -> bool {
        media::is_encrypted_layer(&self.media_type)
    }

    /// Look up an annotation value.
    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations.as_ref()?.get(key).map(String::as_str)
    }
}

/// Operating system and CPU architecture an image manifest targets.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Platform {
    pub architecture: String,
    pub os: String,
    #[serde(rename = "os.version", default, skip_serializing_if = "Option::is_none")]
    pub os_version: Option<String>,
    #[serde(rename = "os.features", default, skip_serializing_if = "Option::is_none")]
    pub os_features: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
}

impl Platform {
    /// Create a platform from OS and architecture.
    pub fn new(os: impl Into<String>, architecture: impl Into<String>) -> Self {
        Self {
            architecture: architecture.into(),
            os: os.into(),
            ..Default::default()
        }
    }

    /// Builder: set the architecture variant.
    pub fn with_variant(mut self, variant: impl Into<String>) -> Self {
        self.variant = Some(variant.into());
        self
    }

    /// Parse an `os/arch[/variant]` specifier.
    pub fn parse(spec: &str) -> Result<Self, TypeError> {
        let parts: Vec<&str> = spec.split('/').collect();
        let valid = |s: &&str| {
            !s.is_empty()
                && s.chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
        };
        if !(2..=3).contains(&parts.len()) || !parts.iter().all(valid) {
            return Err(TypeError::InvalidPlatform(spec.to_string()));
        }
        let mut platform = Self::new(parts[0].to_ascii_lowercase(), parts[1].to_ascii_lowercase());
        if let Some(variant) = parts.get(2) {
            platform.variant = Some(variant.to_ascii_lowercase());
        }
        Ok(platform.normalize())
    }

    /// Canonicalize architecture aliases and default variants.
    pub fn normalize(mut self) -> Self {
        self.os = self.os.to_ascii_lowercase();
        let arch = self.architecture.to_ascii_lowercase();
        let variant = self.variant.take().map(|v| v.to_ascii_lowercase());
        let (arch, variant) = match (arch.as_str(), variant.as_deref()) {
            ("x86_64" | "x86-64" | "amd64", _) => ("amd64".to_string(), None),
            ("i386" | "386", _) => ("386".to_string(), None),
            ("aarch64" | "arm64", Some("8") | Some("v8") | None) => {
                ("arm64".to_string(), Some("v8".to_string()))
            }
            ("aarch64" | "arm64", v) => ("arm64".to_string(), v.map(str::to_string)),
            ("armhf", _) => ("arm".to_string(), Some("v7".to_string())),
            ("armel", _) => ("arm".to_string(), Some("v6".to_string())),
            ("arm", None | Some("7")) => ("arm".to_string(), Some("v7".to_string())),
            ("arm", Some("5")) => ("arm".to_string(), Some("v5".to_string())),
            ("arm", Some("6")) => ("arm".to_string(), Some("v6".to_string())),
            (a, v) => (a.to_string(), v.map(str::to_string)),
        };
        self.architecture = arch;
        self.variant = variant;
        self
    }
}

impl FromStr for Platform {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.os, self.architecture)?;
        if let Some(variant) = &self.variant {
            write!(f, "/{variant}")?;
        }
        Ok(())
    }
}
