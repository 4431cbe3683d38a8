//! Image documents: manifests, indexes, and the platform part of an image
//! config.
//!
//! Unknown top-level fields are captured in `extra` so that a document can be
//! decoded, have its child descriptors replaced, and be re-encoded without
//! losing anything the engine does not understand.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::descriptor::{Annotations, Descriptor, Platform};
use crate::error::TypeError;

/// Single-platform image manifest: one config blob plus ordered layers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageManifest {
    pub schema_version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    pub config: Descriptor,
    pub layers: Vec<Descriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<Descriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<Annotations>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ImageManifest {
    /// Create a schema-2 manifest.
    pub fn new(media_type: &str, config: Descriptor, layers: Vec<Descriptor>) -> Self {
        Self {
            schema_version: 2,
            media_type: Some(media_type.to_string()),
            config,
            layers,
            subject: None,
            annotations: None,
            extra: Map::new(),
        }
    }

    /// Decode from JSON bytes.
    pub fn from_slice(data: &[u8]) -> Result<Self, TypeError> {
        serde_json::from_slice(data).map_err(|e| TypeError::Serialization(e.to_string()))
    }

    /// Encode to canonical (compact) JSON bytes.
    pub fn to_vec(&self) -> Result<Vec<u8>, TypeError> {
        serde_json::to_vec(self).map_err(|e| TypeError::Serialization(e.to_string()))
    }
}

/// Multi-platform index listing per-platform manifests.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageIndex {
    pub schema_version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    pub manifests: Vec<Descriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<Annotations>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ImageIndex {
    /// Create a schema-2 index.
    pub fn new(media_type: &str, manifests: Vec<Descriptor>) -> Self {
        Self {
            schema_version: 2,
            media_type: Some(media_type.to_string()),
            manifests,
            annotations: None,
            extra: Map::new(),
        }
    }

    /// Decode from JSON bytes.
    pub fn from_slice(data: &[u8]) -> Result<Self, TypeError> {
        serde_json::from_slice(data).map_err(|e| TypeError::Serialization(e.to_string()))
    }

    /// Encode to canonical (compact) JSON bytes.
    pub fn to_vec(&self) -> Result<Vec<u8>, TypeError> {
        serde_json::to_vec(self).map_err(|e| TypeError::Serialization(e.to_string()))
    }
}

/// The fields of an image config that identify its platform.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct ConfigPlatform {
    #[serde(default)]
    pub architecture: String,
    #[serde(default)]
    pub os: String,
    #[serde(default)]
    pub variant: Option<String>,
}

impl ConfigPlatform {
    /// Decode the platform fields from an image config blob.
    pub fn from_slice(data: &[u8]) -> Result<Self, TypeError> {
        serde_json::from_slice(data).map_err(|e| TypeError::Serialization(e.to_string()))
    }

    /// The platform, if the config names one.
    pub fn platform(&self) -> Option<Platform> {
        if self.os.is_empty() || self.architecture.is_empty() {
            return None;
        }
        let mut platform = Platform::new(self.os.clone(), self.architecture.clone());
        platform.variant = self.variant.clone();
        Some(platform.normalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media;

    fn layer(data: &[u8]) -> Descriptor {
        Descriptor::for_content(media::OCI_LAYER_GZIP, data)
    }

    #[test]
    fn manifest_roundtrip_is_byte_stable() {
        let m = ImageManifest::new(
            media::OCI_MANIFEST,
            Descriptor::for_content(media::OCI_CONFIG, b"{}"),
            vec![layer(b"a"), layer(b"b")],
        );
        let bytes = m.to_vec().unwrap();
        let decoded = ImageManifest::from_slice(&bytes).unwrap();
        assert_eq!(decoded, m);
        assert_eq!(decoded.to_vec().unwrap(), bytes);
    }

    #[test]
    fn manifest_preserves_unknown_fields() {
        let config = Descriptor::for_content(media::OCI_CONFIG, b"{}");
        let raw = serde_json::json!({
            "schemaVersion": 2,
            "mediaType": media::OCI_MANIFEST,
            "artifactType": "application/example",
            "config": config,
            "layers": [],
        });
        let m = ImageManifest::from_slice(raw.to_string().as_bytes()).unwrap();
        assert_eq!(m.extra["artifactType"], "application/example");
        let again: Value = serde_json::from_slice(&m.to_vec().unwrap()).unwrap();
        assert_eq!(again["artifactType"], "application/example");
    }

    #[test]
    fn manifest_requires_config_and_layers() {
        let raw = br#"{"schemaVersion":2,"manifests":[]}"#;
        assert!(ImageManifest::from_slice(raw).is_err());
    }

    #[test]
    fn index_roundtrip() {
        let m = Descriptor::for_content(media::OCI_MANIFEST, b"m")
            .with_platform(Platform::new("linux", "arm64"));
        let idx = ImageIndex::new(media::OCI_INDEX, vec![m]);
        let decoded = ImageIndex::from_slice(&idx.to_vec().unwrap()).unwrap();
        assert_eq!(decoded, idx);
        assert_eq!(decoded.manifests[0].platform.as_ref().unwrap().os, "linux");
    }

    #[test]
    fn config_platform_is_normalized() {
        let cfg = br#"{"architecture":"x86_64","os":"linux","rootfs":{"type":"layers"}}"#;
        let p = ConfigPlatform::from_slice(cfg).unwrap().platform().unwrap();
        assert_eq!(p, Platform::new("linux", "amd64"));
    }

    #[test]
    fn config_without_platform() {
        let p = ConfigPlatform::from_slice(b"{}").unwrap();
        assert!(p.platform().is_none());
    }
}
