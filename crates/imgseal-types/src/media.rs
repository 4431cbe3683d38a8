//! Media type constants and the plain/encrypted layer mapping table.
//!
//! The engine resolves a descriptor's role in the image tree purely from its
//! media type. Encryption never changes the compression family of a layer:
//! a gzip layer becomes a gzip+encrypted layer, and decrypting it yields the
//! gzip layer back.

pub const OCI_INDEX: &str = "application/vnd.oci.image.index.v1+json";
pub const OCI_MANIFEST: &str = "application/vnd.oci.image.manifest.v1+json";
pub const OCI_CONFIG: &str = "application/vnd.oci.image.config.v1+json";

pub const OCI_LAYER: &str = "application/vnd.oci.image.layer.v1.tar";
pub const OCI_LAYER_GZIP: &str = "application/vnd.oci.image.layer.v1.tar+gzip";
pub const OCI_LAYER_ZSTD: &str = "application/vnd.oci.image.layer.v1.tar+zstd";
pub const OCI_LAYER_ENC: &str = "application/vnd.oci.image.layer.v1.tar+encrypted";
pub const OCI_LAYER_GZIP_ENC: &str = "application/vnd.oci.image.layer.v1.tar+gzip+encrypted";
pub const OCI_LAYER_ZSTD_ENC: &str = "application/vnd.oci.image.layer.v1.tar+zstd+encrypted";

pub const DOCKER_MANIFEST_LIST: &str = "application/vnd.docker.distribution.manifest.list.v2+json";
pub const DOCKER_MANIFEST: &str = "application/vnd.docker.distribution.manifest.v2+json";
pub const DOCKER_CONFIG: &str = "application/vnd.docker.container.image.v1+json";

pub const DOCKER_LAYER: &str = "application/vnd.docker.image.rootfs.diff.tar";
pub const DOCKER_LAYER_GZIP: &str = "application/vnd.docker.image.rootfs.diff.tar.gzip";
pub const DOCKER_LAYER_ENC: &str = "application/vnd.docker.image.rootfs.diff.tar+encrypted";
pub const DOCKER_LAYER_GZIP_ENC: &str =
    "application/vnd.docker.image.rootfs.diff.tar.gzip+encrypted";

/// Plain layer type → encrypted layer type.
const LAYER_TABLE: &[(&str, &str)] = &[
    (OCI_LAYER, OCI_LAYER_ENC),
    (OCI_LAYER_GZIP, OCI_LAYER_GZIP_ENC),
    (OCI_LAYER_ZSTD, OCI_LAYER_ZSTD_ENC),
    (DOCKER_LAYER, DOCKER_LAYER_ENC),
    (DOCKER_LAYER_GZIP, DOCKER_LAYER_GZIP_ENC),
];

/// Role of a descriptor in an image tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// Multi-platform manifest list (OCI index or Docker manifest list).
    Index,
    /// Single-platform image manifest.
    Manifest,
    /// Filesystem layer, plain or encrypted.
    Layer,
    /// Any other blob (image config, attestations, unknown types).
    Other,
}

impl NodeKind {
    /// Resolve the node kind of a media type.
    pub fn of(media_type: &str) -> Self {
        match media_type {
            OCI_INDEX | DOCKER_MANIFEST_LIST => Self::Index,
            OCI_MANIFEST | DOCKER_MANIFEST => Self::Manifest,
            mt if is_layer(mt) => Self::Layer,
            _ => Self::Other,
        }
    }

    /// Returns `true` for kinds whose content lists child descriptors.
    pub fn is_composite(self) -> bool {
        matches!(self, Self::Index | Self::Manifest)
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Index => write!(f, "index"),
            Self::Manifest => write!(f, "manifest"),
            Self::Layer => write!(f, "layer"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// Returns `true` if the media type names a layer, plain or encrypted.
pub fn is_layer(media_type: &str) -> bool {
    LAYER_TABLE
        .iter()
        .any(|(plain, enc)| *plain == media_type || *enc == media_type)
}

/// Returns `true` if the media type names an encrypted layer.
pub fn is_encrypted_layer(media_type: &str) -> bool {
    LAYER_TABLE.iter().any(|(_, enc)| *enc == media_type)
}

/// Encrypted counterpart of a plain layer media type.
///
/// Returns `None` for media types that are not plain layers (including
/// layers that are already encrypted).
pub fn encrypted_media_type(media_type: &str) -> Option<&'static str> {
    LAYER_TABLE
        .iter()
        .find(|(plain, _)| *plain == media_type)
        .map(|(_, enc)| *enc)
}

/// Plain counterpart of an encrypted layer media type.
pub fn decrypted_media_type(media_type: &str) -> Option<&'static str> {
    LAYER_TABLE
        .iter()
        .find(|(_, enc)| *enc == media_type)
        .map(|(plain, _)| *plain)
}
