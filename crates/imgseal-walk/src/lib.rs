//! Descriptor tree traversal for imgseal.
//!
//! An image is a tree of content-addressed nodes: an optional index at the
//! root, per-platform manifests below it, and config and layer blobs as
//! leaves. This crate reads that tree through a
//! [`ContentStore`](imgseal_store::ContentStore): immediate children,
//! pre-order walks, platform-annotated layer listings, and encryption
//! inspection.

pub mod children;
pub mod error;
pub mod layers;
pub mod platform;

#[cfg(test)]
pub(crate) mod testutil;

pub use children::{children, read_index, read_manifest, walk, WalkControl};
pub use error::{WalkError, WalkResult};
pub use layers::{config_platform, has_encryption, layer_descriptors, layer_infos, LayerInfo};
pub use platform::PlatformMatcher;
