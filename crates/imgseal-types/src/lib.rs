//! Foundation types for imgseal.
//!
//! This crate provides the content-addressing and image-document types used
//! throughout the workspace. Every other imgseal crate depends on
//! `imgseal-types`.
//!
//! # Key Types
//!
//! - [`Digest`]: SHA-256 content digest (`sha256:<hex>`)
//! - [`Descriptor`]: media type, digest, size, annotations, platform
//! - [`Platform`]: OS/architecture target of a manifest
//! - [`ImageManifest`] / [`ImageIndex`]: the composite nodes of an image tree
//! - [`NodeKind`]: role of a descriptor, resolved from its media type

pub mod descriptor;
pub mod digest;
pub mod error;
pub mod manifest;
pub mod media;

pub use descriptor::{Annotations, Descriptor, Platform};
pub use digest::Digest;
pub use error::TypeError;
pub use manifest::{ConfigPlatform, ImageIndex, ImageManifest};
pub use media::NodeKind;
