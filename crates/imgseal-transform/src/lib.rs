//! # imgseal-transform
//!
//! Encrypts and decrypts the layers of an image in place in a content store.
//!
//! A transform walks the tree under a root descriptor. Layers the caller's
//! [`LayerFilter`] selects are encrypted or decrypted. Each manifest and index
//! above a changed layer is rewritten, and everything else is reused by
//! digest. Blobs written during a transform are attached to a caller-supplied
//! lease so garbage collection leaves them alone until the new root is
//! referenced elsewhere.
//!
//! ## Quick start
//!
//! ```ignore
//! let transformer = Transformer::default();
//! let guard = transformer.acquire_lease(leases.clone())?;
//! let out = transformer
//!     .encrypt_image(store, leases, guard.lease(), &root, &cc, AllLayers)
//!     .await?;
//! images.create(Image::new("app:enc", out.descriptor))?;
//! guard.release(true)?;
//! ```

pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod filter;
pub mod guard;

#[cfg(test)]
pub(crate) mod testutil;

pub use api::{check_authorization, decrypt_image, encrypt_image, TransformOutcome, Transformer};
pub use config::EngineConfig;
pub use engine::Direction;
pub use error::{TransformError, TransformResult};
pub use filter::{AllLayers, DigestAllowList, LayerFilter, PlatformLayers};
pub use guard::LeaseGuard;
