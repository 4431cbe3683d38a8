//! Content-addressable blob storage for imgseal.
//!
//! Every node of an image tree (index, manifest, config, layer) is an
//! immutable blob named by the SHA-256 digest of its bytes. The transform
//! engine reads nodes through a [`ContentStore`] and writes rewritten nodes
//! back under their new digests.
//!
//! # Storage Backends
//!
//! - [`InMemoryContentStore`] -- `HashMap`-based store for tests and embedding,
//!   with an optional byte capacity
//! - [`LocalContentStore`] -- one file per blob under `blobs/sha256/`
//!
//! # Design Rules
//!
//! 1. Blobs are immutable once written; rewriting a digest is a no-op.
//! 2. Writes verify the declared digest before anything is stored.
//! 3. Concurrent reads are always safe.
//! 4. The store never interprets blob contents.

pub mod error;
pub mod local;
pub mod memory;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use local::LocalContentStore;
pub use memory::InMemoryContentStore;
pub use traits::{BlobInfo, ContentStore};
