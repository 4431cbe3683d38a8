//! Error types for metadata operations.

use imgseal_store::StoreError;
use thiserror::Error;

/// Errors that can occur during lease, image, and GC operations.
#[derive(Debug, Error)]
pub enum MetaError {
    /// No lease with this ID exists.
    #[error("lease not found: {id}")]
    LeaseNotFound { id: String },

    /// A lease with this ID already exists.
    #[error("lease already exists: {id}")]
    LeaseExists { id: String },

    /// The lease has passed its expiration and no longer protects content.
    #[error("lease expired: {id}")]
    LeaseExpired { id: String },

    /// Lease options are incomplete.
    #[error("invalid lease: {0}")]
    InvalidLease(String),

    /// No image record with this name exists.
    #[error("image not found: {name}")]
    ImageNotFound { name: String },

    /// An image record with this name already exists.
    #[error("image already exists: {name}")]
    ImageExists { name: String },

    /// The image name is empty or otherwise unusable.
    #[error("invalid image name: {0:?}")]
    InvalidImageName(String),

    /// The content store failed during garbage collection.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Convenience alias for metadata results.
pub type MetaResult<T> = Result<T, MetaError>;
