//! Error types for descriptor tree traversal.

use imgseal_store::StoreError;
use imgseal_types::Digest;

/// Errors that can occur while reading an image tree.
#[derive(Debug, thiserror::Error)]
pub enum WalkError {
    /// A descriptor references a blob the store does not hold.
    #[error("blob not found: {0}")]
    NotFound(Digest),

    /// A composite blob does not decode as the kind its descriptor declares.
    #[error("malformed {kind} {digest}: {reason}")]
    MalformedManifest {
        digest: Digest,
        kind: String,
        reason: String,
    },

    /// The content store failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl WalkError {
    pub(crate) fn malformed(digest: Digest, kind: impl ToString, reason: impl ToString) -> Self {
        Self::MalformedManifest {
            digest,
            kind: kind.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Convenience alias for walk results.
pub type WalkResult<T> = Result<T, WalkError>;
