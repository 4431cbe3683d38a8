//! Error taxonomy of a transform invocation.

use imgseal_crypto::CryptoError;
use imgseal_meta::MetaError;
use imgseal_store::StoreError;
use imgseal_types::Digest;
use imgseal_walk::WalkError;
use thiserror::Error;

/// Errors that end a transform.
///
/// A failed transform has no effect on the caller's image. Blobs written
/// before the failure stay in the store under the caller's lease.
#[derive(Debug, Error)]
pub enum TransformError {
    /// A descriptor references a blob the store does not hold.
    #[error("blob not found: {0}")]
    NotFound(Digest),

    /// An index or manifest blob does not decode as its declared kind.
    #[error("malformed manifest {digest}: {reason}")]
    MalformedManifest { digest: Digest, reason: String },

    /// The crypto transform rejected a layer or the key material.
    #[error("crypto failure on {digest}: {source}")]
    CryptoFailure {
        digest: Digest,
        #[source]
        source: CryptoError,
    },

    /// None of the supplied private keys is a recipient of an encrypted
    /// layer.
    #[error("decryption key required for {digest} ({recipients} recipients, none matched)")]
    DecryptionKeyRequired { digest: Digest, recipients: usize },

    /// Storing a blob or attaching it to the lease failed.
    #[error("write failed for {digest}: {reason}")]
    WriteFailure { digest: Digest, reason: String },

    /// Reading a blob failed for a reason other than absence.
    #[error("read failed: {0}")]
    ReadFailure(#[source] StoreError),

    /// The invocation was cancelled.
    #[error("transform cancelled")]
    Cancelled,

    /// The configuration lacks what the requested direction needs.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A worker task panicked.
    #[error("transform task failed: {0}")]
    Task(String),
}

impl TransformError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn is_key_required(&self) -> bool {
        matches!(self, Self::DecryptionKeyRequired { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Attribute a crypto error to the blob it concerns.
    pub fn crypto(digest: Digest, err: CryptoError) -> Self {
        match err {
            CryptoError::DecryptionKeyRequired { recipients } => {
                Self::DecryptionKeyRequired { digest, recipients }
            }
            source => Self::CryptoFailure { digest, source },
        }
    }

    pub(crate) fn write(digest: Digest, reason: impl ToString) -> Self {
        Self::WriteFailure {
            digest,
            reason: reason.to_string(),
        }
    }
}

impl From<WalkError> for TransformError {
    fn from(err: WalkError) -> Self {
        match err {
            WalkError::NotFound(d) => Self::NotFound(d),
            WalkError::MalformedManifest { digest, kind, reason } => Self::MalformedManifest {
                digest,
                reason: format!("{kind}: {reason}"),
            },
            WalkError::Store(e) => Self::ReadFailure(e),
        }
    }
}

impl From<StoreError> for TransformError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(d) => Self::NotFound(d),
            other => Self::ReadFailure(other),
        }
    }
}

impl From<MetaError> for TransformError {
    fn from(err: MetaError) -> Self {
        Self::InvalidConfig(format!("lease: {err}"))
    }
}

/// Convenience alias for transform results.
pub type TransformResult<T> = Result<T, TransformError>;
