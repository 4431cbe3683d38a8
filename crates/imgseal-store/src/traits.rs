use bytes::Bytes;
use imgseal_types::Digest;

use crate::error::StoreResult;

/// Size and name of a stored blob.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlobInfo {
    pub digest: Digest,
    pub size: u64,
}

/// Content-addressable blob store.
///
/// All implementations must satisfy these invariants:
/// - A blob's name is the digest of its bytes; a write whose bytes do not
///   hash to the declared digest is rejected.
/// - Blobs are immutable once written, so writing an existing digest again is
///   a no-op.
/// - Concurrent reads and writes are safe.
/// - The store never interprets blob contents.
pub trait ContentStore: Send + Sync {
    /// Read a blob by digest.
    ///
    /// Returns `Ok(None)` if the blob does not exist.
    fn read(&self, digest: &Digest) -> StoreResult<Option<Bytes>>;

    /// Write a blob under its digest.
    fn write(&self, digest: &Digest, data: &[u8]) -> StoreResult<()>;

    /// Check whether a blob exists.
    fn exists(&self, digest: &Digest) -> StoreResult<bool>;

    /// Delete a blob. Returns `true` if the blob existed.
    ///
    /// Intended for garbage collection only.
    fn delete(&self, digest: &Digest) -> StoreResult<bool>;

    /// Every stored digest, sorted.
    fn list(&self) -> StoreResult<Vec<Digest>>;

    /// Size of a stored blob, or `None` if absent.
    fn info(&self, digest: &Digest) -> StoreResult<Option<BlobInfo>>;

    /// Read a blob that must exist.
    fn read_required(&self, digest: &Digest) -> StoreResult<Bytes> {
        self.read(digest)?
            .ok_or(crate::error::StoreError::NotFound(*digest))
    }
}
