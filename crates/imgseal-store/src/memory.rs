use std::collections::HashMap;
use std::sync::RwLock;

use bytes::Bytes;
use imgseal_types::Digest;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::traits::{BlobInfo, ContentStore};

/// In-memory, HashMap-based content store.
///
/// Intended for tests and embedding. Blobs are held as [`Bytes`] behind a
/// `RwLock`, so reads hand out cheap reference-counted views. An optional
/// capacity bounds the total number of stored bytes.
pub struct InMemoryContentStore {
    blobs: RwLock<HashMap<Digest, Bytes>>,
    capacity: Option<u64>,
}

impl InMemoryContentStore {
    /// Create a new empty, unbounded store.
    pub fn new() -> Self {
        Self {
            blobs: RwLock::new(HashMap::new()),
            capacity: None,
        }
    }

    /// Create a store that rejects writes once `bytes` are stored.
    pub fn with_capacity(bytes: u64) -> Self {
        Self {
            blobs: RwLock::new(HashMap::new()),
            capacity: Some(bytes),
        }
    }

    /// Number of blobs currently stored.
    pub fn len(&self) -> usize {
        self.blobs.read().expect("lock poisoned").len()
    }

    /// Returns `true` if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.blobs.read().expect("lock poisoned").is_empty()
    }

    /// Total bytes across all stored blobs.
    pub fn total_bytes(&self) -> u64 {
        self.blobs
            .read()
            .expect("lock poisoned")
            .values()
            .map(|b| b.len() as u64)
            .sum()
    }

    /// Remove all blobs from the store.
    pub fn clear(&self) {
        self.blobs.write().expect("lock poisoned").clear();
    }
}

impl Default for InMemoryContentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentStore for InMemoryContentStore {
    fn read(&self, digest: &Digest) -> StoreResult<Option<Bytes>> {
        let map = self.blobs.read().expect("lock poisoned");
        Ok(map.get(digest).cloned())
    }

    fn write(&self, digest: &Digest, data: &[u8]) -> StoreResult<()> {
        let computed = Digest::of(data);
        if computed != *digest {
            return Err(StoreError::DigestMismatch {
                expected: *digest,
                computed,
            });
        }
        let mut map = self.blobs.write().expect("lock poisoned");
        if map.contains_key(digest) {
            return Ok(());
        }
        if let Some(capacity) = self.capacity {
            let used: u64 = map.values().map(|b| b.len() as u64).sum();
            let needed = data.len() as u64;
            let available = capacity.saturating_sub(used);
            if needed > available {
                return Err(StoreError::OutOfSpace { needed, available });
            }
        }
        map.insert(*digest, Bytes::copy_from_slice(data));
        debug!(digest = %digest, size = data.len(), "stored blob");
        Ok(())
    }

    fn exists(&self, digest: &Digest) -> StoreResult<bool> {
        let map = self.blobs.read().expect("lock poisoned");
        Ok(map.contains_key(digest))
    }

    fn delete(&self, digest: &Digest) -> StoreResult<bool> {
        let mut map = self.blobs.write().expect("lock poisoned");
        Ok(map.remove(digest).is_some())
    }

    fn list(&self) -> StoreResult<Vec<Digest>> {
        let map = self.blobs.read().expect("lock poisoned");
        let mut digests: Vec<Digest> = map.keys().copied().collect();
        digests.sort();
        Ok(digests)
    }

    fn info(&self, digest: &Digest) -> StoreResult<Option<BlobInfo>> {
        let map = self.blobs.read().expect("lock poisoned");
        Ok(map.get(digest).map(|b| BlobInfo {
            digest: *digest,
            size: b.len() as u64,
        }))
    }
}

impl std::fmt::Debug for InMemoryContentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryContentStore")
            .field("blob_count", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}
