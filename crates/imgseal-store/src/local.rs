use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use bytes::Bytes;
use imgseal_types::digest::SHA256;
use imgseal_types::Digest;
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};
use crate::traits::{BlobInfo, ContentStore};

/// Filesystem content store laid out as `<root>/blobs/sha256/<hex>`.
///
/// Writes land in a temporary file inside the algorithm directory and are
/// renamed into place, so a blob path only ever holds complete content.
#[derive(Debug, Clone)]
pub struct LocalContentStore {
    root: PathBuf,
}

impl LocalContentStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let store = Self { root: root.into() };
        fs::create_dir_all(store.blob_dir())?;
        debug!(root = %store.root.display(), "opened local content store");
        Ok(store)
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn blob_dir(&self) -> PathBuf {
        self.root.join("blobs").join(SHA256)
    }

    fn blob_path(&self, digest: &Digest) -> PathBuf {
        self.blob_dir().join(digest.hex())
    }
}

impl ContentStore for LocalContentStore {
    fn read(&self, digest: &Digest) -> StoreResult<Option<Bytes>> {
        match fs::read(self.blob_path(digest)) {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, digest: &Digest, data: &[u8]) -> StoreResult<()> {
        let computed = Digest::of(data);
        if computed != *digest {
            return Err(StoreError::DigestMismatch {
                expected: *digest,
                computed,
            });
        }
        let path = self.blob_path(digest);
        if path.exists() {
            return Ok(());
        }
        let mut tmp = tempfile::NamedTempFile::new_in(self.blob_dir())?;
        tmp.write_all(data)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|e| StoreError::Io(e.error))?;
        debug!(digest = %digest, size = data.len(), "stored blob");
        Ok(())
    }

    fn exists(&self, digest: &Digest) -> StoreResult<bool> {
        Ok(self.blob_path(digest).is_file())
    }

    fn delete(&self, digest: &Digest) -> StoreResult<bool> {
        match fs::remove_file(self.blob_path(digest)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn list(&self) -> StoreResult<Vec<Digest>> {
        let mut digests = Vec::new();
        for entry in fs::read_dir(self.blob_dir())? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            match Digest::from_hex(name) {
                Ok(d) => digests.push(d),
                // Leftover temp files and strays are not blobs.
                Err(_) => warn!(file = name, "ignoring non-blob file in blob directory"),
            }
        }
        digests.sort();
        Ok(digests)
    }

    fn info(&self, digest: &Digest) -> StoreResult<Option<BlobInfo>> {
        match fs::metadata(self.blob_path(digest)) {
            Ok(meta) => Ok(Some(BlobInfo {
                digest: *digest,
                size: meta.len(),
            })),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
