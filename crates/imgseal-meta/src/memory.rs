//! In-memory metadata store.
//!
//! [`MetadataStore`] keeps leases and image records in `RwLock`-guarded maps
//! and owns a handle to the content store it protects, so deleting a lease or
//! image can trigger garbage collection directly.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use chrono::Utc;
use imgseal_store::ContentStore;
use imgseal_types::Digest;
use tracing::{debug, info};

use crate::error::{MetaError, MetaResult};
use crate::image::{validate_image_name, Image, ImageStore};
use crate::lease::{DeleteOptions, Lease, LeaseManager, LeaseOptions};

#[derive(Debug)]
pub(crate) struct LeaseRecord {
    pub(crate) lease: Lease,
    pub(crate) resources: BTreeSet<Digest>,
}

/// In-memory lease manager and image store over a content store.
pub struct MetadataStore {
    pub(crate) content: Arc<dyn ContentStore>,
    pub(crate) leases: RwLock<HashMap<String, LeaseRecord>>,
    pub(crate) images: RwLock<BTreeMap<String, Image>>,
    pub(crate) dirty: AtomicBool,
    pub(crate) gc_lock: Mutex<()>,
}

impl MetadataStore {
    pub fn new(content: Arc<dyn ContentStore>) -> Self {
        Self {
            content,
            leases: RwLock::new(HashMap::new()),
            images: RwLock::new(BTreeMap::new()),
            dirty: AtomicBool::new(false),
            gc_lock: Mutex::new(()),
        }
    }

    /// The content store this metadata protects.
    pub fn content(&self) -> &Arc<dyn ContentStore> {
        &self.content
    }

    /// Returns `true` if a delete has happened since the last GC pass.
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    fn after_delete(&self, options: DeleteOptions) -> MetaResult<()> {
        self.dirty.store(true, Ordering::Release);
        if options.synchronous {
            self.collect_garbage()?;
        }
        Ok(())
    }
}

impl LeaseManager for MetadataStore {
    fn create(&self, options: LeaseOptions) -> MetaResult<Lease> {
        let id = options
            .id
            .ok_or_else(|| MetaError::InvalidLease("lease id required".into()))?;
        let now = Utc::now();
        let expires_at = match options.expiration {
            Some(after) => {
                let after = chrono::Duration::from_std(after)
                    .map_err(|e| MetaError::InvalidLease(format!("expiration: {e}")))?;
                Some(now + after)
            }
            None => None,
        };
        let lease = Lease {
            id: id.clone(),
            created_at: now,
            expires_at,
            labels: options.labels,
        };

        let mut leases = self.leases.write().expect("lock poisoned");
        if leases.contains_key(&id) {
            return Err(MetaError::LeaseExists { id });
        }
        leases.insert(
            id.clone(),
            LeaseRecord {
                lease: lease.clone(),
                resources: BTreeSet::new(),
            },
        );
        info!(lease = %id, expires_at = ?lease.expires_at, "lease created");
        Ok(lease)
    }

    fn delete(&self, lease: &Lease, options: DeleteOptions) -> MetaResult<()> {
        let removed = self.leases.write().expect("lock poisoned").remove(&lease.id);
        let Some(record) = removed else {
            return Err(MetaError::LeaseNotFound {
                id: lease.id.clone(),
            });
        };
        info!(
            lease = %lease.id,
            resources = record.resources.len(),
            synchronous = options.synchronous,
            "lease deleted"
        );
        self.after_delete(options)
    }

    fn add_resource(&self, lease_id: &str, digest: Digest) -> MetaResult<()> {
        let mut leases = self.leases.write().expect("lock poisoned");
        let record = leases.get_mut(lease_id).ok_or_else(|| MetaError::LeaseNotFound {
            id: lease_id.to_string(),
        })?;
        if record.lease.is_expired() {
            return Err(MetaError::LeaseExpired {
                id: lease_id.to_string(),
            });
        }
        if record.resources.insert(digest) {
            debug!(lease = lease_id, digest = %digest, "resource added to lease");
        }
        Ok(())
    }

    fn resources(&self, lease_id: &str) -> MetaResult<Vec<Digest>> {
        let leases = self.leases.read().expect("lock poisoned");
        let record = leases.get(lease_id).ok_or_else(|| MetaError::LeaseNotFound {
            id: lease_id.to_string(),
        })?;
        Ok(record.resources.iter().copied().collect())
    }

    fn list(&self) -> MetaResult<Vec<Lease>> {
        let leases = self.leases.read().expect("lock poisoned");
        let mut out: Vec<Lease> = leases.values().map(|r| r.lease.clone()).collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(out)
    }
}

impl ImageStore for MetadataStore {
    fn get(&self, name: &str) -> MetaResult<Image> {
        let images = self.images.read().expect("lock poisoned");
        images.get(name).cloned().ok_or_else(|| MetaError::ImageNotFound {
            name: name.to_string(),
        })
    }

    fn create(&self, image: Image) -> MetaResult<Image> {
        validate_image_name(&image.name)?;
        let mut images = self.images.write().expect("lock poisoned");
        if images.contains_key(&image.name) {
            return Err(MetaError::ImageExists { name: image.name });
        }
        info!(image = %image.name, target = %image.target.digest, "image created");
        images.insert(image.name.clone(), image.clone());
        Ok(image)
    }

    fn update(&self, image: Image) -> MetaResult<Image> {
        let mut images = self.images.write().expect("lock poisoned");
        let existing = images
            .get_mut(&image.name)
            .ok_or_else(|| MetaError::ImageNotFound {
                name: image.name.clone(),
            })?;
        let replaced = existing.target.digest;
        existing.target = image.target;
        existing.labels = image.labels;
        existing.updated_at = Utc::now();
        let updated = existing.clone();
        drop(images);
        if replaced != updated.target.digest {
            // The old target may now be unreferenced.
            self.dirty.store(true, Ordering::Release);
        }
        info!(image = %updated.name, target = %updated.target.digest, "image updated");
        Ok(updated)
    }

    fn delete(&self, name: &str, options: DeleteOptions) -> MetaResult<()> {
        let removed = self.images.write().expect("lock poisoned").remove(name);
        if removed.is_none() {
            return Err(MetaError::ImageNotFound {
                name: name.to_string(),
            });
        }
        info!(image = name, synchronous = options.synchronous, "image deleted");
        self.after_delete(options)
    }

    fn list(&self) -> MetaResult<Vec<Image>> {
        let images = self.images.read().expect("lock poisoned");
        Ok(images.values().cloned().collect())
    }
}

impl std::fmt::Debug for MetadataStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataStore")
            .field("leases", &self.leases.read().expect("lock poisoned").len())
            .field("images", &self.images.read().expect("lock poisoned").len())
            .field("dirty", &self.is_dirty())
            .finish()
    }
}
