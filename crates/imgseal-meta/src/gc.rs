//! Mark-and-sweep garbage collection over the content store.
//!
//! Roots are the targets of every image record plus the resources of every
//! unexpired lease. Marking follows the child references of index and
//! manifest blobs; blobs that do not decode as either are leaves, and
//! references to missing blobs are ignored.
//!
//! The sweep candidates are listed before any root is read. A blob written
//! after that listing is never a candidate, and a writer that leases a
//! digest before writing it is covered by the lease roots otherwise.

use std::collections::HashSet;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use imgseal_types::{Digest, ImageIndex, ImageManifest};
use serde::Deserialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::MetaResult;
use crate::memory::MetadataStore;

/// Outcome of one collection pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GcStats {
    /// Blobs found reachable from a root.
    pub marked: usize,
    /// Blobs deleted.
    pub removed: usize,
    /// Expired leases dropped during the pass.
    pub expired_leases: usize,
}

impl MetadataStore {
    /// Run one mark-and-sweep pass.
    ///
    /// Passes are serialized; a pass started while another runs waits for it.
    pub fn collect_garbage(&self) -> MetaResult<GcStats> {
        let _pass = self.gc_lock.lock().expect("lock poisoned");
        self.dirty.store(false, Ordering::Release);
        let mut stats = GcStats::default();

        let candidates = self.content.list()?;
        let now = Utc::now();
        let mut roots: Vec<Digest> = Vec::new();
        {
            let mut leases = self.leases.write().expect("lock poisoned");
            let before = leases.len();
            leases.retain(|id, record| {
                let keep = !record.lease.is_expired_at(now);
                if !keep {
                    debug!(lease = %id, "dropping expired lease");
                }
                keep
            });
            stats.expired_leases = before - leases.len();
            roots.extend(leases.values().flat_map(|r| r.resources.iter().copied()));
        }
        roots.extend(
            self.images
                .read()
                .expect("lock poisoned")
                .values()
                .map(|i| i.target.digest),
        );

        let marked = self.mark(roots)?;
        stats.marked = marked.len();

        for digest in candidates {
            if !marked.contains(&digest) && self.content.delete(&digest)? {
                stats.removed += 1;
            }
        }
        info!(
            marked = stats.marked,
            removed = stats.removed,
            expired_leases = stats.expired_leases,
            "garbage collection pass"
        );
        Ok(stats)
    }

    fn mark(&self, roots: Vec<Digest>) -> MetaResult<HashSet<Digest>> {
        let mut marked = HashSet::new();
        let mut stack = roots;
        while let Some(digest) = stack.pop() {
            if !marked.insert(digest) {
                continue;
            }
            let Some(data) = self.content.read(&digest)? else {
                marked.remove(&digest);
                continue;
            };
            stack.extend(child_digests(&data).into_iter().filter(|d| !marked.contains(d)));
        }
        Ok(marked)
    }
}

/// Top-level keys deciding how a blob's references are decoded.
#[derive(Deserialize)]
struct Shape {
    #[serde(default)]
    manifests: Option<serde_json::Value>,
    #[serde(default)]
    layers: Option<serde_json::Value>,
}

// Blobs carry no media type of their own, so the document shape decides.
fn child_digests(data: &[u8]) -> Vec<Digest> {
    let Ok(shape) = serde_json::from_slice::<Shape>(data) else {
        return Vec::new();
    };
    if shape.manifests.is_some() {
        if let Ok(index) = ImageIndex::from_slice(data) {
            return index.manifests.iter().map(|d| d.digest).collect();
        }
    } else if shape.layers.is_some() {
        if let Ok(manifest) = ImageManifest::from_slice(data) {
            let mut out = vec![manifest.config.digest];
            out.extend(manifest.layers.iter().map(|d| d.digest));
            return out;
        }
    }
    Vec::new()
}

/// Run collection passes every `period` while deletes are pending, until
/// `cancel` fires.
pub fn spawn_gc_loop(
    store: Arc<MetadataStore>,
    period: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("gc loop stopped");
                    return;
                }
                _ = ticker.tick() => {
                    if !store.is_dirty() {
                        continue;
                    }
                    let pass = Arc::clone(&store);
                    match tokio::task::spawn_blocking(move || pass.collect_garbage()).await {
                        Ok(Ok(_)) => {}
                        Ok(Err(e)) => warn!(error = %e, "garbage collection failed"),
                        Err(e) => warn!(error = %e, "garbage collection task panicked"),
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::{Image, ImageStore};
    use crate::lease::{DeleteOptions, LeaseManager, LeaseOptions};
    use imgseal_store::{BlobInfo, ContentStore, InMemoryContentStore, StoreResult};
    use imgseal_types::{media, Descriptor};

    struct Env {
        content: Arc<InMemoryContentStore>,
        meta: MetadataStore,
    }

    fn env() -> Env {
        let content = Arc::new(InMemoryContentStore::new());
        let meta = MetadataStore::new(content.clone());
        Env { content, meta }
    }

    impl Env {
        fn put(&self, media_type: &str, data: &[u8]) -> Descriptor {
            let d = Descriptor::for_content(media_type, data);
            self.content.write(&d.digest, data).unwrap();
            d
        }

        /// Manifest over one config and one layer; returns (manifest, config, layer).
        fn image(&self, tag: &str) -> (Descriptor, Descriptor, Descriptor) {
            let config = self.put(media::OCI_CONFIG, format!("{{\"tag\":\"{tag}\"}}").as_bytes());
            let layer = self.put(media::OCI_LAYER, tag.as_bytes());
            let m = ImageManifest::new(media::OCI_MANIFEST, config.clone(), vec![layer.clone()]);
            let manifest = self.put(media::OCI_MANIFEST, &m.to_vec().unwrap());
            (manifest, config, layer)
        }
    }

    #[test]
    fn unreferenced_blobs_are_swept() {
        let env = env();
        env.put(media::OCI_LAYER, b"orphan");
        let stats = env.meta.collect_garbage().unwrap();
        assert_eq!(stats.removed, 1);
        assert!(env.content.is_empty());
    }

    #[test]
    fn image_targets_protect_the_whole_tree() {
        let env = env();
        let (manifest, config, layer) = env.image("kept");
        let index = ImageIndex::new(media::OCI_INDEX, vec![manifest.clone()]);
        let root = env.put(media::OCI_INDEX, &index.to_vec().unwrap());
        env.put(media::OCI_LAYER, b"orphan");
        ImageStore::create(&env.meta, Image::new("app", root.clone())).unwrap();

        let stats = env.meta.collect_garbage().unwrap();
        assert_eq!(stats.marked, 4);
        assert_eq!(stats.removed, 1);
        for d in [&root, &manifest, &config, &layer] {
            assert!(env.content.exists(&d.digest).unwrap());
        }
    }

    #[test]
    fn lease_resources_protect_until_released() {
        let env = env();
        let (manifest, _, layer) = env.image("leased");
        let lease = LeaseManager::create(&env.meta, LeaseOptions::new().with_random_id()).unwrap();
        env.meta.add_resource(&lease.id, manifest.digest).unwrap();

        env.meta.collect_garbage().unwrap();
        assert!(env.content.exists(&layer.digest).unwrap());

        LeaseManager::delete(&env.meta, &lease, DeleteOptions::synchronous()).unwrap();
        assert!(env.content.is_empty());
        assert!(!env.meta.is_dirty());
    }

    #[test]
    fn asynchronous_delete_defers_collection() {
        let env = env();
        let (manifest, _, _) = env.image("later");
        let lease = LeaseManager::create(&env.meta, LeaseOptions::new().with_random_id()).unwrap();
        env.meta.add_resource(&lease.id, manifest.digest).unwrap();

        LeaseManager::delete(&env.meta, &lease, DeleteOptions::default()).unwrap();
        assert!(env.meta.is_dirty());
        assert_eq!(env.content.len(), 3);

        env.meta.collect_garbage().unwrap();
        assert!(env.content.is_empty());
    }

    #[test]
    fn expired_leases_are_dropped() {
        let env = env();
        let (manifest, _, _) = env.image("expiring");
        let lease = LeaseManager::create(&env.meta, LeaseOptions::new().with_id("soon")).unwrap();
        env.meta.add_resource(&lease.id, manifest.digest).unwrap();
        {
            let mut leases = env.meta.leases.write().unwrap();
            leases.get_mut("soon").unwrap().lease.expires_at = Some(Utc::now());
        }
        let stats = env.meta.collect_garbage().unwrap();
        assert_eq!(stats.expired_leases, 1);
        assert_eq!(stats.removed, 3);
        assert!(LeaseManager::list(&env.meta).unwrap().is_empty());
    }

    #[test]
    fn missing_children_and_opaque_blobs_are_tolerated() {
        let env = env();
        let config = env.put(media::OCI_CONFIG, b"{\"layers\": 3}");
        let gone = Descriptor::for_content(media::OCI_LAYER, b"never written");
        let m = ImageManifest::new(media::OCI_MANIFEST, config.clone(), vec![gone]);
        let manifest = env.put(media::OCI_MANIFEST, &m.to_vec().unwrap());
        ImageStore::create(&env.meta, Image::new("partial", manifest.clone())).unwrap();

        let stats = env.meta.collect_garbage().unwrap();
        assert_eq!(stats.marked, 2);
        assert_eq!(stats.removed, 0);
        assert!(env.content.exists(&config.digest).unwrap());
    }

    #[test]
    fn deleting_image_synchronously_collects() {
        let env = env();
        let (manifest, _, _) = env.image("short-lived");
        ImageStore::create(&env.meta, Image::new("tmp", manifest)).unwrap();
        ImageStore::delete(&env.meta, "tmp", DeleteOptions::synchronous()).unwrap();
        assert!(env.content.is_empty());
    }

    /// Store whose listing is followed by a write landing mid-pass.
    struct WriteAfterList {
        inner: InMemoryContentStore,
        late: Vec<u8>,
    }

    impl ContentStore for WriteAfterList {
        fn read(&self, digest: &Digest) -> StoreResult<Option<bytes::Bytes>> {
            self.inner.read(digest)
        }
        fn write(&self, digest: &Digest, data: &[u8]) -> StoreResult<()> {
            self.inner.write(digest, data)
        }
        fn exists(&self, digest: &Digest) -> StoreResult<bool> {
            self.inner.exists(digest)
        }
        fn delete(&self, digest: &Digest) -> StoreResult<bool> {
            self.inner.delete(digest)
        }
        fn list(&self) -> StoreResult<Vec<Digest>> {
            let listed = self.inner.list()?;
            self.inner.write(&Digest::of(&self.late), &self.late)?;
            Ok(listed)
        }
        fn info(&self, digest: &Digest) -> StoreResult<Option<BlobInfo>> {
            self.inner.info(digest)
        }
    }

    #[test]
    fn blobs_written_after_listing_survive_the_pass() {
        let content = Arc::new(WriteAfterList {
            inner: InMemoryContentStore::new(),
            late: b"in flight".to_vec(),
        });
        let early = Digest::of(b"orphan");
        content.write(&early, b"orphan").unwrap();
        let meta = MetadataStore::new(content.clone());

        let stats = meta.collect_garbage().unwrap();
        assert_eq!(stats.removed, 1);
        assert!(!content.exists(&early).unwrap());
        assert!(content.exists(&Digest::of(b"in flight")).unwrap());
    }

    #[test]
    fn leased_digest_protects_a_blob_written_later() {
        let env = env();
        let lease = LeaseManager::create(&env.meta, LeaseOptions::new().with_random_id()).unwrap();
        let pending = Digest::of(b"pending");
        env.meta.add_resource(&lease.id, pending).unwrap();

        env.meta.collect_garbage().unwrap();
        env.content.write(&pending, b"pending").unwrap();
        env.meta.collect_garbage().unwrap();
        assert!(env.content.exists(&pending).unwrap());
    }

    #[tokio::test]
    async fn gc_loop_collects_when_dirty() {
        let env = env();
        let meta = Arc::new(env.meta);
        let (manifest, _, _) = {
            let config = Descriptor::for_content(media::OCI_CONFIG, b"{}");
            env.content.write(&config.digest, b"{}").unwrap();
            let m = ImageManifest::new(media::OCI_MANIFEST, config.clone(), vec![]);
            let body = m.to_vec().unwrap();
            let d = Descriptor::for_content(media::OCI_MANIFEST, &body);
            env.content.write(&d.digest, &body).unwrap();
            (d, config, ())
        };
        let lease = LeaseManager::create(&*meta, LeaseOptions::new().with_random_id()).unwrap();
        meta.add_resource(&lease.id, manifest.digest).unwrap();
        LeaseManager::delete(&*meta, &lease, DeleteOptions::default()).unwrap();

        let cancel = CancellationToken::new();
        let handle = spawn_gc_loop(meta.clone(), Duration::from_millis(10), cancel.clone());
        for _ in 0..100 {
            if env.content.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(env.content.is_empty());
        assert!(!meta.is_dirty());

        cancel.cancel();
        handle.await.unwrap();
    }
}
