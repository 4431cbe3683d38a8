//! Image builders shared by the unit tests.

use imgseal_store::{ContentStore, InMemoryContentStore};
use imgseal_types::{media, Descriptor, ImageIndex, ImageManifest, Platform};

pub const AMD64: &str = "linux/amd64";
pub const ARM64: &str = "linux/arm64";

pub struct Fixture {
    pub store: InMemoryContentStore,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            store: InMemoryContentStore::new(),
        }
    }

    pub fn put(&self, media_type: &str, data: &[u8]) -> Descriptor {
        let desc = Descriptor::for_content(media_type, data);
        self.store.write(&desc.digest, data).unwrap();
        desc
    }

    pub fn config(&self, platform: &str) -> Descriptor {
        let p = Platform::parse(platform).unwrap();
        let body = serde_json::json!({
            "architecture": p.architecture,
            "os": p.os,
            "rootfs": { "type": "layers", "diff_ids": [] },
        });
        self.put(media::OCI_CONFIG, body.to_string().as_bytes())
    }

    /// Manifest with `layers` gzip layers whose bytes are unique per platform.
    pub fn manifest(&self, platform: &str, layers: usize) -> Descriptor {
        let config = self.config(platform);
        let layers = (0..layers)
            .map(|i| self.put(media::OCI_LAYER_GZIP, format!("{platform} layer {i}").as_bytes()))
            .collect();
        let m = ImageManifest::new(media::OCI_MANIFEST, config, layers);
        self.put(media::OCI_MANIFEST, &m.to_vec().unwrap())
    }

    /// Index over one manifest per platform, platforms recorded in the index.
    pub fn multi_platform(&self, platforms: &[&str], layers: usize) -> Descriptor {
        let manifests = platforms
            .iter()
            .map(|p| {
                self.manifest(p, layers)
                    .with_platform(Platform::parse(p).unwrap())
            })
            .collect();
        let index = ImageIndex::new(media::OCI_INDEX, manifests);
        self.put(media::OCI_INDEX, &index.to_vec().unwrap())
    }
}
