//! Image and key fixtures shared by the unit tests.

use std::sync::{Arc, OnceLock};

use bytes::Bytes;
use imgseal_crypto::{
    generate_key_files, generate_rsa_key_files, CryptoConfig, DecryptConfig, EncryptConfig,
};
use imgseal_meta::{LeaseManager, MetadataStore};
use imgseal_store::{BlobInfo, ContentStore, InMemoryContentStore, StoreResult};
use imgseal_types::{media, Descriptor, Digest, ImageIndex, ImageManifest, Platform};

pub const AMD64: &str = "linux/amd64";
pub const ARM64: &str = "linux/arm64";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

pub struct Env {
    pub content: Arc<InMemoryContentStore>,
    pub meta: Arc<MetadataStore>,
}

impl Env {
    pub fn new() -> Self {
        Self::with_content(InMemoryContentStore::new())
    }

    pub fn with_content(content: InMemoryContentStore) -> Self {
        init_tracing();
        let content = Arc::new(content);
        let meta = Arc::new(MetadataStore::new(content.clone()));
        Self { content, meta }
    }

    pub fn store(&self) -> Arc<dyn ContentStore> {
        self.content.clone()
    }

    pub fn leases(&self) -> Arc<dyn LeaseManager> {
        self.meta.clone()
    }

    pub fn put(&self, media_type: &str, data: &[u8]) -> Descriptor {
        let desc = Descriptor::for_content(media_type, data);
        self.content.write(&desc.digest, data).unwrap();
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

    /// Manifest over gzip layers whose bytes are unique per platform.
    pub fn manifest(&self, platform: &str, layers: usize) -> Descriptor {
        let config = self.config(platform);
        let layers = (0..layers)
            .map(|i| {
                let body = format!("{platform} layer {i} ").repeat(64 * (i + 1));
                self.put(media::OCI_LAYER_GZIP, body.as_bytes())
            })
            .collect();
        let m = ImageManifest::new(media::OCI_MANIFEST, config, layers);
        self.put(media::OCI_MANIFEST, &m.to_vec().unwrap())
    }

    /// Index over one manifest per platform, platforms recorded in the index.
    pub fn multi_platform(&self, platforms: &[&str], layers: usize) -> Descriptor {
        let manifests = platforms
            .iter()
            .map(|p| self.manifest(p, layers).with_platform(Platform::parse(p).unwrap()))
            .collect();
        let index = ImageIndex::new(media::OCI_INDEX, manifests);
        self.put(media::OCI_INDEX, &index.to_vec().unwrap())
    }
}

/// Content store that calls `hook` after every successful write.
pub struct OnWrite<F> {
    pub inner: Arc<InMemoryContentStore>,
    pub hook: F,
}

impl<F: Fn(&Digest) + Send + Sync> ContentStore for OnWrite<F> {
    fn read(&self, digest: &Digest) -> StoreResult<Option<Bytes>> {
        self.inner.read(digest)
    }

    fn write(&self, digest: &Digest, data: &[u8]) -> StoreResult<()> {
        self.inner.write(digest, data)?;
        (self.hook)(digest);
        Ok(())
    }

    fn exists(&self, digest: &Digest) -> StoreResult<bool> {
        self.inner.exists(digest)
    }

    fn delete(&self, digest: &Digest) -> StoreResult<bool> {
        self.inner.delete(digest)
    }

    fn list(&self) -> StoreResult<Vec<Digest>> {
        self.inner.list()
    }

    fn info(&self, digest: &Digest) -> StoreResult<Option<BlobInfo>> {
        self.inner.info(digest)
    }
}

/// A recipient: `(public key file, private key file)`.
pub fn recipient() -> (Vec<u8>, Vec<u8>) {
    generate_key_files(None).unwrap()
}

/// An RSA 2048 recipient as PEM files, generated once per test binary.
pub fn rsa_recipient() -> (Vec<u8>, Vec<u8>) {
    static PAIR: OnceLock<(Vec<u8>, Vec<u8>)> = OnceLock::new();
    PAIR.get_or_init(|| generate_rsa_key_files(2048).unwrap()).clone()
}

pub fn encrypt_for(public_keys: &[&[u8]]) -> CryptoConfig {
    CryptoConfig::encryption(EncryptConfig::new(
        public_keys.iter().map(|k| k.to_vec()).collect(),
    ))
}

pub fn decrypt_with(private_keys: &[&[u8]]) -> CryptoConfig {
    CryptoConfig::decryption(decrypt_config(private_keys))
}

pub fn decrypt_config(private_keys: &[&[u8]]) -> DecryptConfig {
    DecryptConfig::new(private_keys.iter().map(|k| k.to_vec()).collect())
}
