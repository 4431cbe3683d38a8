//! The recursive transform engine.
//!
//! Starting from a root descriptor the engine resolves each node's kind from
//! its media type. Selected layers go through the crypto transform; other
//! leaves pass through untouched. Composite nodes process their children
//! concurrently, wait for all of them, and are rewritten only if some child
//! changed. The result is a new root whose unchanged subtrees are shared
//! with the original by digest.

use std::sync::Arc;

use bytes::Bytes;
use futures::future::{try_join_all, BoxFuture};
use futures::FutureExt;
use imgseal_crypto::layer::{add_recipients, decrypt_layer, encrypt_layer, unwrap_layer_key};
use imgseal_crypto::{PrivateKey, PublicKey};
use imgseal_meta::LeaseManager;
use imgseal_store::ContentStore;
use imgseal_types::{Descriptor, Digest, NodeKind, Platform};
use imgseal_walk::{config_platform, read_index, read_manifest};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{TransformError, TransformResult};
use crate::filter::LayerFilter;

/// Which way a transform moves selected layers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Encrypt plain layers; add recipients to encrypted ones.
    Encrypt,
    /// Decrypt encrypted layers.
    Decrypt,
    /// Check that every selected encrypted layer can be unwrapped. Writes
    /// nothing.
    UnwrapOnly,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Encrypt => write!(f, "encrypt"),
            Self::Decrypt => write!(f, "decrypt"),
            Self::UnwrapOnly => write!(f, "unwrap-only"),
        }
    }
}

/// Where rewritten blobs go and which lease protects them.
pub(crate) struct Sink {
    pub(crate) leases: Arc<dyn LeaseManager>,
    pub(crate) lease_id: String,
}

/// Everything one invocation needs, shared by all of its tasks.
pub(crate) struct Engine {
    pub(crate) store: Arc<dyn ContentStore>,
    pub(crate) sink: Option<Sink>,
    pub(crate) direction: Direction,
    pub(crate) recipients: Vec<PublicKey>,
    pub(crate) keys: Vec<PrivateKey>,
    pub(crate) filter: Arc<dyn LayerFilter>,
    pub(crate) permits: Arc<Semaphore>,
    pub(crate) chunk_size: u32,
    pub(crate) cancel: CancellationToken,
}

impl Engine {
    /// Transform the subtree rooted at `desc`.
    ///
    /// `platform` is the platform of the enclosing manifest, when known.
    pub(crate) fn process(
        self: Arc<Self>,
        desc: Descriptor,
        platform: Option<Platform>,
    ) -> BoxFuture<'static, TransformResult<Descriptor>> {
        async move {
            self.check_cancelled()?;
            match desc.kind() {
                NodeKind::Index => self.process_index(desc).await,
                NodeKind::Manifest => self.process_manifest(desc, platform).await,
                NodeKind::Layer => self.process_layer(desc, platform).await,
                NodeKind::Other => Ok(desc),
            }
        }
        .boxed()
    }

    async fn process_index(self: Arc<Self>, desc: Descriptor) -> TransformResult<Descriptor> {
        let mut index = read_index(self.store.as_ref(), &desc)?;
        let children = index.manifests.iter().map(|child| {
            let platform = child.platform.clone();
            Arc::clone(&self).process(child.clone(), platform)
        });
        let rewritten = try_join_all(children).await?;
        if rewritten == index.manifests {
            return Ok(desc);
        }
        index.manifests = rewritten;
        self.check_cancelled()?;
        let data = index
            .to_vec()
            .map_err(|e| TransformError::write(desc.digest, e))?;
        self.rebuild(&desc, data)
    }

    async fn process_manifest(
        self: Arc<Self>,
        desc: Descriptor,
        platform: Option<Platform>,
    ) -> TransformResult<Descriptor> {
        let mut manifest = read_manifest(self.store.as_ref(), &desc)?;
        let platform = match platform.or_else(|| desc.platform.clone()) {
            Some(p) => Some(p),
            None => config_platform(self.store.as_ref(), &manifest.config)?,
        };
        let layers = manifest.layers.iter().map(|layer| {
            Arc::clone(&self).process(layer.clone(), platform.clone())
        });
        let rewritten = try_join_all(layers).await?;
        if rewritten == manifest.layers {
            return Ok(desc);
        }
        manifest.layers = rewritten;
        self.check_cancelled()?;
        let data = manifest
            .to_vec()
            .map_err(|e| TransformError::write(desc.digest, e))?;
        self.rebuild(&desc, data)
    }

    async fn process_layer(
        self: Arc<Self>,
        desc: Descriptor,
        platform: Option<Platform>,
    ) -> TransformResult<Descriptor> {
        let candidate = match (&desc.platform, platform) {
            (None, Some(p)) => desc.clone().with_platform(p),
            _ => desc.clone(),
        };
        if !self.filter.matches(&candidate) {
            return Ok(desc);
        }
        let pass_through = match self.direction {
            Direction::Encrypt => false,
            Direction::Decrypt | Direction::UnwrapOnly => !desc.is_encrypted(),
        };
        if pass_through {
            return Ok(desc);
        }

        let _permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| TransformError::Cancelled)?;
        self.check_cancelled()?;
        let engine = Arc::clone(&self);
        tokio::task::spawn_blocking(move || engine.transform_layer(desc))
            .await
            .map_err(|e| TransformError::Task(e.to_string()))?
    }

    /// Apply the crypto transform to one selected layer. Runs on a blocking
    /// thread.
    fn transform_layer(&self, desc: Descriptor) -> TransformResult<Descriptor> {
        let annotations = desc.annotations.as_ref();
        match self.direction {
            Direction::UnwrapOnly => {
                unwrap_layer_key(annotations, &self.keys)
                    .map_err(|e| TransformError::crypto(desc.digest, e))?;
                debug!(digest = %desc.digest, "layer key unwrapped");
                Ok(desc)
            }
            Direction::Encrypt if desc.is_encrypted() => {
                let updated =
                    add_recipients(&desc.media_type, annotations, &self.recipients, &self.keys)
                        .map_err(|e| TransformError::crypto(desc.digest, e))?;
                match updated {
                    None => Ok(desc),
                    Some(annotations) => {
                        debug!(digest = %desc.digest, "recipients added to encrypted layer");
                        Ok(Descriptor {
                            annotations: Some(annotations),
                            ..desc
                        })
                    }
                }
            }
            Direction::Encrypt => {
                let plain = self.read(&desc.digest)?;
                let enc = encrypt_layer(
                    &plain,
                    &desc.media_type,
                    annotations,
                    &self.recipients,
                    self.chunk_size,
                )
                .map_err(|e| TransformError::crypto(desc.digest, e))?;
                self.store_blob(enc.digest, &enc.data)?;
                debug!(
                    from = %desc.digest,
                    to = %enc.digest,
                    media_type = %enc.media_type,
                    "layer encrypted"
                );
                Ok(Descriptor {
                    media_type: enc.media_type,
                    digest: enc.digest,
                    size: enc.size,
                    annotations: Some(enc.annotations),
                    ..desc
                })
            }
            Direction::Decrypt => {
                let cipher = self.read(&desc.digest)?;
                let dec = decrypt_layer(&cipher, &desc.media_type, annotations, &self.keys)
                    .map_err(|e| TransformError::crypto(desc.digest, e))?;
                self.store_blob(dec.digest, &dec.data)?;
                debug!(
                    from = %desc.digest,
                    to = %dec.digest,
                    media_type = %dec.media_type,
                    "layer decrypted"
                );
                Ok(Descriptor {
                    media_type: dec.media_type,
                    digest: dec.digest,
                    size: dec.size,
                    annotations: dec.annotations,
                    ..desc
                })
            }
        }
    }

    /// Write a rewritten composite and describe it like the original.
    fn rebuild(&self, original: &Descriptor, data: Vec<u8>) -> TransformResult<Descriptor> {
        let digest = Digest::of(&data);
        self.store_blob(digest, &data)?;
        debug!(
            kind = %original.kind(),
            from = %original.digest,
            to = %digest,
            "node rewritten"
        );
        Ok(Descriptor {
            digest,
            size: data.len() as u64,
            ..original.clone()
        })
    }

    /// Attach a blob to the lease, then store it.
    ///
    /// The lease holds the digest before the blob exists, so no collection
    /// pass can observe the blob unprotected.
    fn store_blob(&self, digest: Digest, data: &[u8]) -> TransformResult<()> {
        self.check_cancelled()?;
        let Some(sink) = &self.sink else {
            return Err(TransformError::InvalidConfig(
                "no lease supplied for a writing transform".into(),
            ));
        };
        sink.leases
            .add_resource(&sink.lease_id, digest)
            .map_err(|e| TransformError::write(digest, e))?;
        self.store
            .write(&digest, data)
            .map_err(|e| TransformError::write(digest, e))
    }

    fn read(&self, digest: &Digest) -> TransformResult<Bytes> {
        Ok(self.store.read_required(digest)?)
    }

    fn check_cancelled(&self) -> TransformResult<()> {
        if self.cancel.is_cancelled() {
            return Err(TransformError::Cancelled);
        }
        Ok(())
    }
}
