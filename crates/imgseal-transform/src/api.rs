//! Public entry points.

use std::sync::Arc;

use imgseal_crypto::{CryptoConfig, DecryptConfig, PrivateKey, PublicKey};
use imgseal_meta::{Lease, LeaseManager};
use imgseal_store::ContentStore;
use imgseal_types::Descriptor;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::EngineConfig;
use crate::engine::{Direction, Engine, Sink};
use crate::error::{TransformError, TransformResult};
use crate::filter::{AllLayers, LayerFilter};
use crate::guard::LeaseGuard;

/// Result of a transform.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransformOutcome {
    /// Root of the transformed tree; the input root when nothing changed.
    pub descriptor: Descriptor,
    /// `true` iff the returned root differs from the input root.
    pub modified: bool,
}

/// Runs transforms with a shared engine configuration.
#[derive(Clone, Debug, Default)]
pub struct Transformer {
    config: EngineConfig,
    cancel: Option<CancellationToken>,
}

impl Transformer {
    pub fn new(config: EngineConfig) -> TransformResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            cancel: None,
        })
    }

    /// Builder: abort transforms when `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Create a lease that expires after the configured lease lifetime.
    pub fn acquire_lease(&self, manager: Arc<dyn LeaseManager>) -> TransformResult<LeaseGuard> {
        Ok(LeaseGuard::acquire(manager, self.config.lease_expiration())?)
    }

    /// Encrypt the selected layers of the image rooted at `root` for the
    /// recipients in `cc.encrypt`.
    ///
    /// Layers that are already encrypted gain any missing recipients; their
    /// existing recipients are kept. Every blob written is attached to
    /// `lease`.
    pub async fn encrypt_image<F>(
        &self,
        store: Arc<dyn ContentStore>,
        leases: Arc<dyn LeaseManager>,
        lease: &Lease,
        root: &Descriptor,
        cc: &CryptoConfig,
        filter: F,
    ) -> TransformResult<TransformOutcome>
    where
        F: LayerFilter + 'static,
    {
        let ec = cc.encrypt.as_ref().ok_or_else(|| {
            TransformError::InvalidConfig("encryption requires an encrypt config".into())
        })?;
        let recipients = ec.public_keys().map_err(|e| match e {
            imgseal_crypto::CryptoError::NoRecipients => {
                TransformError::InvalidConfig("no recipient public keys".into())
            }
            other => TransformError::crypto(root.digest, other),
        })?;
        let mut keys = decode_private_keys(root, &ec.decrypt)?;
        if let Some(dc) = &cc.decrypt {
            keys.extend(decode_private_keys(root, dc)?);
        }
        let sink = Sink {
            leases,
            lease_id: lease.id.clone(),
        };
        self.run(store, Some(sink), Direction::Encrypt, root, recipients, keys, Arc::new(filter))
            .await
    }

    /// Decrypt the selected layers of the image rooted at `root` with the
    /// private keys in `cc.decrypt`.
    pub async fn decrypt_image<F>(
        &self,
        store: Arc<dyn ContentStore>,
        leases: Arc<dyn LeaseManager>,
        lease: &Lease,
        root: &Descriptor,
        cc: &CryptoConfig,
        filter: F,
    ) -> TransformResult<TransformOutcome>
    where
        F: LayerFilter + 'static,
    {
        let dc = cc.decrypt.as_ref().ok_or_else(|| {
            TransformError::InvalidConfig("decryption requires a decrypt config".into())
        })?;
        let keys = decode_private_keys(root, dc)?;
        let sink = Sink {
            leases,
            lease_id: lease.id.clone(),
        };
        self.run(store, Some(sink), Direction::Decrypt, root, Vec::new(), keys, Arc::new(filter))
            .await
    }

    /// Verify that `dc` can unwrap every encrypted layer of the image without
    /// writing anything.
    pub async fn check_authorization(
        &self,
        store: Arc<dyn ContentStore>,
        root: &Descriptor,
        dc: &DecryptConfig,
    ) -> TransformResult<()> {
        let keys = decode_private_keys(root, dc)?;
        self.run(store, None, Direction::UnwrapOnly, root, Vec::new(), keys, Arc::new(AllLayers))
            .await
            .map(|_| ())
    }

    #[allow(clippy::too_many_arguments)]
    async fn run(
        &self,
        store: Arc<dyn ContentStore>,
        sink: Option<Sink>,
        direction: Direction,
        root: &Descriptor,
        recipients: Vec<PublicKey>,
        keys: Vec<PrivateKey>,
        filter: Arc<dyn LayerFilter>,
    ) -> TransformResult<TransformOutcome> {
        info!(
            root = %root.digest,
            direction = %direction,
            recipients = recipients.len(),
            keys = keys.len(),
            "transform started"
        );
        let engine = Arc::new(Engine {
            store,
            sink,
            direction,
            recipients,
            keys,
            filter,
            permits: Arc::new(Semaphore::new(self.config.max_concurrency)),
            chunk_size: self.config.chunk_size,
            cancel: self.cancel.clone().unwrap_or_default(),
        });
        let descriptor = engine.process(root.clone(), root.platform.clone()).await?;
        let modified = descriptor.digest != root.digest;
        info!(
            root = %root.digest,
            new_root = %descriptor.digest,
            direction = %direction,
            modified,
            "transform finished"
        );
        Ok(TransformOutcome {
            descriptor,
            modified,
        })
    }
}

fn decode_private_keys(root: &Descriptor, dc: &DecryptConfig) -> TransformResult<Vec<PrivateKey>> {
    dc.private_keys()
        .map_err(|e| TransformError::crypto(root.digest, e))
}

/// Encrypt selected layers with the default engine configuration.
///
/// See [`Transformer::encrypt_image`].
pub async fn encrypt_image<F>(
    store: Arc<dyn ContentStore>,
    leases: Arc<dyn LeaseManager>,
    lease: &Lease,
    root: &Descriptor,
    cc: &CryptoConfig,
    filter: F,
) -> TransformResult<TransformOutcome>
where
    F: LayerFilter + 'static,
{
    Transformer::default()
        .encrypt_image(store, leases, lease, root, cc, filter)
        .await
}

/// Decrypt selected layers with the default engine configuration.
///
/// See [`Transformer::decrypt_image`].
pub async fn decrypt_image<F>(
    store: Arc<dyn ContentStore>,
    leases: Arc<dyn LeaseManager>,
    lease: &Lease,
    root: &Descriptor,
    cc: &CryptoConfig,
    filter: F,
) -> TransformResult<TransformOutcome>
where
    F: LayerFilter + 'static,
{
    Transformer::default()
        .decrypt_image(store, leases, lease, root, cc, filter)
        .await
}

/// Check that `dc` can decrypt every encrypted layer of an image.
///
/// See [`Transformer::check_authorization`].
pub async fn check_authorization(
    store: Arc<dyn ContentStore>,
    root: &Descriptor,
    dc: &DecryptConfig,
) -> TransformResult<()> {
    Transformer::default()
        .check_authorization(store, root, dc)
        .await
}
