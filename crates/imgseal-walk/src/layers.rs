//! Layer-centric queries over an image tree.

use imgseal_store::ContentStore;
use imgseal_types::{ConfigPlatform, Descriptor, NodeKind, Platform};
use tracing::debug;

use crate::children::{children, read_index, read_manifest};
use crate::error::{WalkError, WalkResult};

/// One layer of an image, as reported by [`layer_infos`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LayerInfo {
    /// Position of the layer within its manifest.
    pub index: usize,
    /// The layer descriptor, with its platform filled in when known.
    pub descriptor: Descriptor,
    pub encrypted: bool,
    /// Recipient key fingerprints; empty for plain layers.
    pub recipients: Vec<String>,
}

/// Every layer reachable from `root`, each annotated with its platform.
///
/// A layer inherits the platform its manifest carries in the parent index.
/// When the index gives none (or the root is a bare manifest), the platform
/// is read from the manifest's config blob. Layers are returned in tree order.
pub fn layer_descriptors(
    store: &dyn ContentStore,
    root: &Descriptor,
) -> WalkResult<Vec<Descriptor>> {
    let mut groups = Vec::new();
    collect_layers(store, root, None, &mut groups)?;
    Ok(groups.into_iter().flatten().collect())
}

// Layers are gathered one group per manifest.
fn collect_layers(
    store: &dyn ContentStore,
    desc: &Descriptor,
    inherited: Option<&Platform>,
    out: &mut Vec<Vec<Descriptor>>,
) -> WalkResult<()> {
    match desc.kind() {
        NodeKind::Index => {
            for child in read_index(store, desc)?.manifests {
                let platform = child.platform.clone().or_else(|| inherited.cloned());
                collect_layers(store, &child, platform.as_ref(), out)?;
            }
        }
        NodeKind::Manifest => {
            let manifest = read_manifest(store, desc)?;
            let platform = match desc.platform.as_ref().or(inherited) {
                Some(p) => Some(p.clone()),
                None => config_platform(store, &manifest.config)?,
            };
            out.push(
                manifest
                    .layers
                    .into_iter()
                    .map(|mut layer| {
                        if layer.platform.is_none() {
                            layer.platform = platform.clone();
                        }
                        layer
                    })
                    .collect(),
            );
        }
        NodeKind::Layer => out.push(vec![desc.clone()]),
        NodeKind::Other => {}
    }
    Ok(())
}

/// Platform recorded in a manifest's config blob, if the config names one.
///
/// Fails with `NotFound` when the config blob is absent and
/// `MalformedManifest` when it is not a JSON object.
pub fn config_platform(
    store: &dyn ContentStore,
    config: &Descriptor,
) -> WalkResult<Option<Platform>> {
    let Some(data) = store.read(&config.digest)? else {
        return Err(WalkError::NotFound(config.digest));
    };
    let parsed = ConfigPlatform::from_slice(&data)
        .map_err(|e| WalkError::malformed(config.digest, "config", e))?;
    Ok(parsed.platform())
}

/// Returns `true` if any descriptor reachable from `root` is an encrypted
/// layer.
///
/// Nodes whose children cannot be read are treated as unencrypted.
pub fn has_encryption(store: &dyn ContentStore, root: &Descriptor) -> bool {
    let mut stack = vec![root.clone()];
    while let Some(desc) = stack.pop() {
        if desc.is_encrypted() {
            return true;
        }
        match children(store, &desc) {
            Ok(kids) => stack.extend(kids),
            Err(e) => debug!(digest = %desc.digest, error = %e, "skipping unreadable node"),
        }
    }
    false
}

/// Per-layer details for every manifest reachable from `root`.
pub fn layer_infos(store: &dyn ContentStore, root: &Descriptor) -> WalkResult<Vec<LayerInfo>> {
    let mut groups = Vec::new();
    collect_layers(store, root, None, &mut groups)?;
    let mut out = Vec::new();
    for group in groups {
        for (index, descriptor) in group.into_iter().enumerate() {
            let encrypted = descriptor.is_encrypted();
            let recipients = if encrypted {
                imgseal_crypto::layer::recipients(descriptor.annotations.as_ref())
                    .map_err(|e| WalkError::malformed(descriptor.digest, NodeKind::Layer, e))?
            } else {
                Vec::new()
            };
            out.push(LayerInfo {
                index,
                descriptor,
                encrypted,
                recipients,
            });
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{Fixture, AMD64, ARM64};
    use imgseal_crypto::layer::encrypt_layer;
    use imgseal_crypto::PrivateKey;
    use imgseal_types::{media, ImageIndex, ImageManifest};

    #[test]
    fn layers_inherit_index_platform() {
        let fx = Fixture::new();
        let root = fx.multi_platform(&[AMD64, ARM64], 2);
        let layers = layer_descriptors(&fx.store, &root).unwrap();
        assert_eq!(layers.len(), 4);
        let arches: Vec<&str> = layers
            .iter()
            .map(|l| l.platform.as_ref().unwrap().architecture.as_str())
            .collect();
        assert_eq!(arches, ["amd64", "amd64", "arm64", "arm64"]);
    }

    #[test]
    fn bare_manifest_reads_platform_from_config() {
        let fx = Fixture::new();
        let root = fx.manifest(ARM64, 1);
        let layers = layer_descriptors(&fx.store, &root).unwrap();
        assert_eq!(layers[0].platform, Some(Platform::parse(ARM64).unwrap()));
    }

    #[test]
    fn index_without_platforms_falls_back_to_config() {
        let fx = Fixture::new();
        let m = fx.manifest(AMD64, 1);
        let index = ImageIndex::new(media::OCI_INDEX, vec![m]);
        let root = fx.put(media::OCI_INDEX, &index.to_vec().unwrap());
        let layers = layer_descriptors(&fx.store, &root).unwrap();
        assert_eq!(layers[0].platform.as_ref().unwrap().architecture, "amd64");
    }

    #[test]
    fn config_without_platform_leaves_layer_bare() {
        let fx = Fixture::new();
        let config = fx.put(media::OCI_CONFIG, b"{}");
        let layer = fx.put(media::OCI_LAYER, b"l");
        let m = ImageManifest::new(media::OCI_MANIFEST, config, vec![layer]);
        let root = fx.put(media::OCI_MANIFEST, &m.to_vec().unwrap());
        let layers = layer_descriptors(&fx.store, &root).unwrap();
        assert!(layers[0].platform.is_none());
    }

    #[test]
    fn missing_manifest_fails() {
        let fx = Fixture::new();
        let m = Descriptor::for_content(media::OCI_MANIFEST, b"gone");
        let index = ImageIndex::new(media::OCI_INDEX, vec![m]);
        let root = fx.put(media::OCI_INDEX, &index.to_vec().unwrap());
        assert!(matches!(
            layer_descriptors(&fx.store, &root),
            Err(WalkError::NotFound(_))
        ));
    }

    fn encrypted_image(fx: &Fixture) -> (Descriptor, String) {
        let sk = PrivateKey::generate();
        let enc = encrypt_layer(b"secret", media::OCI_LAYER_GZIP, None, &[sk.public_key()], 1024)
            .unwrap();
        let mut layer = fx.put(&enc.media_type, &enc.data);
        layer.annotations = Some(enc.annotations);
        let config = fx.config(AMD64);
        let plain = fx.put(media::OCI_LAYER_GZIP, b"plain");
        let m = ImageManifest::new(media::OCI_MANIFEST, config, vec![plain, layer]);
        (
            fx.put(media::OCI_MANIFEST, &m.to_vec().unwrap()),
            sk.public_key().fingerprint(),
        )
    }

    #[test]
    fn has_encryption_detects_encrypted_layers() {
        let fx = Fixture::new();
        let plain = fx.multi_platform(&[AMD64, ARM64], 2);
        assert!(!has_encryption(&fx.store, &plain));
        let (enc, _) = encrypted_image(&fx);
        assert!(has_encryption(&fx.store, &enc));
    }

    #[test]
    fn has_encryption_ignores_unreadable_nodes() {
        let fx = Fixture::new();
        let missing = Descriptor::for_content(media::OCI_MANIFEST, b"missing");
        assert!(!has_encryption(&fx.store, &missing));
        let index = ImageIndex::new(media::OCI_INDEX, vec![missing]);
        let root = fx.put(media::OCI_INDEX, &index.to_vec().unwrap());
        assert!(!has_encryption(&fx.store, &root));
    }

    #[test]
    fn layer_infos_report_recipients() {
        let fx = Fixture::new();
        let (root, fingerprint) = encrypted_image(&fx);
        let infos = layer_infos(&fx.store, &root).unwrap();
        assert_eq!(infos.len(), 2);
        assert_eq!(infos[0].index, 0);
        assert!(!infos[0].encrypted);
        assert!(infos[0].recipients.is_empty());
        assert_eq!(infos[1].index, 1);
        assert!(infos[1].encrypted);
        assert_eq!(infos[1].recipients, vec![fingerprint]);
    }

    #[test]
    fn layer_infos_restart_positions_per_manifest() {
        let fx = Fixture::new();
        let root = fx.multi_platform(&[AMD64, ARM64], 2);
        let positions: Vec<usize> = layer_infos(&fx.store, &root)
            .unwrap()
            .iter()
            .map(|i| i.index)
            .collect();
        assert_eq!(positions, [0, 1, 0, 1]);
    }
}
