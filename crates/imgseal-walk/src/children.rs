//! Reading composite nodes and walking the tree below a descriptor.

use bytes::Bytes;
use imgseal_store::ContentStore;
use imgseal_types::{Descriptor, ImageIndex, ImageManifest, NodeKind};
use tracing::trace;

use crate::error::{WalkError, WalkResult};

/// What a [`walk`] visitor wants to happen next.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WalkControl {
    /// Descend into the node's children.
    Continue,
    /// Do not descend into this node; continue with its siblings.
    SkipChildren,
    /// End the walk.
    Stop,
}

/// Decode the index named by `desc`.
pub fn read_index(store: &dyn ContentStore, desc: &Descriptor) -> WalkResult<ImageIndex> {
    let data = read_blob(store, desc)?;
    let index = ImageIndex::from_slice(&data)
        .map_err(|e| WalkError::malformed(desc.digest, NodeKind::Index, e))?;
    check_declared(desc, index.media_type.as_deref(), NodeKind::Index)?;
    Ok(index)
}

/// Decode the manifest named by `desc`.
pub fn read_manifest(store: &dyn ContentStore, desc: &Descriptor) -> WalkResult<ImageManifest> {
    let data = read_blob(store, desc)?;
    let manifest = ImageManifest::from_slice(&data)
        .map_err(|e| WalkError::malformed(desc.digest, NodeKind::Manifest, e))?;
    check_declared(desc, manifest.media_type.as_deref(), NodeKind::Manifest)?;
    Ok(manifest)
}

/// Immediate children of a node.
///
/// An index yields its manifests, each carrying the platform recorded in the
/// index. A manifest yields its config followed by its layers in order. Every
/// other kind is a leaf and is not read.
pub fn children(store: &dyn ContentStore, desc: &Descriptor) -> WalkResult<Vec<Descriptor>> {
    match desc.kind() {
        NodeKind::Index => Ok(read_index(store, desc)?.manifests),
        NodeKind::Manifest => {
            let manifest = read_manifest(store, desc)?;
            let mut out = Vec::with_capacity(manifest.layers.len() + 1);
            out.push(manifest.config);
            out.extend(manifest.layers);
            Ok(out)
        }
        NodeKind::Layer | NodeKind::Other => Ok(Vec::new()),
    }
}

/// Depth-first, pre-order traversal from `root`.
///
/// The visitor sees every node before its children. Children of a node are
/// visited in document order.
pub fn walk<F>(store: &dyn ContentStore, root: &Descriptor, mut visitor: F) -> WalkResult<()>
where
    F: FnMut(&Descriptor) -> WalkControl,
{
    let mut stack = vec![root.clone()];
    while let Some(desc) = stack.pop() {
        match visitor(&desc) {
            WalkControl::Stop => {
                trace!(digest = %desc.digest, "walk stopped");
                return Ok(());
            }
            WalkControl::SkipChildren => continue,
            WalkControl::Continue => {
                let kids = children(store, &desc)?;
                stack.extend(kids.into_iter().rev());
            }
        }
    }
    Ok(())
}

fn check_declared(desc: &Descriptor, declared: Option<&str>, expected: NodeKind) -> WalkResult<()> {
    match declared {
        Some(mt) if NodeKind::of(mt) != expected => Err(WalkError::malformed(
            desc.digest,
            expected,
            format!("document declares media type {mt}"),
        )),
        _ => Ok(()),
    }
}

fn read_blob(store: &dyn ContentStore, desc: &Descriptor) -> WalkResult<Bytes> {
    store.read(&desc.digest)?.ok_or(WalkError::NotFound(desc.digest))
}
