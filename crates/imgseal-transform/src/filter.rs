//! Layer selection.
//!
//! A [`LayerFilter`] decides which layers a transform touches. It is consulted
//! once per candidate layer per invocation and never for non-layer nodes. The
//! descriptor it sees carries the platform of the manifest the layer belongs
//! to.

use std::collections::HashSet;

use imgseal_types::{Descriptor, Digest};
use imgseal_walk::PlatformMatcher;

/// Predicate selecting the layers a transform applies to.
pub trait LayerFilter: Send + Sync {
    fn matches(&self, desc: &Descriptor) -> bool;
}

impl<F> LayerFilter for F
where
    F: Fn(&Descriptor) -> bool + Send + Sync,
{
    fn matches(&self, desc: &Descriptor) -> bool {
        self(desc)
    }
}

/// Selects every layer.
#[derive(Clone, Copy, Debug, Default)]
pub struct AllLayers;

impl LayerFilter for AllLayers {
    fn matches(&self, _desc: &Descriptor) -> bool {
        true
    }
}

/// Selects layers whose digest is in a fixed set.
#[derive(Clone, Debug, Default)]
pub struct DigestAllowList {
    digests: HashSet<Digest>,
}

impl DigestAllowList {
    pub fn new(digests: impl IntoIterator<Item = Digest>) -> Self {
        Self {
            digests: digests.into_iter().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.digests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.digests.is_empty()
    }
}

impl FromIterator<Digest> for DigestAllowList {
    fn from_iter<I: IntoIterator<Item = Digest>>(iter: I) -> Self {
        Self::new(iter)
    }
}

impl LayerFilter for DigestAllowList {
    fn matches(&self, desc: &Descriptor) -> bool {
        self.digests.contains(&desc.digest)
    }
}

/// Selects layers belonging to manifests of a platform.
#[derive(Clone, Debug)]
pub struct PlatformLayers {
    matcher: PlatformMatcher,
}

impl PlatformLayers {
    pub fn new(matcher: PlatformMatcher) -> Self {
        Self { matcher }
    }
}

impl LayerFilter for PlatformLayers {
    fn matches(&self, desc: &Descriptor) -> bool {
        self.matcher.matches_descriptor(desc)
    }
}
