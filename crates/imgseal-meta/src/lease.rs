//! Leases: time-bounded protection of content from garbage collection.
//!
//! A lease holds a set of blob digests. While the lease exists and has not
//! expired, those blobs (and everything reachable from them) survive a GC
//! pass even when no image references them yet.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use imgseal_types::Digest;
use serde::{Deserialize, Serialize};

use crate::error::MetaResult;

/// A GC protection lease.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    pub id: String,
    pub created_at: DateTime<Utc>,
    /// After this instant the lease no longer protects anything.
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl Lease {
    /// Returns `true` if the lease has expired at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    /// Returns `true` if the lease has expired.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

/// Options for [`LeaseManager::create`].
#[derive(Clone, Debug, Default)]
pub struct LeaseOptions {
    pub id: Option<String>,
    pub expiration: Option<Duration>,
    pub labels: BTreeMap<String, String>,
}

impl LeaseOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: use a caller-chosen lease ID.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Builder: use a fresh time-ordered random ID.
    pub fn with_random_id(mut self) -> Self {
        self.id = Some(uuid::Uuid::now_v7().to_string());
        self
    }

    /// Builder: expire the lease `after` its creation.
    pub fn with_expiration(mut self, after: Duration) -> Self {
        self.expiration = Some(after);
        self
    }

    /// Builder: attach a label.
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }
}

/// Options for deleting a lease or an image record.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DeleteOptions {
    /// Run a garbage collection pass before returning.
    pub synchronous: bool,
}

impl DeleteOptions {
    /// Delete and collect garbage before returning.
    pub fn synchronous() -> Self {
        Self { synchronous: true }
    }
}

/// Storage backend for leases.
///
/// Implementations must be thread-safe (`Send + Sync`).
pub trait LeaseManager: Send + Sync {
    /// Create a lease. Fails if the options carry no ID or the ID is taken.
    fn create(&self, options: LeaseOptions) -> MetaResult<Lease>;

    /// Delete a lease, releasing its protection.
    ///
    /// With [`DeleteOptions::synchronous`] a GC pass has completed by the
    /// time this returns; otherwise collection happens on the next
    /// background pass.
    fn delete(&self, lease: &Lease, options: DeleteOptions) -> MetaResult<()>;

    /// Protect a blob under a lease. Fails for unknown or expired leases.
    fn add_resource(&self, lease_id: &str, digest: Digest) -> MetaResult<()>;

    /// Blobs protected by a lease, sorted.
    fn resources(&self, lease_id: &str) -> MetaResult<Vec<Digest>>;

    /// Every live lease, sorted by ID.
    fn list(&self) -> MetaResult<Vec<Lease>>;
}
