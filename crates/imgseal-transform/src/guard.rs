//! Scoped lease ownership.

use std::sync::Arc;
use std::time::Duration;

use imgseal_meta::{DeleteOptions, Lease, LeaseManager, LeaseOptions, MetaResult};
use tracing::{debug, warn};

/// Owns a freshly created lease for the duration of a transform.
///
/// The lease is deleted exactly once: by [`LeaseGuard::release`], or when the
/// guard is dropped without being released. A drop-time delete does not wait
/// for garbage collection.
pub struct LeaseGuard {
    manager: Arc<dyn LeaseManager>,
    lease: Lease,
    released: bool,
}

impl LeaseGuard {
    /// Create a lease with a random ID that expires after `expiration`.
    pub fn acquire(manager: Arc<dyn LeaseManager>, expiration: Duration) -> MetaResult<Self> {
        let lease = manager.create(
            LeaseOptions::new()
                .with_random_id()
                .with_expiration(expiration),
        )?;
        debug!(lease = %lease.id, "lease acquired");
        Ok(Self {
            manager,
            lease,
            released: false,
        })
    }

    pub fn lease(&self) -> &Lease {
        &self.lease
    }

    pub fn manager(&self) -> &Arc<dyn LeaseManager> {
        &self.manager
    }

    /// Delete the lease now. With `synchronous`, garbage collection has run
    /// by the time this returns.
    pub fn release(mut self, synchronous: bool) -> MetaResult<()> {
        self.released = true;
        let options = if synchronous {
            DeleteOptions::synchronous()
        } else {
            DeleteOptions::default()
        };
        self.manager.delete(&self.lease, options)
    }
}

impl Drop for LeaseGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = self.manager.delete(&self.lease, DeleteOptions::default()) {
            warn!(lease = %self.lease.id, error = %e, "failed to release lease on drop");
        }
    }
}

impl std::fmt::Debug for LeaseGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeaseGuard")
            .field("lease", &self.lease.id)
            .field("released", &self.released)
            .finish()
    }
}
