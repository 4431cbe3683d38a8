//! Metadata for imgseal: leases, image records, and garbage collection.
//!
//! Content written during a transform is unreachable from any image until
//! the caller registers the new root. Leases bridge that gap: every blob the
//! engine writes is attached to the caller's lease, and the garbage collector
//! treats lease resources as roots until the lease is deleted or expires.
//!
//! [`MetadataStore`] implements both [`LeaseManager`] and [`ImageStore`] in
//! memory on top of any [`ContentStore`](imgseal_store::ContentStore).

pub mod error;
pub mod gc;
pub mod image;
pub mod lease;
pub mod memory;

pub use error::{MetaError, MetaResult};
pub use gc::{spawn_gc_loop, GcStats};
pub use image::{Image, ImageStore};
pub use lease::{DeleteOptions, Lease, LeaseManager, LeaseOptions};
pub use memory::MetadataStore;
