//! Image records: named pointers to the root descriptor of an image tree.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use imgseal_types::Descriptor;
use serde::{Deserialize, Serialize};

use crate::error::{MetaError, MetaResult};
use crate::lease::DeleteOptions;

/// A named image. Its target is a GC root.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    pub name: String,
    pub target: Descriptor,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Image {
    pub fn new(name: impl Into<String>, target: Descriptor) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            target,
            labels: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

pub(crate) fn validate_image_name(name: &str) -> MetaResult<()> {
    if name.trim().is_empty() || name.chars().any(char::is_whitespace) {
        return Err(MetaError::InvalidImageName(name.to_string()));
    }
    Ok(())
}

/// Storage backend for image records.
pub trait ImageStore: Send + Sync {
    /// Read an image record. Fails with `ImageNotFound` if absent.
    fn get(&self, name: &str) -> MetaResult<Image>;

    /// Create a record. Fails if the name is taken.
    fn create(&self, image: Image) -> MetaResult<Image>;

    /// Replace the target and labels of an existing record.
    fn update(&self, image: Image) -> MetaResult<Image>;

    /// Delete a record, releasing its target as a GC root.
    fn delete(&self, name: &str, options: DeleteOptions) -> MetaResult<()>;

    /// Every record, sorted by name.
    fn list(&self) -> MetaResult<Vec<Image>>;
}
