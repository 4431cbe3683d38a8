use std::time::Duration;

use imgseal_crypto::cipher::{DEFAULT_CHUNK_SIZE, MAX_CHUNK_SIZE};
use serde::{Deserialize, Serialize};

use crate::error::{TransformError, TransformResult};

/// Tuning for the transform engine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum number of layers transformed at once.
    pub max_concurrency: usize,
    /// Plaintext bytes per cipher chunk for newly encrypted layers.
    pub chunk_size: u32,
    /// Lifetime, in seconds, of leases acquired through
    /// [`Transformer::acquire_lease`](crate::Transformer::acquire_lease).
    pub lease_expiration_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 8,
            chunk_size: DEFAULT_CHUNK_SIZE,
            lease_expiration_secs: 5 * 60,
        }
    }
}

impl EngineConfig {
    /// Parse a TOML document; missing keys take their defaults.
    pub fn from_toml_str(s: &str) -> TransformResult<Self> {
        let config: Self =
            toml::from_str(s).map_err(|e| TransformError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> TransformResult<()> {
        if self.max_concurrency == 0 {
            return Err(TransformError::InvalidConfig(
                "max_concurrency must be at least 1".into(),
            ));
        }
        if self.chunk_size == 0 || self.chunk_size > MAX_CHUNK_SIZE {
            return Err(TransformError::InvalidConfig(format!(
                "chunk_size must be between 1 and {MAX_CHUNK_SIZE}"
            )));
        }
        if self.lease_expiration_secs == 0 {
            return Err(TransformError::InvalidConfig(
                "lease_expiration_secs must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn lease_expiration(&self) -> Duration {
        Duration::from_secs(self.lease_expiration_secs)
    }
}
