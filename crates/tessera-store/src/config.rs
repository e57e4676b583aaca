use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::codec::DEFAULT_COMPRESSION_LEVEL;
use crate::error::{StoreError, StoreResult};

/// Object database settings. Every field has a default, so a TOML file
/// only needs to name what it changes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// zstd level applied to stored objects.
    pub compression_level: i32,
    /// Recompute content hashes when decoding objects read from the store.
    pub verify_hashes: bool,
    /// `fsync` loose object files before they are linked into place.
    pub fsync: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            verify_hashes: true,
            fsync: false,
        }
    }
}

impl StoreConfig {
    pub fn from_toml_str(s: &str) -> StoreResult<Self> {
        let config: Self = toml::from_str(s).map_err(|e| StoreError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read a TOML configuration file.
    pub fn load(path: &Path) -> StoreResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> StoreResult<()> {
        let range = zstd::compression_level_range();
        if !range.contains(&self.compression_level) {
            return Err(StoreError::Config(format!(
                "compression_level {} outside {}..={}",
                self.compression_level,
                range.start(),
                range.end()
            )));
        }
        Ok(())
    }
}
