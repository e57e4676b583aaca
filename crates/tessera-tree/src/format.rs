use serde::{Deserialize, Serialize};
use tessera_store::MAX_BUCKET_DEPTH;

use crate::error::{TreeError, TreeResult};

/// Shape parameters of the sharded tree.
///
/// The threshold and depth limit are part of the on-disk format: the same
/// entries built under different parameters produce different root ids.
/// [`TreeFormat::V1`] is the format every store uses unless it explicitly
/// opts out of compatibility.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeFormat {
    /// A tree with at most this many immediate entries is stored flat.
    pub normalization_threshold: usize,
    /// Depth at which trees are stored flat regardless of size.
    pub max_depth: usize,
}

impl TreeFormat {
    pub const V1: Self = Self {
        normalization_threshold: 512,
        max_depth: MAX_BUCKET_DEPTH,
    };

    /// A custom format.
    pub fn new(normalization_threshold: usize, max_depth: usize) -> TreeResult<Self> {
        let format = Self {
            normalization_threshold,
            max_depth,
        };
        format.validate()?;
        Ok(format)
    }

    /// Shorthand for a custom threshold at the default depth limit.
    pub fn with_threshold(normalization_threshold: usize) -> TreeResult<Self> {
        Self::new(normalization_threshold, MAX_BUCKET_DEPTH)
    }

    pub fn from_toml_str(s: &str) -> TreeResult<Self> {
        let format: Self =
            toml::from_str(s).map_err(|e| TreeError::InvalidFormat(e.to_string()))?;
        format.validate()?;
        Ok(format)
    }

    pub fn validate(&self) -> TreeResult<()> {
        if self.normalization_threshold == 0 {
            return Err(TreeError::InvalidFormat(
                "normalization_threshold must be positive".into(),
            ));
        }
        if self.max_depth == 0 || self.max_depth > MAX_BUCKET_DEPTH {
            return Err(TreeError::InvalidFormat(format!(
                "max_depth must be in 1..={MAX_BUCKET_DEPTH}, got {}",
                self.max_depth
            )));
        }
        Ok(())
    }

    /// Whether `entries` immediate entries at `depth` are stored flat.
    pub fn is_leaf(&self, entries: u64, depth: usize) -> bool {
        entries <= self.normalization_threshold as u64 || depth >= self.max_depth
    }
}

impl Default for TreeFormat {
    fn default() -> Self {
        Self::V1
    }
}
