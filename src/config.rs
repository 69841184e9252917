//! Tuning knobs for batch planning.
//!
//! All of the planner's numeric thresholds live in [`BatchTuning`], which is
//! passed into [`plan_batches`](crate::planner::plan_batches) explicitly. Tests
//! inject a small `max_batch_bytes` to exercise multi-batch reads without
//! gigabyte inputs.

use crate::error::{ReadError, Result};
use serde::{Deserialize, Serialize};

/// Environment variable that overrides [`BatchTuning::max_batch_bytes`].
pub const BATCH_SIZE_ENV: &str = "IRONJSON_BATCH_SIZE";

/// Immutable planner configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchTuning {
    /// Sub-chunks probed per batch.
    pub num_subchunks: usize,
    /// Lower bound on the size of one sub-chunk, in bytes.
    pub min_subchunk_size: usize,
    /// Multiplier applied to the compressed size of ratio-estimable sources.
    pub estimated_compression_ratio: usize,
    /// Upper bound on sub-chunk buffers allocated up front for probing.
    pub max_subchunks_prealloced: usize,
    /// Safe device-memory budget for a single batch, in bytes.
    pub max_batch_bytes: usize,
}

impl Default for BatchTuning {
    fn default() -> Self {
        Self {
            num_subchunks: 10,
            min_subchunk_size: 10_000,
            estimated_compression_ratio: 4,
            max_subchunks_prealloced: 3,
            // Offsets in the downstream string columns are 32-bit.
            max_batch_bytes: i32::MAX as usize,
        }
    }
}

impl BatchTuning {
    /// Defaults, with `max_batch_bytes` taken from [`BATCH_SIZE_ENV`] when set.
    ///
    /// # Errors
    /// Returns [`ReadError::InvalidOptions`] if the variable is set but is not a
    /// positive integer.
    pub fn from_env() -> Result<Self> {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup (the environment in
    /// [`from_env`](Self::from_env)).
    ///
    /// # Errors
    /// Returns [`ReadError::InvalidOptions`] if an override does not parse.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(BATCH_SIZE_ENV) {
            let bytes: usize = raw.trim().parse().map_err(|_| {
                ReadError::InvalidOptions(format!("{BATCH_SIZE_ENV}={raw:?} is not a byte count"))
            })?;
            self.max_batch_bytes = bytes;
        }
        self.validate()?;
        Ok(self)
    }

    /// Override the per-batch budget.
    #[must_use]
    pub fn with_max_batch_bytes(mut self, bytes: usize) -> Self {
        self.max_batch_bytes = bytes;
        self
    }

    /// Size of one probing sub-chunk for the configured budget.
    #[must_use]
    pub fn subchunk_size(&self) -> usize {
        (self.max_batch_bytes / self.num_subchunks.max(1)).max(self.min_subchunk_size)
    }

    /// Number of probe buffers the planner allocates up front.
    #[must_use]
    pub fn prealloc_buffers(&self) -> usize {
        self.max_subchunks_prealloced.min(self.num_subchunks).max(1)
    }

    /// Check that the budget leaves room for a forward shift of one sub-chunk.
    ///
    /// # Errors
    /// Returns [`ReadError::InvalidOptions`] when a batch could not hold two
    /// sub-chunks or when a ratio or count is zero.
    pub fn validate(&self) -> Result<()> {
        if self.num_subchunks == 0 || self.estimated_compression_ratio == 0 {
            return Err(ReadError::InvalidOptions(
                "num_subchunks and estimated_compression_ratio must be non-zero".into(),
            ));
        }
        if self.max_batch_bytes < 2 * self.subchunk_size() {
            return Err(ReadError::InvalidOptions(format!(
                "max_batch_bytes ({}) must be at least two sub-chunks ({} bytes each)",
                self.max_batch_bytes,
                self.subchunk_size()
            )));
        }
        Ok(())
    }
}
