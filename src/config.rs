//! Filter configuration and sizing estimates

use crate::{cuckoo::CuckooFilter, CuckooError, Result};
use rand::{rngs::StdRng, RngCore};

/// Reference bucket count
pub const DEFAULT_NUM_BUCKETS: usize = 128;

/// Reference bound on the eviction chain
pub const DEFAULT_MAX_RELOCATIONS: usize = 8;

/// Reference target occupancy (one key per four buckets)
pub const DEFAULT_DESIGNED_LOAD: f64 = 0.25;

/// Largest table whose buckets are all reachable by a 16-bit hash
pub const MAX_NUM_BUCKETS: usize = 1 << 16;

/// Width of the reference workload's keys
pub const DEFAULT_KEY_BYTES: usize = std::mem::size_of::<u16>();

/// Number of distinct 16-bit hash values
const HASH_SPACE: usize = 1 << 16;

/// Construction parameters for a [`CuckooFilter`]
#[derive(Debug, Clone, PartialEq)]
pub struct FilterConfig {
    /// Number of buckets; a power of two in `1..=65536`
    pub num_buckets: usize,
    /// Maximum relocation steps per insert
    pub max_relocations: usize,
    /// Target occupancy in `(0, 1]`; crossing it only raises an advisory
    pub designed_load: f64,
    /// Seed for victim selection. `None` seeds from OS entropy
    pub seed: Option<u64>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        FilterConfig {
            num_buckets: DEFAULT_NUM_BUCKETS,
            max_relocations: DEFAULT_MAX_RELOCATIONS,
            designed_load: DEFAULT_DESIGNED_LOAD,
            seed: None,
        }
    }
}

impl FilterConfig {
    pub fn with_num_buckets(mut self, num_buckets: usize) -> Self {
        self.num_buckets = num_buckets;
        self
    }

    pub fn with_max_relocations(mut self, max_relocations: usize) -> Self {
        self.max_relocations = max_relocations;
        self
    }

    pub fn with_designed_load(mut self, designed_load: f64) -> Self {
        self.designed_load = designed_load;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Check every parameter, reporting the first invalid one
    pub fn validate(&self) -> Result<()> {
        if !self.num_buckets.is_power_of_two() || self.num_buckets > MAX_NUM_BUCKETS {
            return Err(CuckooError::InvalidParameter(format!(
                "Bucket count must be a power of two in 1..={}, got {}",
                MAX_NUM_BUCKETS, self.num_buckets
            )));
        }
        if self.max_relocations == 0 {
            return Err(CuckooError::InvalidParameter(
                "Max relocations must be > 0".to_string(),
            ));
        }
        if !(self.designed_load > 0.0 && self.designed_load <= 1.0) {
            return Err(CuckooError::InvalidParameter(format!(
                "Designed load must be in (0, 1], got {}",
                self.designed_load
            )));
        }
        Ok(())
    }

    /// Number of keys the table is sized for
    pub fn designed_capacity(&self) -> usize {
        (self.num_buckets as f64 * self.designed_load) as usize
    }

    /// Build a filter with a `StdRng` seeded from `seed` or from entropy
    pub fn build(&self) -> Result<CuckooFilter<StdRng>> {
        CuckooFilter::from_config(self)
    }

    /// Build a filter around a caller-supplied randomness source; `seed` is ignored
    pub fn build_with_rng<R: RngCore>(&self, rng: R) -> Result<CuckooFilter<R>> {
        CuckooFilter::from_config_with_rng(self, rng)
    }
}

/// Table sizing for an expected number of keys
#[derive(Debug, Clone)]
pub struct CuckooParameters {
    pub num_buckets: usize,
    pub designed_capacity: usize,
    pub expected_fpr: f64,
}

/// Smallest power-of-two table that keeps `expected_keys` at or under `designed_load`.
///
/// `key_bytes` is the width of the keys that will be inserted and probed.
pub fn estimate_parameters(
    expected_keys: usize,
    designed_load: f64,
    key_bytes: usize,
) -> Result<CuckooParameters> {
    if !(designed_load > 0.0 && designed_load <= 1.0) {
        return Err(CuckooError::InvalidParameter(format!(
            "Designed load must be in (0, 1], got {}",
            designed_load
        )));
    }

    let needed = (expected_keys as f64 / designed_load).ceil() as usize;
    let num_buckets = needed.max(1).next_power_of_two();
    if num_buckets > MAX_NUM_BUCKETS {
        return Err(CuckooError::InvalidParameter(format!(
            "{} keys at load {} need {} buckets, more than {}",
            expected_keys, designed_load, num_buckets, MAX_NUM_BUCKETS
        )));
    }

    Ok(CuckooParameters {
        num_buckets,
        designed_capacity: (num_buckets as f64 * designed_load) as usize,
        expected_fpr: expected_fpr(expected_keys, key_bytes),
    })
}

/// Distinct values the 16-bit DJB hash takes over keys `key_bytes` wide.
///
/// The hash is `5381 * 33^w + sum(b_i * 33^(w-1-i))` mod 2^16. The sum spans
/// `0..=255 * (33^w - 1) / 32` without gaps, so narrow keys reach only part
/// of the 16-bit range: 256 values for one byte, 8671 for two.
pub fn fingerprint_space(key_bytes: usize) -> usize {
    let mut span: usize = 0;
    for _ in 0..key_bytes {
        span = span * 33 + 255;
        if span >= HASH_SPACE {
            return HASH_SPACE;
        }
    }
    span + 1
}

/// False positive estimate for a lookup against `occupied` stored fingerprints.
///
/// A probe's primary bucket comes from its own hash, so it matches exactly
/// when that hash equals a stored fingerprint. Fingerprints are treated as
/// distinct and uniform over [`fingerprint_space`].
pub fn expected_fpr(occupied: usize, key_bytes: usize) -> f64 {
    let space = fingerprint_space(key_bytes) as f64;
    (occupied as f64 / space).min(1.0)
}
