use crate::{Error, Result};

#[cfg(feature = "serde-serialize")]
use serde::{Deserialize, Serialize};

/// The largest primary code supported. The primary table is a dense array of `2^bits` buckets.
pub const MAX_PRIMARY_BITS: usize = 16;

/// Secondary codes are packed into one `u64` per table.
pub const MAX_SECONDARY_BITS: usize = 64;

/// The settings for one matching run.
///
/// Every image in a run is hashed with projections generated from these settings,
/// so they must not change between indexing and matching.
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct MatcherSettings {
    /// A match is accepted if its distance is below this ratio of the second best distance.
    #[cfg_attr(
        feature = "serde-serialize",
        serde(default = "default_distance_ratio")
    )]
    pub distance_ratio: f32,
    /// The number of bits of the primary code, which selects the bucket.
    #[cfg_attr(feature = "serde-serialize", serde(default = "default_primary_bits"))]
    pub primary_bits: usize,
    /// The number of secondary codes computed for every descriptor.
    #[cfg_attr(
        feature = "serde-serialize",
        serde(default = "default_secondary_tables")
    )]
    pub secondary_tables: usize,
    /// The number of bits in each secondary code.
    #[cfg_attr(
        feature = "serde-serialize",
        serde(default = "default_secondary_bits")
    )]
    pub secondary_bits: usize,
    /// The number of candidates, ranked by secondary Hamming distance, that get an exact distance.
    #[cfg_attr(feature = "serde-serialize", serde(default = "default_top_k"))]
    pub top_k: usize,
    /// The largest Hamming distance from the primary code of buckets that are probed when
    /// the primary bucket alone is too small.
    #[cfg_attr(feature = "serde-serialize", serde(default = "default_probe_radius"))]
    pub probe_radius: usize,
    /// Neighboring buckets are probed until at least this many candidates are gathered.
    #[cfg_attr(
        feature = "serde-serialize",
        serde(default = "default_min_bucket_candidates")
    )]
    pub min_bucket_candidates: usize,
    /// The number of worker threads. `0` uses one per logical core.
    #[cfg_attr(feature = "serde-serialize", serde(default = "default_threads"))]
    pub threads: usize,
    /// The seed of the projection directions.
    #[cfg_attr(feature = "serde-serialize", serde(default = "default_seed"))]
    pub seed: u64,
}

impl MatcherSettings {
    /// Default settings with a specific distance ratio.
    pub fn with_distance_ratio(distance_ratio: f32) -> Self {
        Self {
            distance_ratio,
            ..Default::default()
        }
    }

    /// Number of bits across all the secondary codes of one descriptor.
    pub fn secondary_code_bits(&self) -> usize {
        self.secondary_tables * self.secondary_bits
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(Error::InvalidSettings(msg));
        if !(self.distance_ratio > 0.0 && self.distance_ratio <= 1.0) {
            return invalid(format!(
                "distance_ratio must be in (0, 1], got {}",
                self.distance_ratio
            ));
        }
        if !(1..=MAX_PRIMARY_BITS).contains(&self.primary_bits) {
            return invalid(format!(
                "primary_bits must be in 1..={}, got {}",
                MAX_PRIMARY_BITS, self.primary_bits
            ));
        }
        if self.secondary_tables == 0 {
            return invalid("secondary_tables must be at least 1".into());
        }
        if !(1..=MAX_SECONDARY_BITS).contains(&self.secondary_bits) {
            return invalid(format!(
                "secondary_bits must be in 1..={}, got {}",
                MAX_SECONDARY_BITS, self.secondary_bits
            ));
        }
        if self.top_k < 2 {
            return invalid(format!(
                "top_k must be at least 2 for the ratio test, got {}",
                self.top_k
            ));
        }
        Ok(())
    }
}

impl Default for MatcherSettings {
    fn default() -> Self {
        Self {
            distance_ratio: default_distance_ratio(),
            primary_bits: default_primary_bits(),
            secondary_tables: default_secondary_tables(),
            secondary_bits: default_secondary_bits(),
            top_k: default_top_k(),
            probe_radius: default_probe_radius(),
            min_bucket_candidates: default_min_bucket_candidates(),
            threads: default_threads(),
            seed: default_seed(),
        }
    }
}

fn default_distance_ratio() -> f32 {
    0.8
}

fn default_primary_bits() -> usize {
    10
}

fn default_secondary_tables() -> usize {
    2
}

fn default_secondary_bits() -> usize {
    64
}

fn default_top_k() -> usize {
    10
}

fn default_probe_radius() -> usize {
    1
}

fn default_min_bucket_candidates() -> usize {
    2
}

fn default_threads() -> usize {
    0
}

fn default_seed() -> u64 {
    0x5eed_ca5c_ade0_0001
}
