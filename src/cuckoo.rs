//! Single-slot cuckoo filter
//!
//! Every bucket holds at most one 16-bit fingerprint. A key may live in one
//! of two buckets; when both are taken an occupant is evicted and pushed to
//! its own alternate bucket, repeating for a bounded number of steps.

use crate::config::{self, FilterConfig};
use crate::hash::{alternate_index, Candidates, FilterKey, Fingerprint, EMPTY};
use crate::{CuckooError, Result};
use bit_vec::BitVec;
use log::{debug, trace, warn};
use rand::{rngs::StdRng, RngCore, SeedableRng};

/// Bit of the random draw that picks the victim. The lowest bit of some
/// generators is systematic, so a higher one is used.
const VICTIM_BIT: u32 = 0x80;

/// Where a successful insert put the new fingerprint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    /// Bucket now holding the inserted fingerprint
    pub bucket: usize,
    /// Eviction steps taken, `0` when a candidate bucket was free
    pub relocations: usize,
}

/// Raised when occupancy reaches the designed load. Never blocks inserts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapacityAdvisory {
    pub occupied: usize,
    pub designed_capacity: usize,
    pub num_buckets: usize,
}

impl std::fmt::Display for CapacityAdvisory {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "{} of {} buckets occupied, designed for {}",
            self.occupied, self.num_buckets, self.designed_capacity
        )
    }
}

/// A fixed-size cuckoo filter over integer keys
pub struct CuckooFilter<R = StdRng> {
    /// One fingerprint per bucket, `EMPTY` when free
    buckets: Vec<Fingerprint>,
    /// Bound on eviction steps per insert
    max_relocations: usize,
    /// Occupancy the table is sized for
    designed_capacity: usize,
    /// Number of non-empty buckets
    occupied: usize,
    /// Source for victim selection
    rng: R,
}

impl CuckooFilter<StdRng> {
    /// Create a filter seeded from OS entropy
    ///
    /// # Arguments
    /// * `num_buckets` - Table size, a power of two in `1..=65536`
    /// * `max_relocations` - Eviction steps allowed before an insert gives up
    pub fn new(num_buckets: usize, max_relocations: usize) -> Result<Self> {
        Self::with_rng(num_buckets, max_relocations, StdRng::from_entropy())
    }

    /// Create a filter whose eviction choices are reproducible
    pub fn with_seed(num_buckets: usize, max_relocations: usize, seed: u64) -> Result<Self> {
        Self::with_rng(num_buckets, max_relocations, StdRng::seed_from_u64(seed))
    }

    pub fn from_config(config: &FilterConfig) -> Result<Self> {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self::from_config_with_rng(config, rng)
    }
}

impl<R: RngCore> CuckooFilter<R> {
    /// Create a filter with the reference designed load and a caller-supplied RNG
    pub fn with_rng(num_buckets: usize, max_relocations: usize, rng: R) -> Result<Self> {
        let config = FilterConfig::default()
            .with_num_buckets(num_buckets)
            .with_max_relocations(max_relocations);
        Self::from_config_with_rng(&config, rng)
    }

    pub fn from_config_with_rng(config: &FilterConfig, rng: R) -> Result<Self> {
        config.validate()?;

        Ok(CuckooFilter {
            buckets: vec![EMPTY; config.num_buckets],
            max_relocations: config.max_relocations,
            designed_capacity: config.designed_capacity(),
            occupied: 0,
            rng,
        })
    }

    /// Insert a key, returning whether it was stored without losing anything
    pub fn insert<K: FilterKey>(&mut self, key: K) -> bool {
        self.try_insert(key).is_ok()
    }

    /// Insert a key.
    ///
    /// On `InsertionFailed` the new fingerprint is stored but some earlier
    /// fingerprint (or the new one, after a full cycle) was dropped. The
    /// relocations already applied are not undone.
    pub fn try_insert<K: FilterKey>(&mut self, key: K) -> Result<Placement> {
        let n = self.buckets.len();
        let Candidates {
            fingerprint: fp,
            index1,
            index2,
        } = Candidates::for_key(key, n);

        let fp1 = self.buckets[index1];
        if fp1 == EMPTY {
            self.fill(index1, fp);
            return Ok(Placement {
                bucket: index1,
                relocations: 0,
            });
        }

        let fp2 = self.buckets[index2];
        if fp2 == EMPTY {
            self.fill(index2, fp);
            return Ok(Placement {
                bucket: index2,
                relocations: 0,
            });
        }

        let (mut index, mut victim) = if self.rng.next_u32() & VICTIM_BIT != 0 {
            (index1, fp1)
        } else {
            (index2, fp2)
        };
        let bucket = index;

        debug!("insert: evict [{}] = {:04x}", index, victim);
        self.buckets[index] = fp;
        if fp == EMPTY {
            self.occupied -= 1;
        }

        let mut relocations = 0;
        loop {
            index = alternate_index(index, victim, n);
            let next = std::mem::replace(&mut self.buckets[index], victim);
            relocations += 1;

            if next == EMPTY {
                self.occupied += 1;
                self.check_capacity();
                debug!(
                    "insert: placed {:04x} after {} relocations",
                    fp, relocations
                );
                return Ok(Placement {
                    bucket,
                    relocations,
                });
            }

            victim = next;
            if relocations >= self.max_relocations {
                warn!("insert: lost fp {:04x}", victim);
                return Err(CuckooError::InsertionFailed {
                    lost_fingerprint: victim,
                    relocations,
                });
            }
        }
    }

    fn fill(&mut self, index: usize, fp: Fingerprint) {
        self.buckets[index] = fp;
        // A zero fingerprint leaves the bucket looking empty
        if fp != EMPTY {
            self.occupied += 1;
            self.check_capacity();
        }
    }

    fn check_capacity(&self) {
        if self.occupied == self.advisory_threshold() {
            warn!(
                "cuckoo filter reached its designed load: {}",
                self.advisory()
            );
        }
    }
}

impl<R> CuckooFilter<R> {
    /// Check whether a key might be in the filter
    pub fn lookup<K: FilterKey>(&self, key: K) -> bool {
        let c = Candidates::for_key(key, self.buckets.len());
        let (fp1, fp2) = (self.buckets[c.index1], self.buckets[c.index2]);

        trace!(
            "lookup: fp {:04x} f[{}] {:04x} f[{}] {:04x}",
            c.fingerprint,
            c.index1,
            fp1,
            c.index2,
            fp2
        );

        fp1 == c.fingerprint || fp2 == c.fingerprint
    }

    /// Same as [`lookup`](Self::lookup)
    pub fn contains<K: FilterKey>(&self, key: K) -> bool {
        self.lookup(key)
    }

    /// Empty every bucket
    pub fn clear(&mut self) {
        self.buckets.fill(EMPTY);
        self.occupied = 0;
    }

    /// Raw bucket contents
    pub fn buckets(&self) -> &[Fingerprint] {
        &self.buckets
    }

    /// Copy the table out for diagnostics or an external checkpoint
    pub fn snapshot(&self) -> FilterSnapshot {
        FilterSnapshot {
            buckets: self.buckets.clone(),
        }
    }

    /// Load bucket contents captured by [`snapshot`](Self::snapshot)
    pub fn restore(&mut self, snapshot: &FilterSnapshot) -> Result<()> {
        if snapshot.buckets.len() != self.buckets.len() {
            return Err(CuckooError::SnapshotMismatch {
                expected: self.buckets.len(),
                found: snapshot.buckets.len(),
            });
        }

        self.buckets.copy_from_slice(&snapshot.buckets);
        self.occupied = snapshot.occupied();
        Ok(())
    }

    /// `Some` once occupancy is at or past the designed load
    pub fn capacity_advisory(&self) -> Option<CapacityAdvisory> {
        if self.occupied >= self.advisory_threshold() {
            Some(self.advisory())
        } else {
            None
        }
    }

    /// Occupancy that triggers the advisory. A table designed for zero keys
    /// warns on its first fingerprint.
    fn advisory_threshold(&self) -> usize {
        self.designed_capacity.max(1)
    }

    fn advisory(&self) -> CapacityAdvisory {
        CapacityAdvisory {
            occupied: self.occupied,
            designed_capacity: self.designed_capacity,
            num_buckets: self.buckets.len(),
        }
    }

    pub fn num_buckets(&self) -> usize {
        self.buckets.len()
    }

    pub fn max_relocations(&self) -> usize {
        self.max_relocations
    }

    pub fn designed_capacity(&self) -> usize {
        self.designed_capacity
    }

    /// Number of non-empty buckets
    pub fn occupied(&self) -> usize {
        self.occupied
    }

    pub fn is_empty(&self) -> bool {
        self.occupied == 0
    }

    /// Fraction of buckets occupied
    pub fn load_factor(&self) -> f64 {
        self.occupied as f64 / self.buckets.len() as f64
    }

    pub fn stats(&self) -> FilterStats {
        FilterStats {
            num_buckets: self.buckets.len(),
            occupied: self.occupied,
            designed_capacity: self.designed_capacity,
            max_relocations: self.max_relocations,
            load_factor: self.load_factor(),
            estimated_fpr: config::expected_fpr(self.occupied, config::DEFAULT_KEY_BYTES),
        }
    }
}

/// Statistics about a cuckoo filter
#[derive(Debug, Clone)]
pub struct FilterStats {
    pub num_buckets: usize,
    pub occupied: usize,
    pub designed_capacity: usize,
    pub max_relocations: usize,
    pub load_factor: f64,
    /// False positive estimate for `u16` lookups
    pub estimated_fpr: f64,
}

impl std::fmt::Display for FilterStats {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "CuckooFilter Stats:\n\
             - Buckets: {}\n\
             - Occupied: {} (designed for {})\n\
             - Max relocations: {}\n\
             - Load factor: {:.3}\n\
             - Estimated FPR: {:.6}",
            self.num_buckets,
            self.occupied,
            self.designed_capacity,
            self.max_relocations,
            self.load_factor,
            self.estimated_fpr
        )
    }
}

/// Copy of a filter's buckets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterSnapshot {
    buckets: Vec<Fingerprint>,
}

impl FilterSnapshot {
    /// Wrap raw bucket contents, e.g. read back from a checkpoint
    pub fn from_buckets(buckets: Vec<Fingerprint>) -> Self {
        FilterSnapshot { buckets }
    }

    pub fn buckets(&self) -> &[Fingerprint] {
        &self.buckets
    }

    pub fn into_buckets(self) -> Vec<Fingerprint> {
        self.buckets
    }

    /// One bit per bucket, set when occupied
    pub fn occupancy(&self) -> BitVec {
        let mut bits = BitVec::from_elem(self.buckets.len(), false);
        for (i, &fp) in self.buckets.iter().enumerate() {
            if fp != EMPTY {
                bits.set(i, true);
            }
        }
        bits
    }

    pub fn occupied(&self) -> usize {
        self.buckets.iter().filter(|&&fp| fp != EMPTY).count()
    }
}

/// Hex dump, eight buckets per row
impl std::fmt::Display for FilterSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        for row in self.buckets.chunks(8) {
            for fp in row {
                write!(f, "{:04x} ", fp)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::fingerprint;
    use proptest::prelude::*;
    use rand::rngs::mock::StepRng;

    /// Always evicts from the key's primary bucket
    fn evict_primary() -> StepRng {
        StepRng::new(VICTIM_BIT as u64, 0)
    }

    /// Always evicts from the key's alternate bucket
    fn evict_alternate() -> StepRng {
        StepRng::new(0, 0)
    }

    #[test]
    fn test_cuckoo_filter_basic() {
        let mut filter = CuckooFilter::with_seed(128, 8, 1).unwrap();

        assert!(filter.insert(34u16));
        assert!(filter.insert(595u16));
        assert!(filter.insert(10132u16));

        assert!(filter.lookup(34u16));
        assert!(filter.lookup(595u16));
        assert!(filter.lookup(10132u16));
        assert_eq!(filter.occupied(), 3);

        assert_eq!(filter.buckets()[39], 0x6ea7);
        assert_eq!(filter.buckets()[122], 0x74fa);
        assert_eq!(filter.buckets()[0], 0x7d80);
    }

    #[test]
    fn test_out_of_band_probes() {
        let mut filter = CuckooFilter::with_seed(128, 8, 1).unwrap();
        for key in [34u16, 595, 10132] {
            filter.insert(key);
        }

        assert!(!filter.lookup(999_999u32));
        for probe in [1u16, 2, 17, 33, 1000, 4242, 65535] {
            assert!(!filter.lookup(probe), "false positive for {}", probe);
        }
    }

    #[test]
    fn test_invalid_construction() {
        assert!(CuckooFilter::new(0, 8).is_err());
        assert!(CuckooFilter::new(100, 8).is_err());
        assert!(CuckooFilter::new(1 << 17, 8).is_err());
        assert!(CuckooFilter::new(128, 0).is_err());
    }

    #[test]
    fn test_eviction_from_primary_bucket() {
        // Keys 1 and 2 fill buckets 2 and 3; key 5 wants exactly those two
        let mut filter = CuckooFilter::with_rng(4, 8, evict_primary()).unwrap();
        assert!(filter.insert(1u16));
        assert!(filter.insert(2u16));

        let placement = filter.try_insert(5u16).unwrap();
        assert_eq!(placement.bucket, 2);
        assert_eq!(placement.relocations, 2);
        assert_eq!(filter.buckets(), &[0, 0x6a87, 0x6aea, 0x6a66]);

        for key in [1u16, 2, 5] {
            assert!(filter.lookup(key));
        }
    }

    #[test]
    fn test_eviction_from_alternate_bucket() {
        let mut filter = CuckooFilter::with_rng(4, 8, evict_alternate()).unwrap();
        assert!(filter.insert(1u16));
        assert!(filter.insert(2u16));

        let placement = filter.try_insert(5u16).unwrap();
        assert_eq!(placement.bucket, 3);
        assert_eq!(placement.relocations, 1);
        assert_eq!(filter.buckets(), &[0, 0x6a87, 0x6a66, 0x6aea]);
        assert_eq!(filter.occupied(), 3);
    }

    #[test]
    fn test_full_table_drops_fingerprint() {
        let mut filter = CuckooFilter::with_rng(2, 8, evict_primary()).unwrap();
        assert!(filter.insert(1u16));
        assert!(filter.insert(2u16));

        match filter.try_insert(3u16) {
            Err(CuckooError::InsertionFailed {
                lost_fingerprint,
                relocations,
            }) => {
                assert_eq!(lost_fingerprint, fingerprint(1u16));
                assert_eq!(relocations, 8);
            }
            other => panic!("expected InsertionFailed, got {:?}", other),
        }

        // Table stays full and consistent; key 1 is now a false negative
        assert_eq!(filter.buckets(), &[0x6aa8, 0x6a87]);
        assert_eq!(filter.occupied(), 2);
        assert!(!filter.lookup(1u16));
        assert!(filter.lookup(2u16));
        assert!(filter.lookup(3u16));
    }

    #[test]
    fn test_short_chain_can_drop_new_key() {
        let mut filter = CuckooFilter::with_rng(2, 3, evict_primary()).unwrap();
        filter.insert(1u16);
        filter.insert(2u16);

        let err = filter.try_insert(3u16).unwrap_err();
        assert!(matches!(
            err,
            CuckooError::InsertionFailed {
                lost_fingerprint: 0x6aa8,
                relocations: 3
            }
        ));
        assert!(!filter.lookup(3u16));
        assert!(filter.lookup(1u16) && filter.lookup(2u16));
    }

    #[test]
    fn test_fingerprint_collision_false_positive() {
        // 1u16 and 8448u16 hash to the same 16 bits
        assert_eq!(fingerprint(1u16), fingerprint(8448u16));

        let mut filter = CuckooFilter::with_seed(128, 8, 3).unwrap();
        filter.insert(1u16);
        assert!(filter.lookup(8448u16));
    }

    #[test]
    fn test_zero_fingerprint_is_ambiguous() {
        let key = 69_770u32;
        assert_eq!(fingerprint(key), EMPTY);

        let mut filter = CuckooFilter::with_seed(128, 8, 5).unwrap();
        // Reads as present in an empty table
        assert!(filter.lookup(key));
        assert!(filter.insert(key));
        assert!(filter.is_empty());
    }

    #[test]
    fn test_capacity_advisory() {
        let mut filter = CuckooFilter::with_seed(16, 8, 9).unwrap();
        assert_eq!(filter.designed_capacity(), 4);
        assert!(filter.capacity_advisory().is_none());

        let mut key = 1u16;
        while filter.occupied() < 4 {
            key = key.wrapping_add(1).wrapping_mul(17);
            filter.insert(key);
        }

        let advisory = filter.capacity_advisory().unwrap();
        assert_eq!(advisory.occupied, 4);
        assert_eq!(advisory.num_buckets, 16);

        // Advisory only: inserts keep being attempted
        key = key.wrapping_add(1).wrapping_mul(17);
        filter.insert(key);
        assert!(filter.occupied() >= 4);
    }

    #[test]
    fn test_capacity_advisory_with_zero_designed_capacity() {
        let mut filter = CuckooFilter::with_seed(2, 8, 9).unwrap();
        assert_eq!(filter.designed_capacity(), 0);
        assert_eq!(filter.advisory_threshold(), 1);
        assert!(filter.capacity_advisory().is_none());

        assert!(filter.insert(1u16));
        assert_eq!(filter.occupied(), filter.advisory_threshold());
        let advisory = filter.capacity_advisory().unwrap();
        assert_eq!(advisory.occupied, 1);
        assert_eq!(advisory.designed_capacity, 0);
    }

    #[test]
    fn test_clear() {
        let mut filter = CuckooFilter::with_seed(128, 8, 1).unwrap();
        filter.insert(34u16);
        assert!(filter.lookup(34u16));

        filter.clear();
        assert!(filter.is_empty());
        assert!(!filter.lookup(34u16));
        assert!(filter.buckets().iter().all(|&fp| fp == EMPTY));
    }

    #[test]
    fn test_snapshot_and_restore() {
        let mut filter = CuckooFilter::with_seed(128, 8, 1).unwrap();
        for key in [34u16, 595, 10132] {
            filter.insert(key);
        }

        let snapshot = filter.snapshot();
        assert_eq!(snapshot.occupied(), 3);
        let occupancy = snapshot.occupancy();
        assert!(occupancy[0] && occupancy[39] && occupancy[122]);
        assert!(!occupancy[1]);

        let mut other = CuckooFilter::with_seed(128, 8, 2).unwrap();
        other.restore(&snapshot).unwrap();
        assert_eq!(other.occupied(), 3);
        assert!(other.lookup(595u16));

        let mut small = CuckooFilter::with_seed(64, 8, 2).unwrap();
        assert!(matches!(
            small.restore(&snapshot),
            Err(CuckooError::SnapshotMismatch {
                expected: 64,
                found: 128
            })
        ));
    }

    #[test]
    fn test_snapshot_hex_dump() {
        let snapshot = FilterSnapshot::from_buckets(vec![0x7d80, 0, 0, 0, 0, 0, 0, 0x000f, 0x1]);
        assert_eq!(
            snapshot.to_string(),
            "7d80 0000 0000 0000 0000 0000 0000 000f \n0001 \n"
        );
    }

    #[test]
    fn test_stats() {
        let mut filter = CuckooFilter::with_seed(128, 8, 1).unwrap();
        for key in [34u16, 595, 10132] {
            filter.insert(key);
        }

        let stats = filter.stats();
        assert_eq!(stats.num_buckets, 128);
        assert_eq!(stats.occupied, 3);
        assert_eq!(stats.designed_capacity, 32);
        assert!(stats.load_factor > 0.0);
        assert!(stats.to_string().contains("Occupied: 3"));
    }

    fn candidate_hits(filter: &CuckooFilter<StepRng>, key: u16) -> usize {
        let c = Candidates::for_key(key, filter.num_buckets());
        let mut hits = (filter.buckets()[c.index1] == c.fingerprint) as usize;
        if c.index2 != c.index1 {
            hits += (filter.buckets()[c.index2] == c.fingerprint) as usize;
        }
        hits
    }

    proptest! {
        #[test]
        fn prop_each_key_stored_once(
            keys in proptest::collection::vec(any::<u16>(), 1..32),
            step in any::<u64>(),
        ) {
            // Keys sharing a fingerprint would legitimately occupy two buckets
            let mut seen = std::collections::HashSet::new();
            let keys: Vec<u16> = keys
                .into_iter()
                .filter(|&k| seen.insert(fingerprint(k)))
                .collect();

            let mut filter = CuckooFilter::with_rng(128, 8, StepRng::new(0, step)).unwrap();
            let mut failed = false;
            for &key in &keys {
                match filter.try_insert(key) {
                    Ok(placement) => {
                        prop_assert!(placement.relocations <= 8);
                    }
                    Err(CuckooError::InsertionFailed { relocations, .. }) => {
                        prop_assert_eq!(relocations, 8);
                        failed = true;
                    }
                    Err(e) => return Err(TestCaseError::fail(e.to_string())),
                }
            }
            prop_assume!(!failed);

            for &key in &keys {
                prop_assert_eq!(candidate_hits(&filter, key), 1);
                prop_assert!(filter.lookup(key));
            }
            prop_assert_eq!(filter.occupied(), keys.len());
        }

        #[test]
        fn prop_relocations_bounded(
            keys in proptest::collection::vec(any::<u16>(), 1..64),
            max_relocations in 1usize..12,
        ) {
            let mut filter = CuckooFilter::with_rng(16, max_relocations, StepRng::new(7, 0x81)).unwrap();
            for key in keys {
                let relocations = match filter.try_insert(key) {
                    Ok(placement) => placement.relocations,
                    Err(CuckooError::InsertionFailed { relocations, .. }) => relocations,
                    Err(e) => return Err(TestCaseError::fail(e.to_string())),
                };
                prop_assert!(relocations <= max_relocations);
                prop_assert!(filter.occupied() <= 16);
                prop_assert_eq!(filter.occupied(), filter.snapshot().occupied());
            }
        }
    }
}
