//! Reproducible insert/verify workload
//!
//! Keys come from a fixed recurrence instead of an RNG, so the verification
//! pass can regenerate the exact insert sequence without storing it.

use crate::cuckoo::CuckooFilter;
use crate::hash::{fingerprint, FilterKey};
use fnv::FnvHashSet;
use log::{debug, info, warn};
use rand::RngCore;

/// Seed key of the reference workload
pub const INIT_KEY: u16 = 0x1;

/// Next key in the sequence: `(prev + 1) * 17`, wrapping at 16 bits.
///
/// Consecutive integers would map to consecutive DJB hashes; the multiply
/// spreads them out.
pub fn next_key(prev: u16) -> u16 {
    prev.wrapping_add(1).wrapping_mul(17)
}

/// Infinite iterator over the key sequence, excluding the seed itself
#[derive(Debug, Clone)]
pub struct KeyGenerator {
    prev: u16,
}

impl KeyGenerator {
    pub fn new(init_key: u16) -> Self {
        KeyGenerator { prev: init_key }
    }
}

impl Default for KeyGenerator {
    fn default() -> Self {
        KeyGenerator::new(INIT_KEY)
    }
}

impl Iterator for KeyGenerator {
    type Item = u16;

    fn next(&mut self) -> Option<u16> {
        self.prev = next_key(self.prev);
        Some(self.prev)
    }
}

/// Counts from one fill-then-verify run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkloadStats {
    /// Keys offered to `insert`
    pub attempted: usize,
    /// Inserts that returned success
    pub inserted: usize,
    /// Replayed keys the filter reported as present
    pub members: usize,
    /// Keys whose insert dropped a fingerprint
    pub failed_keys: Vec<u16>,
    /// Replayed keys the filter reported as absent
    pub missing_keys: Vec<u16>,
}

impl WorkloadStats {
    pub fn failures(&self) -> usize {
        self.attempted - self.inserted
    }
}

impl std::fmt::Display for WorkloadStats {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "stats: inserts {} members {} total {}",
            self.inserted, self.members, self.attempted
        )
    }
}

/// Outcome of probing keys that were never inserted.
///
/// Probe keys may be any width. Only a `u16` probe can coincide with a
/// generated key, since keys of other widths hash different bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeReport<K = u16> {
    /// Probe keys actually checked
    pub probed: usize,
    /// Probes skipped because the workload generated them
    pub skipped: usize,
    pub false_positives: Vec<K>,
}

impl<K> Default for ProbeReport<K> {
    fn default() -> Self {
        ProbeReport {
            probed: 0,
            skipped: 0,
            false_positives: Vec::new(),
        }
    }
}

impl<K> ProbeReport<K> {
    pub fn false_positive_rate(&self) -> f64 {
        if self.probed == 0 {
            return 0.0;
        }
        self.false_positives.len() as f64 / self.probed as f64
    }
}

/// Insert `num_keys` generated keys, then replay and look each one up
#[derive(Debug, Clone)]
pub struct Workload {
    pub init_key: u16,
    pub num_keys: usize,
}

impl Workload {
    pub fn new(init_key: u16, num_keys: usize) -> Self {
        Workload { init_key, num_keys }
    }

    /// Reference workload for a filter: seed `INIT_KEY`, designed capacity keys
    pub fn for_filter<R>(filter: &CuckooFilter<R>) -> Self {
        Workload::new(INIT_KEY, filter.designed_capacity())
    }

    pub fn keys(&self) -> impl Iterator<Item = u16> {
        KeyGenerator::new(self.init_key).take(self.num_keys)
    }

    /// Clear the filter and run one fill/verify pass over it
    pub fn run<R: RngCore>(&self, filter: &mut CuckooFilter<R>) -> WorkloadStats {
        filter.clear();
        let mut stats = WorkloadStats::default();

        for key in self.keys() {
            let success = filter.insert(key);
            debug!("insert: key {:04x} success {}", key, success);
            stats.attempted += 1;
            if success {
                stats.inserted += 1;
            } else {
                warn!("insert: key {:04x} failed", key);
                stats.failed_keys.push(key);
            }
        }
        info!("inserts/total: {}/{}", stats.inserted, stats.attempted);

        for key in self.keys() {
            let member = filter.lookup(key);
            debug!("lookup: key {:04x} member {}", key, member);
            if member {
                stats.members += 1;
            } else {
                debug!(
                    "lookup: key {:04x} fp {:04x} not member",
                    key,
                    fingerprint(key)
                );
                stats.missing_keys.push(key);
            }
        }
        info!("members/total: {}/{}", stats.members, stats.attempted);

        stats
    }

    /// Look up keys outside the workload and count the hits
    pub fn probe<R, K: FilterKey>(
        &self,
        filter: &CuckooFilter<R>,
        probes: impl IntoIterator<Item = K>,
    ) -> ProbeReport<K> {
        // Compared by encoded bytes, so only same-width keys can match
        let generated: FnvHashSet<Vec<u8>> = self
            .keys()
            .map(|key| key.key_bytes().as_ref().to_vec())
            .collect();
        let mut report = ProbeReport::default();

        for key in probes {
            if generated.contains(key.key_bytes().as_ref()) {
                report.skipped += 1;
                continue;
            }
            report.probed += 1;
            if filter.lookup(key) {
                report.false_positives.push(key);
            }
        }

        report
    }
}
