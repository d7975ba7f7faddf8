//! # Ferric Cuckoo
//!
//! A small fixed-capacity cuckoo filter for integer keys. Each bucket holds a
//! single 16-bit fingerprint, conflicts are resolved with a bounded eviction
//! chain, and victim selection draws from an injectable RNG so runs can be
//! replayed exactly.

pub mod config;
pub mod cuckoo;
pub mod hash;
pub mod workload;

pub use config::FilterConfig;
pub use cuckoo::{CapacityAdvisory, CuckooFilter, FilterSnapshot, FilterStats, Placement};
pub use hash::{FilterKey, Fingerprint};
pub use workload::{KeyGenerator, Workload, WorkloadStats};

// Python bindings
#[cfg(feature = "python")]
pub mod python_module;

/// Common error types for the library
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CuckooError {
    InvalidParameter(String),
    /// The eviction chain hit its bound and `lost_fingerprint` was dropped
    InsertionFailed {
        lost_fingerprint: Fingerprint,
        relocations: usize,
    },
    SnapshotMismatch {
        expected: usize,
        found: usize,
    },
}

impl std::fmt::Display for CuckooError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            CuckooError::InvalidParameter(msg) => write!(f, "Invalid parameter: {}", msg),
            CuckooError::InsertionFailed {
                lost_fingerprint,
                relocations,
            } => write!(
                f,
                "Insertion failed: fingerprint {:04x} lost after {} relocations",
                lost_fingerprint, relocations
            ),
            CuckooError::SnapshotMismatch { expected, found } => write!(
                f,
                "Snapshot mismatch: expected {} buckets, found {}",
                expected, found
            ),
        }
    }
}

impl std::error::Error for CuckooError {}

pub type Result<T> = std::result::Result<T, CuckooError>;
