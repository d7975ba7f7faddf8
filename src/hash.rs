//! Hash functions for the cuckoo filter
//!
//! Everything is derived from one DJB string hash over the little-endian
//! bytes of its input. The fingerprint and the primary index come from the
//! same hash of the same bytes, so they are correlated: the low bits of a
//! fingerprint are exactly its key's primary index.

/// Fingerprint stored in a bucket. `EMPTY` doubles as "no fingerprint".
pub type Fingerprint = u16;

/// Sentinel for an unoccupied bucket
pub const EMPTY: Fingerprint = 0;

const DJB_SEED: u32 = 5381;

/// Keys the filter can hash. Implemented for the fixed-width unsigned integers.
///
/// The byte encoding is little-endian and width-dependent, so `34u16` and
/// `34u32` are different keys.
pub trait FilterKey: Copy {
    type Bytes: AsRef<[u8]>;

    /// Stable byte encoding fed to the hash
    fn key_bytes(self) -> Self::Bytes;
}

macro_rules! impl_filter_key {
    ($($t:ty),*) => {
        $(
            impl FilterKey for $t {
                type Bytes = [u8; std::mem::size_of::<$t>()];

                fn key_bytes(self) -> Self::Bytes {
                    self.to_le_bytes()
                }
            }
        )*
    };
}

impl_filter_key!(u8, u16, u32, u64);

/// DJB hash (`hash * 33 + byte`, seed 5381), truncated to 16 bits
pub fn djb_hash(data: &[u8]) -> u16 {
    let hash = data.iter().fold(DJB_SEED, |hash, &byte| {
        (hash << 5).wrapping_add(hash).wrapping_add(byte as u32)
    });
    (hash & 0xFFFF) as u16
}

#[inline]
fn mask(num_buckets: usize) -> usize {
    debug_assert!(num_buckets.is_power_of_two());
    num_buckets - 1
}

/// Fingerprint of a key
pub fn fingerprint<K: FilterKey>(key: K) -> Fingerprint {
    djb_hash(key.key_bytes().as_ref())
}

/// Primary bucket index of a key
pub fn key_to_index<K: FilterKey>(key: K, num_buckets: usize) -> usize {
    djb_hash(key.key_bytes().as_ref()) as usize & mask(num_buckets)
}

/// Index offset derived from a fingerprint alone
pub fn fingerprint_to_index(fp: Fingerprint, num_buckets: usize) -> usize {
    djb_hash(&fp.to_le_bytes()) as usize & mask(num_buckets)
}

/// The other candidate bucket of `fp` given the one it currently occupies.
///
/// Applying this twice returns the original index.
pub fn alternate_index(index: usize, fp: Fingerprint, num_buckets: usize) -> usize {
    index ^ fingerprint_to_index(fp, num_buckets)
}

/// Fingerprint and both candidate buckets of a key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidates {
    pub fingerprint: Fingerprint,
    pub index1: usize,
    pub index2: usize,
}

impl Candidates {
    pub fn for_key<K: FilterKey>(key: K, num_buckets: usize) -> Self {
        let fingerprint = fingerprint(key);
        let index1 = key_to_index(key, num_buckets);
        let index2 = alternate_index(index1, fingerprint, num_buckets);
        Candidates {
            fingerprint,
            index1,
            index2,
        }
    }

    /// Whether `bucket` is one of the two candidates
    pub fn contains_index(&self, bucket: usize) -> bool {
        bucket == self.index1 || bucket == self.index2
    }
}
