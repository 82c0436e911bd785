// Key/value sort contract shared by the CPU reference and the GPU bitonic
// sorter. The pipeline only relies on correct grouping by key; ties are
// unordered and sentinel-keyed padding sorts to the end.
use bytemuck::{Pod, Zeroable};

pub const SENTINEL_KEY: u32 = u32::MAX;

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
pub struct SortPair {
    pub key: u32,
    pub index: u32,
}

impl SortPair {
    pub const SENTINEL: Self = Self { key: SENTINEL_KEY, index: 0 };
}

/// Smallest power of two >= n (and >= 1), the sorter's size precondition.
#[inline]
pub fn round_up_pow2(n: usize) -> usize {
    n.max(1).next_power_of_two()
}

/// External sorter contract: `pairs.len()` must be a power of two; afterwards
/// the slice is ascending by `key` with no ordering guarantee among ties.
pub trait KeyValueSorter {
    fn sort_pairs(&self, pairs: &mut [SortPair]);
}

/// Host-side sorter running the same compare-exchange schedule as the GPU
/// bitonic network, so the reference pipeline exercises an identical contract.
#[derive(Default)]
pub struct HostBitonicSorter;

impl KeyValueSorter for HostBitonicSorter {
    fn sort_pairs(&self, pairs: &mut [SortPair]) {
        let n = pairs.len();
        debug_assert!(n.is_power_of_two());
        let mut k = 2;
        while k <= n {
            let mut j = k / 2;
            while j > 0 {
                for i in 0..n {
                    let ixj = i ^ j;
                    if ixj > i {
                        let ascending = i & k == 0;
                        if (pairs[i].key > pairs[ixj].key) == ascending {
                            pairs.swap(i, ixj);
                        }
                    }
                }
                j /= 2;
            }
            k *= 2;
        }
    }
}
