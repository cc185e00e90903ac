//! Allocation of three-character controller-issued identifiers (CIDs).
//!
//! The code space is split into seven partitions in priority order. Codes
//! are handed out at random from the earliest partition that still has
//! any, so all-digit codes are used first and codes mixing digits with
//! easily-confused letters are used last.
//!
//! | # | Shape |
//! |---|-------|
//! | 0 | `ddd` |
//! | 1 | `dd` + preferred |
//! | 2 | `d` + preferred + preferred |
//! | 3 | `d` + preferred + `d` |
//! | 4 | `dd` + non-preferred |
//! | 5 | `d` + non-preferred + any letter, `d` + preferred + non-preferred |
//! | 6 | `d` + non-preferred + `d` |

use std::collections::{BTreeMap, BTreeSet};

use rand::Rng;

use crate::error::SimError;

/// Letters that read unambiguously on a scope.
const PREFERRED: &[char] = &[
    'P', 'K', 'N', 'Y', 'T', 'V', 'F', 'R', 'C', 'D', 'E', 'W', 'A',
];

/// Letters that are easily confused with digits or each other.
const NON_PREFERRED: &[char] = &['M', 'X', 'L', 'J', 'U', 'B', 'G', 'Q', 'S', 'H', 'Z'];

const DIGITS: &[char] = &['0', '1', '2', '3', '4', '5', '6', '7', '8', '9'];

/// Number of priority partitions.
pub const CID_PARTITIONS: usize = 7;

/// Hands out unique CIDs and takes them back.
#[derive(Debug, Clone)]
pub struct CidAllocator {
    /// Free codes per partition.
    groups: Vec<BTreeSet<String>>,
    /// Partition each code belongs to.
    partition_of: BTreeMap<String, usize>,
    /// Earliest partition that may still have free codes.
    group_index: usize,
    /// Codes currently handed out.
    allocated: BTreeSet<String>,
}

impl Default for CidAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl CidAllocator {
    /// An allocator with every code free.
    pub fn new() -> Self {
        let (groups, partition_of) = generate_partitions();
        Self {
            groups,
            partition_of,
            group_index: 0,
            allocated: BTreeSet::new(),
        }
    }

    /// Draw a free code at random from the earliest non-empty partition.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::NoMoreCids`] once every partition is exhausted.
    pub fn allocate<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<String, SimError> {
        while let Some(group) = self.groups.get_mut(self.group_index) {
            if group.is_empty() {
                self.group_index = self.group_index.saturating_add(1);
                continue;
            }
            let n = rng.random_range(0..group.len());
            let Some(cid) = group.iter().nth(n).cloned() else {
                continue;
            };
            group.remove(&cid);
            self.allocated.insert(cid.clone());
            return Ok(cid);
        }
        Err(SimError::NoMoreCids)
    }

    /// Take a specific code out of the free pool, e.g. when restoring a
    /// saved sim. Returns `false` if the code is unknown or already taken.
    pub fn reserve(&mut self, cid: &str) -> bool {
        let Some(&idx) = self.partition_of.get(cid) else {
            return false;
        };
        let removed = self
            .groups
            .get_mut(idx)
            .is_some_and(|group| group.remove(cid));
        if removed {
            self.allocated.insert(cid.to_owned());
        }
        removed
    }

    /// Return a code to its partition. Codes that are not currently
    /// allocated are ignored.
    pub fn release(&mut self, cid: &str) {
        if !self.allocated.remove(cid) {
            return;
        }
        let Some(&idx) = self.partition_of.get(cid) else {
            return;
        };
        if let Some(group) = self.groups.get_mut(idx) {
            group.insert(cid.to_owned());
        }
        if idx < self.group_index {
            self.group_index = idx;
        }
    }

    /// Whether `cid` is currently handed out.
    pub fn is_allocated(&self, cid: &str) -> bool {
        self.allocated.contains(cid)
    }

    /// Number of codes currently handed out.
    pub fn allocated_count(&self) -> usize {
        self.allocated.len()
    }

    /// Partition a code belongs to.
    pub fn partition(&self, cid: &str) -> Option<usize> {
        self.partition_of.get(cid).copied()
    }
}

fn generate_partitions() -> (Vec<BTreeSet<String>>, BTreeMap<String, usize>) {
    let mut groups = vec![BTreeSet::new(); CID_PARTITIONS];
    let mut partition_of = BTreeMap::new();
    let mut add = |idx: usize, a: char, b: char, c: char| {
        let code: String = [a, b, c].iter().collect();
        if let Some(group) = groups.get_mut(idx) {
            group.insert(code.clone());
        }
        partition_of.insert(code, idx);
    };

    for &a in DIGITS {
        for &b in DIGITS {
            for &c in DIGITS {
                add(0, a, b, c);
            }
        }
    }
    for &a in DIGITS {
        for &b in DIGITS {
            for &l in PREFERRED {
                add(1, a, b, l);
            }
        }
    }
    for &a in DIGITS {
        for &l1 in PREFERRED {
            for &l2 in PREFERRED {
                add(2, a, l1, l2);
            }
        }
    }
    for &a in DIGITS {
        for &l in PREFERRED {
            for &b in DIGITS {
                add(3, a, l, b);
            }
        }
    }
    for &a in DIGITS {
        for &b in DIGITS {
            for &l in NON_PREFERRED {
                add(4, a, b, l);
            }
        }
    }
    for &d in DIGITS {
        for &a1 in NON_PREFERRED {
            for &a2 in NON_PREFERRED.iter().chain(PREFERRED) {
                add(5, d, a1, a2);
            }
        }
        for &a1 in PREFERRED {
            for &a2 in NON_PREFERRED {
                add(5, d, a1, a2);
            }
        }
    }
    for &a in DIGITS {
        for &l in NON_PREFERRED {
            for &b in DIGITS {
                add(6, a, l, b);
            }
        }
    }

    (groups, partition_of)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    /// 10^3 + 10^2*13 + 10*13^2 + 10*13*10 + 10^2*11 + 10*(11*24 + 13*11) + 10*11*10
    const TOTAL: usize = 1000 + 1300 + 1690 + 1300 + 1100 + 4070 + 1100;

    #[test]
    fn partition_sizes_cover_the_code_space() {
        let alloc = CidAllocator::new();
        let total: usize = alloc.groups.iter().map(BTreeSet::len).sum();
        assert_eq!(total, TOTAL);
        assert_eq!(alloc.partition("123"), Some(0));
        assert_eq!(alloc.partition("12P"), Some(1));
        assert_eq!(alloc.partition("1PK"), Some(2));
        assert_eq!(alloc.partition("1P2"), Some(3));
        assert_eq!(alloc.partition("12M"), Some(4));
        assert_eq!(alloc.partition("1MP"), Some(5));
        assert_eq!(alloc.partition("1PM"), Some(5));
        assert_eq!(alloc.partition("1M2"), Some(6));
    }

    #[test]
    fn first_thousand_are_all_digits() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut alloc = CidAllocator::new();
        let mut seen = BTreeSet::new();
        for _ in 0..1000 {
            let cid = alloc.allocate(&mut rng).unwrap();
            assert!(cid.chars().all(|c| c.is_ascii_digit()), "{cid}");
            assert!(seen.insert(cid));
        }
        let next = alloc.allocate(&mut rng).unwrap();
        assert_eq!(alloc.partition(&next), Some(1));
    }

    #[test]
    fn release_rewinds_to_earlier_partition() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut alloc = CidAllocator::new();
        let mut first = Vec::new();
        for _ in 0..1001 {
            first.push(alloc.allocate(&mut rng).unwrap());
        }
        let digits = first
            .iter()
            .find(|c| alloc.partition(c) == Some(0))
            .cloned()
            .unwrap();
        alloc.release(&digits);
        assert!(!alloc.is_allocated(&digits));
        assert_eq!(alloc.allocate(&mut rng).unwrap(), digits);
    }

    #[test]
    fn release_of_unallocated_is_ignored() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut alloc = CidAllocator::new();
        alloc.release("999");
        assert_eq!(alloc.allocated_count(), 0);
        let cid = alloc.allocate(&mut rng).unwrap();
        alloc.release(&cid);
        alloc.release(&cid);
        assert_eq!(alloc.allocated_count(), 0);
    }

    #[test]
    fn exhaustion_after_every_partition() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut alloc = CidAllocator::new();
        for _ in 0..TOTAL {
            alloc.allocate(&mut rng).unwrap();
        }
        assert_eq!(alloc.allocate(&mut rng), Err(SimError::NoMoreCids));
    }

    #[test]
    fn reserve_takes_a_code_out_of_the_pool() {
        let mut alloc = CidAllocator::new();
        assert!(alloc.reserve("042"));
        assert!(!alloc.reserve("042"));
        assert!(alloc.is_allocated("042"));
        assert!(!alloc.reserve("ABC"));
    }
}
