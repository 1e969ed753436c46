//! Monomial bookkeeping: the counting box and the parity partition.
//!
//! The counting box maps each monomial (a trail's round-0 projection) to its
//! exact trail count. It only ever grows during a run. Parity decides
//! superpoly membership: an odd count means the monomial appears, an even
//! count means it cancels.

use crate::bits::StateBits;
use std::collections::BTreeMap;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CountingBox {
    counts: BTreeMap<StateBits, u64>,
}

impl CountingBox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit `count` trails to a monomial.
    pub fn record(&mut self, key: StateBits, count: u64) {
        *self.counts.entry(key).or_insert(0) += count;
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Total trails across all monomials.
    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    pub fn count(&self, key: &StateBits) -> u64 {
        self.counts.get(key).copied().unwrap_or(0)
    }

    /// Monomials in key order (bit 0 most significant).
    pub fn iter(&self) -> impl Iterator<Item = (&StateBits, u64)> {
        self.counts.iter().map(|(k, &v)| (k, v))
    }

    /// Zero the given positions out of every key and merge the counts of
    /// keys that collide. Used to strip the cube/public positions before the
    /// final aggregation; key positions are never passed here.
    pub fn project(&self, clear: &[usize]) -> CountingBox {
        let mut projected = CountingBox::new();
        for (key, count) in self.iter() {
            let mut stripped = *key;
            for &pos in clear {
                stripped.clear(pos);
            }
            projected.record(stripped, count);
        }
        projected
    }

    /// Split into odd-count (superpoly-present) and even-count (cancelled)
    /// monomial lists, each in key order.
    pub fn partition(&self) -> SuperpolyPartition {
        let mut odd = Vec::new();
        let mut even = Vec::new();
        for (key, count) in self.iter() {
            if count % 2 == 1 {
                odd.push((*key, count));
            } else {
                even.push((*key, count));
            }
        }
        SuperpolyPartition { odd, even }
    }
}

/// The superpoly's term list: odd-count monomials are present, even-count
/// monomials cancelled.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SuperpolyPartition {
    pub odd: Vec<(StateBits, u64)>,
    pub even: Vec<(StateBits, u64)>,
}

/// Result of a full superpoly recovery: the raw counting box (full-width
/// keys, cube bits still set) and the partition of the projected keys.
#[derive(Clone, Debug)]
pub struct SuperpolyOutcome {
    pub counting: CountingBox,
    pub superpoly: SuperpolyPartition,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(width: usize, ones: &[usize]) -> StateBits {
        let mut bits = StateBits::new(width);
        for &i in ones {
            bits.set(i, true);
        }
        bits
    }

    #[test]
    fn test_record_accumulates() {
        let mut counting = CountingBox::new();
        counting.record(key(8, &[0, 3]), 2);
        counting.record(key(8, &[0, 3]), 3);
        counting.record(key(8, &[1]), 1);
        assert_eq!(counting.len(), 2);
        assert_eq!(counting.total(), 6);
        assert_eq!(counting.count(&key(8, &[0, 3])), 5);
    }

    #[test]
    fn test_project_clears_only_given_positions() {
        let mut counting = CountingBox::new();
        counting.record(key(8, &[0, 5]), 1);
        counting.record(key(8, &[0, 6]), 2);

        let projected = counting.project(&[5, 6]);
        assert_eq!(projected.len(), 1);
        // Position 0 (a key bit) survives; 5 and 6 (cube bits) are stripped
        // and the two entries merge.
        assert_eq!(projected.count(&key(8, &[0])), 3);
    }

    #[test]
    fn test_partition_by_parity() {
        let mut counting = CountingBox::new();
        counting.record(key(4, &[0]), 3);
        counting.record(key(4, &[1]), 2);
        counting.record(key(4, &[2]), 1);

        let partition = counting.partition();
        // Ascending key order with bit 0 most significant.
        assert_eq!(
            partition.odd,
            vec![(key(4, &[2]), 1), (key(4, &[0]), 3)]
        );
        assert_eq!(partition.even, vec![(key(4, &[1]), 2)]);
    }
}
