use serde::{Deserialize, Serialize};

/// Set of `u64` values stored as sorted, disjoint, non-adjacent half-open ranges.
///
/// Used for sample flags: which timestamps a ring holds, and which samples of a
/// block are missing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SparseSet {
    ranges: Vec<(u64, u64)>,
}

impl SparseSet {
    pub fn new() -> Self {
        Self { ranges: Vec::new() }
    }

    pub fn from_range(from: u64, to: u64) -> Self {
        let mut set = Self::new();
        set.include(from, to);
        set
    }

    pub fn ranges(&self) -> &[(u64, u64)] {
        &self.ranges
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Number of values in the set.
    pub fn count(&self) -> u64 {
        self.ranges.iter().map(|(a, b)| b - a).sum()
    }

    pub fn contains(&self, value: u64) -> bool {
        self.ranges.iter().any(|&(a, b)| a <= value && value < b)
    }

    pub fn clear(&mut self) {
        self.ranges.clear();
    }

    /// Add `[from, to)`, merging with touching ranges.
    pub fn include(&mut self, from: u64, to: u64) -> &mut Self {
        if from >= to {
            return self;
        }

        // first range that ends at or after `from`
        let start = self.ranges.partition_point(|&(_, b)| b < from);
        // first range that starts after `to`
        let end = self.ranges.partition_point(|&(a, _)| a <= to);

        if start == end {
            self.ranges.insert(start, (from, to));
        } else {
            let lo = from.min(self.ranges[start].0);
            let hi = to.max(self.ranges[end - 1].1);
            self.ranges.drain(start..end);
            self.ranges.insert(start, (lo, hi));
        }
        self
    }

    /// Remove `[from, to)`.
    pub fn exclude(&mut self, from: u64, to: u64) -> &mut Self {
        if from >= to {
            return self;
        }

        let mut kept = Vec::with_capacity(self.ranges.len() + 1);
        for &(a, b) in &self.ranges {
            if b <= from || a >= to {
                kept.push((a, b));
                continue;
            }
            if a < from {
                kept.push((a, from));
            }
            if b > to {
                kept.push((to, b));
            }
        }
        self.ranges = kept;
        self
    }

    /// The part of the set inside `[from, to)`.
    pub fn subset(&self, from: u64, to: u64) -> SparseSet {
        let ranges = self
            .ranges
            .iter()
            .filter_map(|&(a, b)| {
                let lo = a.max(from);
                let hi = b.min(to);
                (lo < hi).then_some((lo, hi))
            })
            .collect();
        SparseSet { ranges }
    }

    /// Values of `[from, to)` that are not in the set.
    pub fn complement_within(&self, from: u64, to: u64) -> SparseSet {
        let mut missing = SparseSet::from_range(from, to);
        for &(a, b) in &self.ranges {
            missing.exclude(a, b);
        }
        missing
    }

    /// Translate every range down by `base`; values below `base` are dropped.
    pub fn rebased(&self, base: u64) -> SparseSet {
        let ranges = self
            .ranges
            .iter()
            .filter(|&&(_, b)| b > base)
            .map(|&(a, b)| (a.max(base) - base, b - base))
            .collect();
        SparseSet { ranges }
    }

    /// Translate every range up by `offset`.
    pub fn offset_by(&self, offset: u64) -> SparseSet {
        let ranges = self
            .ranges
            .iter()
            .map(|&(a, b)| (a + offset, b + offset))
            .collect();
        SparseSet { ranges }
    }

    pub fn union_with(&mut self, other: &SparseSet) -> &mut Self {
        for &(a, b) in &other.ranges {
            self.include(a, b);
        }
        self
    }

    /// Forget everything below `value`.
    pub fn truncate_below(&mut self, value: u64) {
        self.exclude(0, value);
    }
}
