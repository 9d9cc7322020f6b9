//! Memoised subpaths of one search.
//!
//! A [`Cache`] lives for one [`super::Optimiser::optimal_path`] call. Entries are only
//! ever added, since every input of the search is immutable.

use std::{cmp::Ordering, collections::BTreeMap};

use crate::{processed::ProtoActivation, time::Position};

/// Where a subpath search starts: the first point an activation may begin on, and the
/// position from which SP may be gathered.
#[derive(Debug, Clone, Copy)]
pub struct CacheKey {
    /// Index of the first point an activation may start on.
    pub point: usize,
    /// Where SP starts being gathered.
    pub position: Position,
}

impl PartialEq for CacheKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for CacheKey {}

impl PartialOrd for CacheKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CacheKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.point.cmp(&other.point).then_with(|| {
            self.position
                .beat
                .value()
                .total_cmp(&other.position.beat.value())
        })
    }
}

/// The best subpaths from some key: every first activation reaching the best score,
/// each with the key the rest of its path starts from.
#[derive(Debug, Clone, Default)]
pub struct CacheValue {
    /// The tied best first activations, with the key after each.
    pub possible_next_acts: Vec<(ProtoActivation, CacheKey)>,
    /// Score gained by the best subpath.
    pub score_boost: u32,
}

/// Best subpaths found so far in one search.
#[derive(Debug, Default)]
pub struct Cache {
    /// Keyed by where the subpath search starts.
    pub paths: BTreeMap<CacheKey, CacheValue>,
    /// Keyed by the first point, assuming SP is full there.
    pub full_sp_paths: BTreeMap<usize, CacheValue>,
}

/// An add-only set of point indices in `start..end`.
///
/// Act ends are mostly attained in increasing order, so the set is stored as the
/// lowest absent index plus the few members above it.
#[derive(Debug, Clone)]
pub struct PointRangeSet {
    start: usize,
    end: usize,
    min_absent: usize,
    abnormal_elements: Vec<usize>,
}

impl PointRangeSet {
    /// Creates an empty set over `start..end`.
    #[must_use]
    pub const fn new(start: usize, end: usize) -> Self {
        Self {
            start,
            end,
            min_absent: start,
            abnormal_elements: Vec::new(),
        }
    }

    /// Whether `element` was added.
    #[must_use]
    pub fn contains(&self, element: usize) -> bool {
        if !(self.start..self.end).contains(&element) {
            return false;
        }
        element < self.min_absent || self.abnormal_elements.contains(&element)
    }

    /// The lowest index in range not yet added, or `end` when full.
    #[must_use]
    pub const fn lowest_absent_element(&self) -> usize {
        self.min_absent
    }

    /// Adds `element`, which must lie in range.
    pub fn add(&mut self, element: usize) {
        debug_assert!((self.start..self.end).contains(&element));
        if element != self.min_absent {
            self.abnormal_elements.push(element);
            return;
        }
        self.min_absent += 1;
        while let Some(index) = self
            .abnormal_elements
            .iter()
            .position(|&abnormal| abnormal == self.min_absent)
        {
            self.abnormal_elements.swap_remove(index);
            self.min_absent += 1;
        }
    }
}
