//! Region identifiers and the per-overlay eligible set.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Identifier of one atomic region (a county).
///
/// Stored as `int4` in the database, so it wraps an `i32`.
/// Implements `Ord` so region collections iterate deterministically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegionId(i32);

impl RegionId {
    /// Create a new RegionId.
    pub const fn new(id: i32) -> Self {
        Self(id)
    }

    /// Get the raw integer id.
    pub const fn get(self) -> i32 {
        self.0
    }
}

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i32> for RegionId {
    fn from(id: i32) -> Self {
        Self(id)
    }
}

/// Regions still in play for one overlay's clustering run.
///
/// Clustering consumes the set: every region is removed the moment it is
/// absorbed into a glob, and the run ends when the set is empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EligibleSet {
    regions: BTreeSet<RegionId>,
}

impl EligibleSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `region` is still eligible.
    pub fn contains(&self, region: RegionId) -> bool {
        self.regions.contains(&region)
    }

    /// Remove `region`, returning whether it was still eligible.
    pub fn take(&mut self, region: RegionId) -> bool {
        self.regions.remove(&region)
    }

    /// Lowest remaining region, used as the next clustering seed.
    pub fn first(&self) -> Option<RegionId> {
        self.regions.first().copied()
    }

    /// Number of regions still eligible.
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    /// Whether every region has been consumed.
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Iterate the remaining regions in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = RegionId> + '_ {
        self.regions.iter().copied()
    }
}

impl FromIterator<RegionId> for EligibleSet {
    fn from_iter<I: IntoIterator<Item = RegionId>>(iter: I) -> Self {
        Self {
            regions: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_is_destructive() {
        let mut set: EligibleSet = [3, 1, 2].into_iter().map(RegionId::new).collect();

        assert!(set.take(RegionId::new(2)));
        assert!(!set.take(RegionId::new(2)));
        assert!(!set.contains(RegionId::new(2)));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_first_is_lowest() {
        let set: EligibleSet = [30, 10, 20].into_iter().map(RegionId::new).collect();
        assert_eq!(set.first(), Some(RegionId::new(10)));
        assert_eq!(EligibleSet::new().first(), None);
    }
}
