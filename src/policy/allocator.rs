//! Identifier allocation for one overlay run.
//!
//! The allocator owns the run's used-id ledger. Each overlay run creates its
//! own allocator, so runs never share bookkeeping.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use super::bands::{GlobPolicy, IdRange};
use crate::types::{GlobId, HOME_GLOB_ID};

/// Which branch of the policy a glob was numbered under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdClass {
    /// Contains the overlay's home region.
    Home,
    /// Size in the small band.
    Small,
    /// Size in the large band.
    Large,
    /// Size 1, outside every band.
    Singleton,
}

impl fmt::Display for IdClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Home => write!(f, "home"),
            Self::Small => write!(f, "small"),
            Self::Large => write!(f, "large"),
            Self::Singleton => write!(f, "singleton"),
        }
    }
}

/// Error type for id allocation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AllocationError {
    /// Every id in the class's range is taken.
    #[error("No free {class} glob id left in {range}")]
    Exhausted {
        /// Class that ran out.
        class: IdClass,
        /// Its configured range.
        range: IdRange,
    },
    /// A non-home glob's size matches no band and is not 1.
    #[error("Glob size {size} matches no configured size band")]
    NoBand {
        /// Offending size.
        size: usize,
    },
    /// A second glob claimed the home id.
    #[error("Home glob id {} already allocated in this run", HOME_GLOB_ID)]
    HomeTaken,
}

/// Per-run identifier allocator.
#[derive(Debug, Clone)]
pub struct IdAllocator<'p> {
    policy: &'p GlobPolicy,
    used: BTreeSet<GlobId>,
}

impl<'p> IdAllocator<'p> {
    /// Create an allocator with an empty ledger.
    pub fn new(policy: &'p GlobPolicy) -> Self {
        Self {
            policy,
            used: BTreeSet::new(),
        }
    }

    /// Decide which policy branch applies to a glob.
    ///
    /// Branches are tried in order: home, small band, large band, singleton.
    pub fn classify(&self, size: usize, contains_home: bool) -> Result<IdClass, AllocationError> {
        if contains_home {
            Ok(IdClass::Home)
        } else if self.policy.small_glob_size.contains(size) {
            Ok(IdClass::Small)
        } else if self.policy.large_glob_size.contains(size) {
            Ok(IdClass::Large)
        } else if size == 1 {
            Ok(IdClass::Singleton)
        } else {
            Err(AllocationError::NoBand { size })
        }
    }

    /// Allocate an unused id for a glob of `size` regions.
    pub fn allocate(&mut self, size: usize, contains_home: bool) -> Result<(GlobId, IdClass), AllocationError> {
        let class = self.classify(size, contains_home)?;
        let id = match class {
            IdClass::Home => {
                if self.used.contains(&HOME_GLOB_ID) {
                    return Err(AllocationError::HomeTaken);
                }
                HOME_GLOB_ID
            }
            IdClass::Small => self.lowest_free(class, self.policy.small_glob_id)?,
            IdClass::Large => self.lowest_free(class, self.policy.large_glob_id)?,
            IdClass::Singleton => self.lowest_free(class, self.policy.no_glob_id)?,
        };
        self.used.insert(id);
        Ok((id, class))
    }

    /// Linear scan for the lowest id in `range` not yet used.
    fn lowest_free(&self, class: IdClass, range: IdRange) -> Result<GlobId, AllocationError> {
        range
            .ids()
            .find(|id| !id.is_home() && !self.used.contains(id))
            .ok_or(AllocationError::Exhausted { class, range })
    }

    /// Ids handed out so far.
    pub fn used(&self) -> &BTreeSet<GlobId> {
        &self.used
    }

    /// Consume the allocator, returning its ledger.
    pub fn into_used(self) -> BTreeSet<GlobId> {
        self.used
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::SizeBand;

    #[test]
    fn test_home_wins_over_size() {
        let policy = GlobPolicy::default();
        let mut alloc = IdAllocator::new(&policy);

        assert_eq!(alloc.allocate(1, true).unwrap(), (HOME_GLOB_ID, IdClass::Home));
        assert_eq!(alloc.allocate(4, true).unwrap_err(), AllocationError::HomeTaken);
    }

    #[test]
    fn test_lowest_free_in_each_class() {
        let policy = GlobPolicy::default();
        let mut alloc = IdAllocator::new(&policy);

        assert_eq!(alloc.allocate(2, false).unwrap(), (GlobId::new(100), IdClass::Small));
        assert_eq!(alloc.allocate(9, false).unwrap(), (GlobId::new(101), IdClass::Small));
        assert_eq!(alloc.allocate(10, false).unwrap(), (GlobId::new(2), IdClass::Large));
        assert_eq!(alloc.allocate(1, false).unwrap(), (GlobId::new(9000), IdClass::Singleton));
        assert_eq!(alloc.allocate(1, false).unwrap(), (GlobId::new(9001), IdClass::Singleton));
        assert_eq!(alloc.used().len(), 5);
    }

    #[test]
    fn test_large_range_exhausts() {
        let policy = GlobPolicy::default();
        let mut alloc = IdAllocator::new(&policy);

        for expected in 2..=9 {
            let (id, _) = alloc.allocate(50, false).unwrap();
            assert_eq!(id.get(), expected);
        }
        assert_eq!(
            alloc.allocate(50, false).unwrap_err(),
            AllocationError::Exhausted { class: IdClass::Large, range: IdRange::new(2, 9) }
        );
    }

    #[test]
    fn test_size_outside_bands_is_error() {
        let policy = GlobPolicy::default();
        let alloc = IdAllocator::new(&policy);
        assert_eq!(alloc.classify(5001, false).unwrap_err(), AllocationError::NoBand { size: 5001 });
    }

    #[test]
    fn test_small_band_checked_before_singleton() {
        let mut policy = GlobPolicy::default();
        policy.small_glob_size = SizeBand::new(1, 9);
        let alloc = IdAllocator::new(&policy);
        assert_eq!(alloc.classify(1, false).unwrap(), IdClass::Small);
    }

    #[test]
    fn test_overlapping_ranges_share_ledger() {
        let mut policy = GlobPolicy::default();
        policy.large_glob_id = IdRange::new(100, 101);
        let mut alloc = IdAllocator::new(&policy);

        assert_eq!(alloc.allocate(3, false).unwrap().0, GlobId::new(100));
        assert_eq!(alloc.allocate(20, false).unwrap().0, GlobId::new(101));
        assert_eq!(alloc.allocate(3, false).unwrap().0, GlobId::new(102));
        assert!(alloc.allocate(20, false).is_err());
    }

    #[test]
    fn test_ledgers_are_independent() {
        let policy = GlobPolicy::default();
        let mut first = IdAllocator::new(&policy);
        let mut second = IdAllocator::new(&policy);

        assert_eq!(first.allocate(3, false).unwrap().0, GlobId::new(100));
        assert_eq!(second.allocate(3, false).unwrap().0, GlobId::new(100));
        assert_eq!(first.into_used().len(), 1);
    }
}
