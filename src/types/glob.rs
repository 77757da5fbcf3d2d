//! Globs and their identifiers.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use super::region::RegionId;
use crate::canonical::canonical_hash_hex;

/// Identifier assigned to one glob within one overlay's run.
///
/// Unique within a run, not across overlays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GlobId(i32);

/// Identifier reserved for the glob containing an overlay's home region.
pub const HOME_GLOB_ID: GlobId = GlobId(1);

impl GlobId {
    /// Create a new GlobId.
    pub const fn new(id: i32) -> Self {
        Self(id)
    }

    /// Get the raw integer id.
    pub const fn get(self) -> i32 {
        self.0
    }

    /// Whether this is the reserved home id.
    pub const fn is_home(self) -> bool {
        self.0 == HOME_GLOB_ID.0
    }
}

impl fmt::Display for GlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A connected cluster of eligible regions.
///
/// Immutable once discovered; membership is a set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Glob {
    members: BTreeSet<RegionId>,
}

impl Glob {
    /// Build a glob from its members. Callers guarantee non-emptiness.
    pub(crate) fn from_members(members: BTreeSet<RegionId>) -> Self {
        debug_assert!(!members.is_empty(), "a glob always has at least its seed");
        Self { members }
    }

    /// Number of member regions.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether the glob has no members. Never true for discovered globs.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Whether `region` belongs to this glob.
    pub fn contains(&self, region: RegionId) -> bool {
        self.members.contains(&region)
    }

    /// Members in ascending order.
    pub fn members(&self) -> impl Iterator<Item = RegionId> + '_ {
        self.members.iter().copied()
    }
}

/// All globs discovered for one overlay, keyed by their id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobMap {
    globs: BTreeMap<GlobId, Glob>,
}

impl GlobMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a glob under `id`.
    ///
    /// Returns the glob back if the id is already taken, so the caller can
    /// report the collision instead of silently merging two clusters.
    pub fn insert(&mut self, id: GlobId, glob: Glob) -> Result<(), Glob> {
        if self.globs.contains_key(&id) {
            return Err(glob);
        }
        self.globs.insert(id, glob);
        Ok(())
    }

    /// Look up a glob by id.
    pub fn get(&self, id: GlobId) -> Option<&Glob> {
        self.globs.get(&id)
    }

    /// Find the glob containing `region`.
    pub fn glob_of(&self, region: RegionId) -> Option<(GlobId, &Glob)> {
        self.globs
            .iter()
            .find(|(_, g)| g.contains(region))
            .map(|(id, g)| (*id, g))
    }

    /// Iterate `(id, glob)` pairs in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = (GlobId, &Glob)> + '_ {
        self.globs.iter().map(|(id, g)| (*id, g))
    }

    /// Number of globs.
    pub fn len(&self) -> usize {
        self.globs.len()
    }

    /// Whether no globs were recorded.
    pub fn is_empty(&self) -> bool {
        self.globs.is_empty()
    }

    /// Total number of regions across all globs.
    pub fn region_count(&self) -> usize {
        self.globs.values().map(Glob::len).sum()
    }

    /// Flatten to `(region, glob id)` pairs sorted by region.
    pub fn assignments(&self) -> Vec<(RegionId, GlobId)> {
        let mut pairs: Vec<_> = self
            .globs
            .iter()
            .flat_map(|(id, g)| g.members().map(move |r| (r, *id)))
            .collect();
        pairs.sort();
        pairs
    }

    /// The id-independent partition these globs form.
    pub fn partition(&self) -> Partition {
        let mut groups: Vec<Vec<RegionId>> = self
            .globs
            .values()
            .map(|g| g.members().collect())
            .collect();
        groups.sort();
        Partition { groups }
    }
}

/// A set of globs with identifiers stripped.
///
/// Two runs over the same snapshot yield equal partitions even when they
/// number the globs differently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partition {
    groups: Vec<Vec<RegionId>>,
}

impl Partition {
    /// Member groups, each sorted, in ascending order.
    pub fn groups(&self) -> &[Vec<RegionId>] {
        &self.groups
    }

    /// Canonical xxh64 fingerprint of the partition.
    pub fn fingerprint(&self) -> String {
        canonical_hash_hex(&self.groups)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn glob(ids: &[i32]) -> Glob {
        Glob::from_members(ids.iter().copied().map(RegionId::new).collect())
    }

    #[test]
    fn test_insert_rejects_taken_id() {
        let mut map = GlobMap::new();
        map.insert(GlobId::new(100), glob(&[1, 2])).unwrap();

        let rejected = map.insert(GlobId::new(100), glob(&[7])).unwrap_err();
        assert!(rejected.contains(RegionId::new(7)));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_assignments_sorted_by_region() {
        let mut map = GlobMap::new();
        map.insert(GlobId::new(5), glob(&[4, 1])).unwrap();
        map.insert(GlobId::new(2), glob(&[3])).unwrap();

        let pairs = map.assignments();
        let regions: Vec<i32> = pairs.iter().map(|(r, _)| r.get()).collect();
        assert_eq!(regions, vec![1, 3, 4]);
        assert_eq!(pairs[1].1, GlobId::new(2));
        assert_eq!(map.region_count(), 3);
    }

    #[test]
    fn test_partition_ignores_ids() {
        let mut a = GlobMap::new();
        a.insert(GlobId::new(1), glob(&[1, 2])).unwrap();
        a.insert(GlobId::new(100), glob(&[5])).unwrap();

        let mut b = GlobMap::new();
        b.insert(GlobId::new(9000), glob(&[5])).unwrap();
        b.insert(GlobId::new(3), glob(&[2, 1])).unwrap();

        assert_eq!(a.partition(), b.partition());
        assert_eq!(a.partition().fingerprint(), b.partition().fingerprint());
    }

    #[test]
    fn test_glob_of() {
        let mut map = GlobMap::new();
        map.insert(GlobId::new(1), glob(&[1, 2, 3])).unwrap();
        map.insert(GlobId::new(100), glob(&[4, 5])).unwrap();

        let (id, g) = map.glob_of(RegionId::new(5)).unwrap();
        assert_eq!(id, GlobId::new(100));
        assert_eq!(g.len(), 2);
        assert!(map.glob_of(RegionId::new(9)).is_none());
    }
}
