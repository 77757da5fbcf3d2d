//! In-memory region source and glob table for testing and dry runs.

use std::collections::{BTreeMap, BTreeSet};
use async_trait::async_trait;
use parking_lot::Mutex;

use crate::types::{GlobId, Overlay, RegionId, BASELINE_COLUMN};
use crate::writer::{check_single_row, WriteError, WriteStage};
use super::{GlobRow, GlobTable, RegionSource};

/// Error type for the in-memory source.
#[derive(Debug, Clone, thiserror::Error)]
pub enum InMemoryError {
    /// Adjacency for this region was marked unavailable.
    #[error("Adjacency unavailable for region {0}")]
    AdjacencyUnavailable(RegionId),
    /// The overlay directory was marked unavailable.
    #[error("Overlay directory unavailable")]
    OverlaysUnavailable,
    /// Eligibility for this overlay label was marked unavailable.
    #[error("Eligibility unavailable for overlay {0}")]
    EligibilityUnavailable(String),
}

/// In-memory region source.
///
/// Uses BTreeMap/BTreeSet for deterministic iteration order. Adjacency
/// lists keep repeated edges so multi-edges reach the discoverer as-is.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRegionSource {
    /// Overlays in directory order.
    overlays: Vec<Overlay>,
    /// Eligible regions by overlay label.
    eligible: BTreeMap<String, BTreeSet<RegionId>>,
    /// Region -> neighbors, both directions stored.
    adjacency: BTreeMap<RegionId, Vec<RegionId>>,
    /// Regions whose adjacency query fails.
    unavailable: BTreeSet<RegionId>,
    /// Overlay labels whose eligibility query fails.
    unavailable_eligibility: BTreeSet<String>,
    /// Whether the overlay directory query fails.
    overlays_unavailable: bool,
}

impl InMemoryRegionSource {
    /// Create a new empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an undirected edge.
    pub fn add_edge(&mut self, a: RegionId, b: RegionId) {
        self.adjacency.entry(a).or_default().push(b);
        if a != b {
            self.adjacency.entry(b).or_default().push(a);
        }
    }

    /// Add an overlay with its eligible regions.
    pub fn add_overlay(&mut self, overlay: Overlay, eligible: impl IntoIterator<Item = RegionId>) {
        self.eligible
            .entry(overlay.label.clone())
            .or_default()
            .extend(eligible);
        self.overlays.push(overlay);
    }

    /// Make every adjacency query for `region` fail.
    pub fn fail_neighbors_of(&mut self, region: RegionId) {
        self.unavailable.insert(region);
    }

    /// Make the eligibility query for overlay `label` fail.
    pub fn fail_eligibility_of(&mut self, label: impl Into<String>) {
        self.unavailable_eligibility.insert(label.into());
    }

    /// Make the overlay directory query fail.
    pub fn fail_overlays(&mut self) {
        self.overlays_unavailable = true;
    }
}

#[async_trait]
impl RegionSource for InMemoryRegionSource {
    type Error = InMemoryError;

    async fn overlays(&self) -> Result<Vec<Overlay>, Self::Error> {
        if self.overlays_unavailable {
            return Err(InMemoryError::OverlaysUnavailable);
        }
        Ok(self.overlays.clone())
    }

    async fn eligible_regions(&self, overlay: &Overlay) -> Result<Vec<RegionId>, Self::Error> {
        if self.unavailable_eligibility.contains(&overlay.label) {
            return Err(InMemoryError::EligibilityUnavailable(overlay.label.clone()));
        }
        Ok(self.eligible
            .get(&overlay.label)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default())
    }

    async fn neighbors(&self, region: RegionId) -> Result<Vec<RegionId>, Self::Error> {
        if self.unavailable.contains(&region) {
            return Err(InMemoryError::AdjacencyUnavailable(region));
        }
        let mut neighbors = self.adjacency.get(&region).cloned().unwrap_or_default();
        neighbors.sort();
        Ok(neighbors)
    }
}

/// One row of the in-memory glob table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRow {
    /// Baseline glob id.
    pub glob_id: GlobId,
    /// Overlay glob ids by column name.
    pub overlays: BTreeMap<String, GlobId>,
}

impl TableRow {
    /// Value of `column`, baseline column included.
    pub fn get(&self, column: &str) -> Option<GlobId> {
        if column == BASELINE_COLUMN {
            Some(self.glob_id)
        } else {
            self.overlays.get(column).copied()
        }
    }
}

/// In-memory glob table.
///
/// Each write pass is applied to a staged copy that replaces the live rows
/// only when every statement succeeded, like a committed transaction.
#[derive(Debug, Default)]
pub struct InMemoryGlobTable {
    rows: Mutex<BTreeMap<RegionId, TableRow>>,
}

impl InMemoryGlobTable {
    /// Create a new empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a table holding leftovers from an earlier run.
    pub fn with_rows(rows: impl IntoIterator<Item = (RegionId, GlobId)>) -> Self {
        let rows = rows
            .into_iter()
            .map(|(region, glob_id)| (region, TableRow { glob_id, overlays: BTreeMap::new() }))
            .collect();
        Self { rows: Mutex::new(rows) }
    }

    /// Fetch one row.
    pub fn row(&self, region: RegionId) -> Option<TableRow> {
        self.rows.lock().get(&region).cloned()
    }

    /// Copy of every row.
    pub fn snapshot(&self) -> BTreeMap<RegionId, TableRow> {
        self.rows.lock().clone()
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.lock().len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.rows.lock().is_empty()
    }
}

#[async_trait]
impl GlobTable for InMemoryGlobTable {
    async fn replace_baseline(&self, rows: &[GlobRow]) -> Result<(), WriteError> {
        let mut staged: BTreeMap<RegionId, TableRow> = BTreeMap::new();

        for row in rows {
            // A duplicate key would violate the primary key; nothing is inserted.
            let affected = if staged.contains_key(&row.region) {
                0
            } else {
                staged.insert(row.region, TableRow { glob_id: row.glob_id, overlays: BTreeMap::new() });
                1
            };
            check_single_row(WriteStage::Baseline, BASELINE_COLUMN, row, affected)?;
        }

        *self.rows.lock() = staged;
        Ok(())
    }

    async fn update_overlay(&self, column: &str, rows: &[GlobRow]) -> Result<(), WriteError> {
        let mut live = self.rows.lock();
        let mut staged = live.clone();

        for row in rows {
            let affected = match staged.get_mut(&row.region) {
                Some(existing) => {
                    existing.overlays.insert(column.to_string(), row.glob_id);
                    1
                }
                None => 0,
            };
            check_single_row(WriteStage::Overlay, column, row, affected)?;
        }

        *live = staged;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(region: i32, glob: i32) -> GlobRow {
        GlobRow::new(RegionId::new(region), GlobId::new(glob))
    }

    #[tokio::test]
    async fn test_neighbors_resolve_both_directions() {
        let mut source = InMemoryRegionSource::new();
        source.add_edge(RegionId::new(2), RegionId::new(1));
        source.add_edge(RegionId::new(2), RegionId::new(3));

        assert_eq!(source.neighbors(RegionId::new(1)).await.unwrap(), vec![RegionId::new(2)]);
        assert_eq!(
            source.neighbors(RegionId::new(2)).await.unwrap(),
            vec![RegionId::new(1), RegionId::new(3)]
        );
        assert!(source.neighbors(RegionId::new(7)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_eligible_regions_by_label() {
        let mut source = InMemoryRegionSource::new();
        source.add_overlay(Overlay::baseline(), [3, 1].map(RegionId::new));
        source.add_overlay(Overlay::named("ca", RegionId::new(1)), [1].map(RegionId::new));

        let all = source.eligible_regions(&Overlay::baseline()).await.unwrap();
        assert_eq!(all, vec![RegionId::new(1), RegionId::new(3)]);

        let missing = source.eligible_regions(&Overlay::named("wa", RegionId::new(5))).await.unwrap();
        assert!(missing.is_empty());
        assert_eq!(source.overlays().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_injected_query_failures() {
        let mut source = InMemoryRegionSource::new();
        source.add_overlay(Overlay::baseline(), [1].map(RegionId::new));
        source.fail_eligibility_of("ca");

        assert!(source.eligible_regions(&Overlay::baseline()).await.is_ok());
        let err = source.eligible_regions(&Overlay::named("ca", RegionId::new(1))).await.unwrap_err();
        assert!(matches!(err, InMemoryError::EligibilityUnavailable(label) if label == "ca"));

        source.fail_overlays();
        assert!(matches!(source.overlays().await, Err(InMemoryError::OverlaysUnavailable)));
    }

    #[tokio::test]
    async fn test_replace_drops_previous_rows() {
        let table = InMemoryGlobTable::with_rows([(RegionId::new(8), GlobId::new(100))]);

        table.replace_baseline(&[row(1, 1), row(2, 1)]).await.unwrap();

        assert_eq!(table.len(), 2);
        assert!(table.row(RegionId::new(8)).is_none());
    }

    #[tokio::test]
    async fn test_duplicate_insert_keeps_previous_rows() {
        let table = InMemoryGlobTable::with_rows([(RegionId::new(8), GlobId::new(100))]);

        let err = table.replace_baseline(&[row(1, 1), row(1, 2)]).await.unwrap_err();

        assert!(matches!(err, WriteError::RowCount { affected: 0, .. }));
        assert_eq!(table.row(RegionId::new(8)).unwrap().glob_id, GlobId::new(100));
    }

    #[tokio::test]
    async fn test_update_missing_row_is_all_or_nothing() {
        let table = InMemoryGlobTable::new();
        table.replace_baseline(&[row(1, 1), row(2, 100)]).await.unwrap();

        let err = table.update_overlay("ca_glob_id", &[row(1, 1), row(3, 100)]).await.unwrap_err();

        assert!(matches!(err, WriteError::RowCount { stage: WriteStage::Overlay, .. }));
        assert_eq!(table.row(RegionId::new(1)).unwrap().get("ca_glob_id"), None);
    }

    #[tokio::test]
    async fn test_update_sets_only_its_column() {
        let table = InMemoryGlobTable::new();
        table.replace_baseline(&[row(1, 1), row(2, 100)]).await.unwrap();

        table.update_overlay("ca_glob_id", &[row(2, 1)]).await.unwrap();

        let updated = table.row(RegionId::new(2)).unwrap();
        assert_eq!(updated.get("glob_id"), Some(GlobId::new(100)));
        assert_eq!(updated.get("ca_glob_id"), Some(GlobId::new(1)));
        assert_eq!(table.row(RegionId::new(1)).unwrap().get("ca_glob_id"), None);
    }
}
