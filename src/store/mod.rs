//! Region sources and glob table backends.

pub mod memory;

#[cfg(feature = "postgres")]
pub mod postgres;

use async_trait::async_trait;
use crate::types::{GlobId, Overlay, RegionId};
use crate::writer::WriteError;

/// Read-only view of the region universe: overlays, eligibility and
/// adjacency.
///
/// Implementations must return region lists in ascending order so runs are
/// reproducible.
#[async_trait]
pub trait RegionSource: Send + Sync {
    /// Error type for source queries.
    type Error: std::error::Error + Send + Sync;

    /// List every overlay, including the baseline.
    async fn overlays(&self) -> Result<Vec<Overlay>, Self::Error>;

    /// Regions with qualifying data under `overlay`.
    async fn eligible_regions(&self, overlay: &Overlay) -> Result<Vec<RegionId>, Self::Error>;

    /// Regions adjacent to `region`, resolvable from either endpoint.
    ///
    /// May contain `region` itself or repeated entries.
    async fn neighbors(&self, region: RegionId) -> Result<Vec<RegionId>, Self::Error>;
}

/// One row of a write pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct GlobRow {
    /// Region the row belongs to.
    pub region: RegionId,
    /// Glob id to store, already collapsed for singletons.
    pub glob_id: GlobId,
}

impl GlobRow {
    /// Create a new row.
    pub const fn new(region: RegionId, glob_id: GlobId) -> Self {
        Self { region, glob_id }
    }
}

/// Persistent region → glob id table.
///
/// Each statement a backend issues must affect exactly one row; backends
/// check this with [`crate::writer::check_single_row`] and abort the pass on
/// the first violation.
#[async_trait]
pub trait GlobTable: Send + Sync {
    /// Delete every row, then insert one row per entry of `rows`.
    async fn replace_baseline(&self, rows: &[GlobRow]) -> Result<(), WriteError>;

    /// Set `column` for each region in `rows`. Rows must already exist.
    async fn update_overlay(&self, column: &str, rows: &[GlobRow]) -> Result<(), WriteError>;
}

pub use memory::{InMemoryRegionSource, InMemoryGlobTable, InMemoryError, TableRow};

#[cfg(feature = "postgres")]
pub use postgres::{PostgresGlobStore, PostgresConfig, PostgresError};
