//! Persistence of glob assignments.
//!
//! Writing is a two-step protocol:
//!
//! 1. **Baseline**: replace the whole table with one row per baseline
//!    region. Yields a [`BaselineWritten`] proof.
//! 2. **Overlay**: for each named overlay, update its column on existing
//!    rows. Requires the proof, so an overlay pass cannot be issued before
//!    the baseline pass of the same run.
//!
//! Singleton globs are stored under the policy's sentinel id. Every
//! statement must touch exactly one row.
//!
//! ## Atomicity
//!
//! Each pass is atomic on backends with transactions (Postgres, in-memory).
//! The protocol as a whole is not: a crash between the baseline pass and the
//! last overlay pass leaves a table whose overlay columns are stale or null.
//! Re-running from scratch repairs it.

use std::fmt;

use crate::assembler::OverlayGlobs;
use crate::policy::GlobPolicy;
use crate::store::{GlobRow, GlobTable};
use crate::types::{GlobId, RegionId};

/// Which pass a statement belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStage {
    /// Delete-all then insert.
    Baseline,
    /// Per-row column update.
    Overlay,
}

impl fmt::Display for WriteStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Baseline => write!(f, "insert"),
            Self::Overlay => write!(f, "update"),
        }
    }
}

/// Error type for persistence.
#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    /// A statement touched zero or several rows: the table is out of sync
    /// with the region universe.
    #[error("{stage} region {region} with glob id {glob_id} ({column}): {affected} rows affected")]
    RowCount {
        /// Pass the statement belonged to.
        stage: WriteStage,
        /// Column written.
        column: String,
        /// Region written.
        region: RegionId,
        /// Value written.
        glob_id: GlobId,
        /// Rows the backend reported.
        affected: u64,
    },
    /// Overlay handed to the wrong pass.
    #[error("Overlay {overlay} cannot be written in the {stage} pass")]
    WrongStage {
        /// Pass attempted.
        stage: WriteStage,
        /// Overlay label.
        overlay: String,
    },
    /// Column name is not a plain lowercase identifier.
    #[error("Invalid glob table column {0:?}")]
    InvalidColumn(String),
    /// Backend failure.
    #[error("Glob table backend error: {0}")]
    Backend(String),
}

impl WriteError {
    /// Create a backend error from any error type.
    pub fn backend<E: std::error::Error>(e: E) -> Self {
        Self::Backend(e.to_string())
    }
}

/// Check that a single-row statement affected exactly one row.
pub fn check_single_row(stage: WriteStage, column: &str, row: &GlobRow, affected: u64) -> Result<(), WriteError> {
    if affected == 1 {
        return Ok(());
    }
    tracing::error!(
        stage = %stage,
        column = column,
        region = %row.region,
        glob_id = %row.glob_id,
        affected = affected,
        "write affected unexpected row count"
    );
    Err(WriteError::RowCount {
        stage,
        column: column.to_string(),
        region: row.region,
        glob_id: row.glob_id,
        affected,
    })
}

/// Whether `column` is safe to splice into an UPDATE statement.
pub(crate) fn is_plain_column(column: &str) -> bool {
    let mut chars = column.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_lowercase())
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// Proof that the baseline pass of this run completed.
#[derive(Debug)]
pub struct BaselineWritten {
    rows: usize,
}

impl BaselineWritten {
    /// Rows inserted by the baseline pass.
    pub fn rows(&self) -> usize {
        self.rows
    }
}

/// Writes overlay results to a glob table.
pub struct GlobWriter<'a, T: GlobTable> {
    table: &'a T,
    policy: &'a GlobPolicy,
}

impl<'a, T: GlobTable> GlobWriter<'a, T> {
    /// Create a writer.
    pub fn new(table: &'a T, policy: &'a GlobPolicy) -> Self {
        Self { table, policy }
    }

    /// Rows to persist for `result`, sorted by region, singletons collapsed.
    pub fn rows_for(&self, result: &OverlayGlobs) -> Vec<GlobRow> {
        result
            .globs
            .assignments()
            .into_iter()
            .map(|(region, id)| GlobRow::new(region, self.policy.stored_id(id)))
            .collect()
    }

    /// Replace the table with the baseline assignment.
    pub async fn write_baseline(&self, baseline: &OverlayGlobs) -> Result<BaselineWritten, WriteError> {
        if !baseline.overlay.is_baseline() {
            return Err(WriteError::WrongStage {
                stage: WriteStage::Baseline,
                overlay: baseline.overlay.label.clone(),
            });
        }

        let rows = self.rows_for(baseline);
        self.table.replace_baseline(&rows).await?;

        tracing::info!(rows = rows.len(), globs = baseline.globs.len(), "baseline glob table replaced");
        Ok(BaselineWritten { rows: rows.len() })
    }

    /// Update the overlay's column. Returns the number of rows updated.
    pub async fn write_overlay(&self, _baseline: &BaselineWritten, result: &OverlayGlobs) -> Result<usize, WriteError> {
        if result.overlay.is_baseline() {
            return Err(WriteError::WrongStage {
                stage: WriteStage::Overlay,
                overlay: result.overlay.label.clone(),
            });
        }

        let column = result.overlay.column();
        if !is_plain_column(&column) {
            return Err(WriteError::InvalidColumn(column));
        }

        let rows = self.rows_for(result);
        self.table.update_overlay(&column, &rows).await?;

        tracing::info!(overlay = %result.overlay, column = %column, rows = rows.len(), "overlay column updated");
        Ok(rows.len())
    }
}
