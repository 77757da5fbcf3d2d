//! End-to-end glob building run.
//!
//! ```text
//! RegionSource::overlays → OverlayDirectory
//!     → per overlay: eligible_regions → GlobAssembler
//!     → GlobWriter: baseline replace, then overlay updates
//!     → RunReport
//! ```
//!
//! Any error aborts the run; nothing is retried.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::Instrument;
use uuid::Uuid;

use crate::assembler::{AssembleError, GlobAssembler, OverlayGlobs, OverlaySummary};
use crate::policy::GlobPolicy;
use crate::store::{GlobTable, RegionSource};
use crate::types::{DirectoryError, EligibleSet, OverlayDirectory};
use crate::writer::{GlobWriter, WriteError};

/// Error type for a run.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// Overlay directory or eligibility query failed.
    #[error("Source unavailable ({query}): {message}")]
    Source {
        /// Query that failed.
        query: String,
        /// Source error text.
        message: String,
    },
    /// Overlay directory is malformed.
    #[error("Invalid overlay directory: {0}")]
    Directory(#[from] DirectoryError),
    /// Clustering or numbering failed.
    #[error("Overlay {overlay}: {source}")]
    Assemble {
        /// Overlay being assembled.
        overlay: String,
        /// Underlying error.
        #[source]
        source: AssembleError,
    },
    /// A write pass failed.
    #[error("Persistence failed: {0}")]
    Persistence(#[from] WriteError),
}

impl RunError {
    fn source_unavailable<E: std::error::Error>(query: impl Into<String>, e: E) -> Self {
        Self::Source {
            query: query.into(),
            message: e.to_string(),
        }
    }
}

/// Options for a run.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Compute globs without touching the glob table.
    pub dry_run: bool,
}

/// Outcome of a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Run identifier, also attached to log lines.
    pub run_id: Uuid,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run finished.
    pub finished_at: DateTime<Utc>,
    /// Whether persistence was skipped.
    pub dry_run: bool,
    /// Rows inserted by the baseline pass.
    pub baseline_rows: Option<usize>,
    /// Baseline first, then named overlays by label.
    pub overlays: Vec<OverlaySummary>,
}

/// Runs glob building against a source and a table.
pub struct GlobRunner<'a, S: RegionSource, T: GlobTable> {
    source: &'a S,
    table: &'a T,
    policy: &'a GlobPolicy,
    options: RunOptions,
}

impl<'a, S: RegionSource, T: GlobTable> GlobRunner<'a, S, T> {
    /// Create a runner.
    pub fn new(source: &'a S, table: &'a T, policy: &'a GlobPolicy, options: RunOptions) -> Self {
        Self { source, table, policy, options }
    }

    /// Read the overlay directory and assemble globs for every overlay.
    ///
    /// The baseline result comes first.
    pub async fn compute(&self) -> Result<Vec<OverlayGlobs>, RunError> {
        let overlays = self.source.overlays().await
            .map_err(|e| RunError::source_unavailable("overlays", e))?;
        let directory = OverlayDirectory::from_overlays(overlays)?;

        tracing::info!(named = directory.named().len(), "overlay directory loaded");

        let assembler = GlobAssembler::new(self.source, self.policy);
        let mut results = Vec::with_capacity(directory.named().len() + 1);

        for overlay in directory.iter() {
            let eligible: EligibleSet = self.source.eligible_regions(overlay).await
                .map_err(|e| RunError::source_unavailable(format!("eligible regions for {overlay}"), e))?
                .into_iter()
                .collect();

            tracing::debug!(overlay = %overlay, eligible = eligible.len(), "clustering overlay");

            let result = assembler.assemble(overlay, eligible).await
                .map_err(|source| RunError::Assemble {
                    overlay: overlay.label.clone(),
                    source,
                })?;
            results.push(result);
        }

        Ok(results)
    }

    /// Compute every overlay, then persist unless this is a dry run.
    ///
    /// All overlays are computed before the first write, so a clustering
    /// failure never leaves a half-written table.
    pub async fn run(&self) -> Result<RunReport, RunError> {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("run", run_id = %run_id, dry_run = self.options.dry_run);
        self.run_in_span(run_id).instrument(span).await
    }

    async fn run_in_span(&self, run_id: Uuid) -> Result<RunReport, RunError> {
        let started_at = Utc::now();
        let results = self.compute().await?;
        let overlays: Vec<OverlaySummary> = results.iter().map(|r| r.summary(self.policy)).collect();

        let baseline_rows = if self.options.dry_run {
            for summary in &overlays {
                tracing::info!(
                    overlay = %summary.label,
                    globs = summary.globs,
                    singletons = summary.singletons,
                    fingerprint = %summary.fingerprint,
                    "dry run: skipping write"
                );
            }
            None
        } else {
            Some(self.persist(&results).await?)
        };

        let report = RunReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            dry_run: self.options.dry_run,
            baseline_rows,
            overlays,
        };
        tracing::info!(overlays = report.overlays.len(), "run complete");
        Ok(report)
    }

    /// Write the baseline pass, then every overlay pass.
    async fn persist(&self, results: &[OverlayGlobs]) -> Result<usize, RunError> {
        let writer = GlobWriter::new(self.table, self.policy);

        let (baseline, named): (Vec<&OverlayGlobs>, Vec<&OverlayGlobs>) =
            results.iter().partition(|r| r.overlay.is_baseline());
        let baseline = baseline
            .first()
            .ok_or(RunError::Directory(DirectoryError::MissingBaseline))?;

        let written = writer.write_baseline(baseline).await?;
        for result in named {
            writer.write_overlay(&written, result).await?;
        }
        Ok(written.rows())
    }
}
