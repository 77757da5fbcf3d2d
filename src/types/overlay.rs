//! Overlays: the baseline view plus named residence views.
//!
//! Each named overlay owns one column of the glob table, so its label is
//! validated before it ever reaches SQL.

use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::OnceLock;

use super::region::RegionId;

/// Label the overlay directory uses for the baseline (all data) overlay.
pub const BASELINE_LABEL: &str = "_all";

/// Column holding baseline glob ids.
pub const BASELINE_COLUMN: &str = "glob_id";

const LABEL_PATTERN: &str = r"^[A-Za-z][A-Za-z0-9_]*$";

fn label_regex() -> &'static Regex {
    static LABEL: OnceLock<Regex> = OnceLock::new();
    LABEL.get_or_init(|| Regex::new(LABEL_PATTERN).expect("label pattern is a valid regex"))
}

/// Kind of overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OverlayKind {
    /// Union of all data; no home bias.
    Baseline,
    /// A residence view whose home region's glob is always numbered 1.
    Named {
        /// The overlay's home region.
        home: RegionId,
    },
}

/// A named lens over the data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Overlay {
    /// Label as stored in the overlay directory.
    pub label: String,
    /// Baseline or named.
    pub kind: OverlayKind,
}

impl Overlay {
    /// The baseline overlay.
    pub fn baseline() -> Self {
        Self {
            label: BASELINE_LABEL.to_string(),
            kind: OverlayKind::Baseline,
        }
    }

    /// A named overlay with its home region.
    pub fn named(label: impl Into<String>, home: RegionId) -> Self {
        Self {
            label: label.into(),
            kind: OverlayKind::Named { home },
        }
    }

    /// Build an overlay from a directory row.
    ///
    /// The baseline row's home value is ignored.
    pub fn from_directory_row(label: String, home: RegionId) -> Self {
        if label == BASELINE_LABEL {
            Self {
                label,
                kind: OverlayKind::Baseline,
            }
        } else {
            Self {
                label,
                kind: OverlayKind::Named { home },
            }
        }
    }

    /// Home region, if this overlay has one.
    pub fn home(&self) -> Option<RegionId> {
        match self.kind {
            OverlayKind::Baseline => None,
            OverlayKind::Named { home } => Some(home),
        }
    }

    /// Whether this is the baseline overlay.
    pub fn is_baseline(&self) -> bool {
        matches!(self.kind, OverlayKind::Baseline)
    }

    /// Glob table column this overlay writes to.
    pub fn column(&self) -> String {
        match self.kind {
            OverlayKind::Baseline => BASELINE_COLUMN.to_string(),
            OverlayKind::Named { .. } => format!("{}_glob_id", self.label.to_lowercase()),
        }
    }
}

impl fmt::Display for Overlay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label)
    }
}

/// Error type for overlay directory validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DirectoryError {
    /// No baseline overlay was listed.
    #[error("Overlay directory has no baseline overlay ({})", BASELINE_LABEL)]
    MissingBaseline,
    /// More than one baseline overlay was listed.
    #[error("Overlay directory lists the baseline overlay {0} times")]
    DuplicateBaseline(usize),
    /// A label cannot be used as a column name.
    #[error("Invalid overlay label {0:?}: must match {}", LABEL_PATTERN)]
    InvalidLabel(String),
    /// Two named overlays map to the same column.
    #[error("Duplicate overlay label {0:?}")]
    DuplicateLabel(String),
}

/// Validated overlay list: exactly one baseline plus named overlays sorted
/// by label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlayDirectory {
    baseline: Overlay,
    named: Vec<Overlay>,
}

impl OverlayDirectory {
    /// Validate a raw overlay listing.
    pub fn from_overlays(overlays: Vec<Overlay>) -> Result<Self, DirectoryError> {
        let (baselines, mut named): (Vec<_>, Vec<_>) =
            overlays.into_iter().partition(Overlay::is_baseline);

        let baseline = match baselines.len() {
            0 => return Err(DirectoryError::MissingBaseline),
            1 => baselines.into_iter().next().ok_or(DirectoryError::MissingBaseline)?,
            n => return Err(DirectoryError::DuplicateBaseline(n)),
        };

        let mut seen = BTreeSet::new();
        for overlay in &named {
            if !label_regex().is_match(&overlay.label) {
                return Err(DirectoryError::InvalidLabel(overlay.label.clone()));
            }
            if !seen.insert(overlay.label.to_lowercase()) {
                return Err(DirectoryError::DuplicateLabel(overlay.label.clone()));
            }
        }

        named.sort_by(|a, b| a.label.cmp(&b.label));
        Ok(Self { baseline, named })
    }

    /// The baseline overlay.
    pub fn baseline(&self) -> &Overlay {
        &self.baseline
    }

    /// Named overlays in label order.
    pub fn named(&self) -> &[Overlay] {
        &self.named
    }

    /// Baseline first, then named overlays.
    pub fn iter(&self) -> impl Iterator<Item = &Overlay> + '_ {
        std::iter::once(&self.baseline).chain(self.named.iter())
    }
}
