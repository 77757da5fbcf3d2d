//! Core types for glob building.

pub mod region;
pub mod glob;
pub mod overlay;

pub use region::{RegionId, EligibleSet};
pub use glob::{GlobId, Glob, GlobMap, Partition, HOME_GLOB_ID};
pub use overlay::{Overlay, OverlayKind, OverlayDirectory, DirectoryError, BASELINE_LABEL, BASELINE_COLUMN};
