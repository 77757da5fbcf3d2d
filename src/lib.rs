//! # county-globs
//!
//! Partitions adjacency-connected counties into numbered globs.
//!
//! A glob is a connected component of the county adjacency graph restricted
//! to the counties that have data under one overlay. Each overlay (the
//! baseline `_all` view, plus one view per residence) is clustered
//! independently; the results land in one table, baseline first.
//!
//! ## Architecture
//!
//! ```text
//! RegionSource ─→ OverlayDirectory ─→ GlobAssembler ─→ GlobWriter ─→ GlobTable
//!                                      ↙         ↘
//!                            ClusterDiscoverer  IdAllocator
//! ```
//!
//! ## Numbering
//!
//! - The glob holding an overlay's home county is always `1`.
//! - Other globs take the lowest free id from the range of their size band.
//! - Lone counties take ids from the singleton range and are stored under a
//!   single sentinel id.
//!
//! Ids are unique within one overlay's run; different overlays reuse them.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod types;
pub mod policy;
pub mod store;
pub mod discover;
pub mod assembler;
pub mod writer;
pub mod runner;
pub mod canonical;

// Re-exports
pub use types::{
    RegionId, EligibleSet, GlobId, Glob, GlobMap, Partition, HOME_GLOB_ID,
    Overlay, OverlayKind, OverlayDirectory, DirectoryError,
};
pub use policy::{GlobPolicy, SizeBand, IdRange, PolicyError, IdAllocator, IdClass, AllocationError};
pub use store::{RegionSource, GlobTable, GlobRow, InMemoryRegionSource, InMemoryGlobTable};
#[cfg(feature = "postgres")]
pub use store::{PostgresGlobStore, PostgresConfig};
pub use discover::{ClusterDiscoverer, DiscoverError};
pub use assembler::{GlobAssembler, OverlayGlobs, OverlaySummary, AssembleError};
pub use writer::{GlobWriter, BaselineWritten, WriteError, WriteStage};
pub use runner::{GlobRunner, RunOptions, RunReport, RunError};
pub use canonical::{canonical_hash, canonical_hash_hex};
