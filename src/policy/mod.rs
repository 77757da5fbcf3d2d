//! Glob id allocation policy.

pub mod bands;
pub mod allocator;

pub use bands::{GlobPolicy, SizeBand, IdRange, PolicyError};
pub use allocator::{IdAllocator, IdClass, AllocationError};
