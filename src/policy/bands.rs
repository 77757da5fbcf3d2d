//! Glob policy: size bands, id ranges and the singleton sentinel.
//!
//! The reference deployment maps the small-size band to a wide id range and
//! the large-size band to a narrow one. That reflects how many globs of each
//! class a run produces; it is not a naming slip.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::types::{GlobId, HOME_GLOB_ID};

/// Inclusive range of glob sizes (member counts).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeBand {
    /// Smallest size in the band.
    pub min: usize,
    /// Largest size in the band.
    pub max: usize,
}

impl SizeBand {
    /// Create a new band.
    pub const fn new(min: usize, max: usize) -> Self {
        Self { min, max }
    }

    /// Whether `size` falls inside the band.
    pub fn contains(&self, size: usize) -> bool {
        size >= self.min && size <= self.max
    }
}

/// Inclusive range of glob ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdRange {
    /// Lowest id in the range.
    pub min: i32,
    /// Highest id in the range.
    pub max: i32,
}

impl IdRange {
    /// Create a new range.
    pub const fn new(min: i32, max: i32) -> Self {
        Self { min, max }
    }

    /// Whether `id` falls inside the range.
    pub fn contains(&self, id: GlobId) -> bool {
        id.get() >= self.min && id.get() <= self.max
    }

    /// Ids in ascending order.
    pub fn ids(&self) -> impl Iterator<Item = GlobId> {
        (self.min..=self.max).map(GlobId::new)
    }
}

impl fmt::Display for IdRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..={}", self.min, self.max)
    }
}

/// Error type for policy loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    /// Policy file could not be read.
    #[error("Failed to read policy file: {0}")]
    Io(#[from] std::io::Error),
    /// Policy file is not valid JSON for this schema.
    #[error("Failed to parse policy: {0}")]
    Parse(#[from] serde_json::Error),
    /// A band or range has `min > max`.
    #[error("{name} is empty: min {min} > max {max}")]
    EmptyRange {
        /// Configuration key.
        name: &'static str,
        /// Configured minimum.
        min: i64,
        /// Configured maximum.
        max: i64,
    },
    /// An id range would hand out the reserved home id.
    #[error("{name} {range} contains the reserved home glob id {}", HOME_GLOB_ID)]
    ReservedId {
        /// Configuration key.
        name: &'static str,
        /// Offending range.
        range: IdRange,
    },
    /// The singleton sentinel collides with ids of real globs.
    #[error("no_glob_id_db {0} collides with the home id or a small/large id range")]
    SentinelCollision(i32),
}

/// Size-dependent glob id allocation policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GlobPolicy {
    /// Sizes allocated from `small_glob_id`.
    pub small_glob_size: SizeBand,
    /// Ids for small globs.
    pub small_glob_id: IdRange,
    /// Sizes allocated from `large_glob_id`.
    pub large_glob_size: SizeBand,
    /// Ids for large globs.
    pub large_glob_id: IdRange,
    /// Ids for unclustered singletons, unique within a run.
    pub no_glob_id: IdRange,
    /// Id every singleton is stored under.
    pub no_glob_id_db: i32,
}

impl Default for GlobPolicy {
    fn default() -> Self {
        Self {
            small_glob_size: SizeBand::new(2, 9),
            small_glob_id: IdRange::new(100, 4999),
            large_glob_size: SizeBand::new(10, 5000),
            large_glob_id: IdRange::new(2, 9),
            no_glob_id: IdRange::new(9000, 9999),
            no_glob_id_db: 9999,
        }
    }
}

impl GlobPolicy {
    /// Parse and validate a policy from JSON. Missing keys take defaults.
    pub fn from_json_str(json: &str) -> Result<Self, PolicyError> {
        let policy: Self = serde_json::from_str(json)?;
        policy.validate()?;
        Ok(policy)
    }

    /// Read, parse and validate a policy file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, PolicyError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Check the policy for internal consistency.
    pub fn validate(&self) -> Result<(), PolicyError> {
        let bands = [
            ("small_glob_size", self.small_glob_size),
            ("large_glob_size", self.large_glob_size),
        ];
        for (name, band) in bands {
            if band.min > band.max {
                return Err(PolicyError::EmptyRange {
                    name,
                    min: band.min as i64,
                    max: band.max as i64,
                });
            }
        }

        let ranges = [
            ("small_glob_id", self.small_glob_id),
            ("large_glob_id", self.large_glob_id),
            ("no_glob_id", self.no_glob_id),
        ];
        for (name, range) in ranges {
            if range.min > range.max {
                return Err(PolicyError::EmptyRange {
                    name,
                    min: range.min.into(),
                    max: range.max.into(),
                });
            }
            if range.contains(HOME_GLOB_ID) {
                return Err(PolicyError::ReservedId { name, range });
            }
        }

        let sentinel = self.sentinel();
        if sentinel.is_home()
            || self.small_glob_id.contains(sentinel)
            || self.large_glob_id.contains(sentinel)
        {
            return Err(PolicyError::SentinelCollision(self.no_glob_id_db));
        }

        Ok(())
    }

    /// Stored id for collapsed singletons.
    pub fn sentinel(&self) -> GlobId {
        GlobId::new(self.no_glob_id_db)
    }

    /// Whether `id` was handed out to an unclustered singleton.
    pub fn is_singleton_id(&self, id: GlobId) -> bool {
        !id.is_home() && self.no_glob_id.contains(id)
    }

    /// Id to persist for a glob allocated `id` during the run.
    pub fn stored_id(&self, id: GlobId) -> GlobId {
        if self.is_singleton_id(id) {
            self.sentinel()
        } else {
            id
        }
    }
}
