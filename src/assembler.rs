//! Glob assembly for one overlay.
//!
//! Repeatedly seeds the discoverer with the lowest remaining eligible region
//! and numbers each glob it returns, until the eligible set is empty. Every
//! region that started eligible ends up in exactly one glob.

use serde::Serialize;

use crate::discover::{ClusterDiscoverer, DiscoverError};
use crate::policy::{AllocationError, GlobPolicy, IdAllocator};
use crate::store::RegionSource;
use crate::types::{EligibleSet, GlobId, GlobMap, Overlay};

/// Error type for assembly.
#[derive(Debug, thiserror::Error)]
pub enum AssembleError {
    /// Adjacency query failed.
    #[error(transparent)]
    Discover(#[from] DiscoverError),
    /// No id could be allocated.
    #[error(transparent)]
    Allocation(#[from] AllocationError),
    /// The allocator returned an id already recorded.
    #[error("Glob id {0} allocated twice in one run")]
    DuplicateId(GlobId),
}

/// Globs assembled for one overlay.
#[derive(Debug, Clone)]
pub struct OverlayGlobs {
    /// Overlay these globs belong to.
    pub overlay: Overlay,
    /// Globs by id.
    pub globs: GlobMap,
    /// Size of the eligible set before clustering.
    pub eligible_count: usize,
}

/// Per-overlay statistics for run reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OverlaySummary {
    /// Overlay label.
    pub label: String,
    /// Column the overlay is stored in.
    pub column: String,
    /// Regions eligible at the start.
    pub eligible: usize,
    /// Globs discovered.
    pub globs: usize,
    /// Size of the home glob, if the home region was eligible.
    pub home_glob_size: Option<usize>,
    /// Globs numbered from the singleton range.
    pub singletons: usize,
    /// Id-independent partition fingerprint.
    pub fingerprint: String,
}

impl OverlayGlobs {
    /// Summarize for reporting.
    pub fn summary(&self, policy: &GlobPolicy) -> OverlaySummary {
        OverlaySummary {
            label: self.overlay.label.clone(),
            column: self.overlay.column(),
            eligible: self.eligible_count,
            globs: self.globs.len(),
            home_glob_size: self.globs.iter().find(|(id, _)| id.is_home()).map(|(_, g)| g.len()),
            singletons: self.globs.iter().filter(|(id, _)| policy.is_singleton_id(*id)).count(),
            fingerprint: self.globs.partition().fingerprint(),
        }
    }
}

/// Drives discovery and allocation to completion for one overlay.
pub struct GlobAssembler<'a, S: RegionSource> {
    discoverer: ClusterDiscoverer<'a, S>,
    policy: &'a GlobPolicy,
}

impl<'a, S: RegionSource> GlobAssembler<'a, S> {
    /// Create an assembler.
    pub fn new(source: &'a S, policy: &'a GlobPolicy) -> Self {
        Self {
            discoverer: ClusterDiscoverer::new(source),
            policy,
        }
    }

    /// Cluster `eligible` into numbered globs.
    ///
    /// Uses a fresh allocator, so ids are unique within this call only.
    pub async fn assemble(&self, overlay: &Overlay, mut eligible: EligibleSet) -> Result<OverlayGlobs, AssembleError> {
        let eligible_count = eligible.len();
        let home = overlay.home();
        let mut allocator = IdAllocator::new(self.policy);
        let mut globs = GlobMap::new();

        while let Some(seed) = eligible.first() {
            let glob = self.discoverer.discover(seed, &mut eligible).await?;
            let contains_home = home.is_some_and(|h| glob.contains(h));
            let (id, class) = allocator.allocate(glob.len(), contains_home)?;

            tracing::debug!(
                overlay = %overlay,
                glob_id = %id,
                class = %class,
                size = glob.len(),
                seed = %seed,
                "numbered glob"
            );

            globs.insert(id, glob).map_err(|_| AssembleError::DuplicateId(id))?;
        }

        tracing::info!(
            overlay = %overlay,
            eligible = eligible_count,
            globs = globs.len(),
            "overlay assembled"
        );

        Ok(OverlayGlobs {
            overlay: overlay.clone(),
            globs,
            eligible_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryRegionSource;
    use crate::types::{RegionId, HOME_GLOB_ID};

    fn r(id: i32) -> RegionId {
        RegionId::new(id)
    }

    fn source() -> InMemoryRegionSource {
        let mut source = InMemoryRegionSource::new();
        source.add_edge(r(1), r(2));
        source.add_edge(r(2), r(3));
        source.add_edge(r(4), r(5));
        source
    }

    #[tokio::test]
    async fn test_home_glob_gets_reserved_id() {
        let source = source();
        let policy = GlobPolicy::default();
        let assembler = GlobAssembler::new(&source, &policy);
        let eligible: EligibleSet = (1..=5).map(r).collect();

        let result = assembler.assemble(&Overlay::named("tx", r(3)), eligible).await.unwrap();

        assert_eq!(result.globs.len(), 2);
        let home = result.globs.get(HOME_GLOB_ID).unwrap();
        assert_eq!(home.members().collect::<Vec<_>>(), vec![r(1), r(2), r(3)]);
        let (id, other) = result.globs.glob_of(r(4)).unwrap();
        assert_eq!(id, GlobId::new(100));
        assert_eq!(other.len(), 2);
    }

    #[tokio::test]
    async fn test_baseline_has_no_home_bias() {
        let source = source();
        let policy = GlobPolicy::default();
        let assembler = GlobAssembler::new(&source, &policy);
        let eligible: EligibleSet = (1..=5).map(r).collect();

        let result = assembler.assemble(&Overlay::baseline(), eligible).await.unwrap();

        assert!(result.globs.get(HOME_GLOB_ID).is_none());
        assert_eq!(result.globs.glob_of(r(1)).unwrap().0, GlobId::new(100));
        assert_eq!(result.globs.glob_of(r(5)).unwrap().0, GlobId::new(101));
    }

    #[tokio::test]
    async fn test_absent_home_allocates_normally() {
        let source = source();
        let policy = GlobPolicy::default();
        let assembler = GlobAssembler::new(&source, &policy);
        let eligible: EligibleSet = [4, 5, 9].into_iter().map(r).collect();

        let result = assembler.assemble(&Overlay::named("tx", r(3)), eligible).await.unwrap();

        assert!(result.globs.get(HOME_GLOB_ID).is_none());
        assert_eq!(result.globs.glob_of(r(9)).unwrap().0, GlobId::new(9000));
        let summary = result.summary(&policy);
        assert_eq!(summary.singletons, 1);
        assert_eq!(summary.home_glob_size, None);
        assert_eq!(summary.eligible, 3);
    }

    #[tokio::test]
    async fn test_empty_eligible_set() {
        let source = source();
        let policy = GlobPolicy::default();
        let assembler = GlobAssembler::new(&source, &policy);

        let result = assembler.assemble(&Overlay::baseline(), EligibleSet::new()).await.unwrap();

        assert!(result.globs.is_empty());
        assert_eq!(result.eligible_count, 0);
    }

    #[tokio::test]
    async fn test_exhaustion_aborts_assembly() {
        let mut source = InMemoryRegionSource::new();
        let policy = GlobPolicy::from_json_str(r#"{"small_glob_id": {"min": 100, "max": 100}}"#).unwrap();
        source.add_edge(r(1), r(2));
        source.add_edge(r(3), r(4));
        let assembler = GlobAssembler::new(&source, &policy);
        let eligible: EligibleSet = (1..=4).map(r).collect();

        let err = assembler.assemble(&Overlay::baseline(), eligible).await.unwrap_err();
        assert!(matches!(err, AssembleError::Allocation(AllocationError::Exhausted { .. })));
    }
}
