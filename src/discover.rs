//! Cluster discovery.
//!
//! Grows one glob from a seed region by walking adjacency edges whose far
//! endpoint is still eligible. The walk uses an explicit stack, so component
//! size is bounded by memory rather than call depth.

use std::collections::BTreeSet;

use crate::store::RegionSource;
use crate::types::{EligibleSet, Glob, RegionId};

/// Error type for discovery.
#[derive(Debug, thiserror::Error)]
pub enum DiscoverError {
    /// Adjacency could not be queried; the glob would be incomplete.
    #[error("Adjacency query failed for region {region}: {message}")]
    Adjacency {
        /// Region whose neighbors were requested.
        region: RegionId,
        /// Source error text.
        message: String,
    },
}

/// Discovers globs against a region source.
pub struct ClusterDiscoverer<'a, S: RegionSource> {
    source: &'a S,
}

impl<'a, S: RegionSource> ClusterDiscoverer<'a, S> {
    /// Create a discoverer reading adjacency from `source`.
    pub fn new(source: &'a S) -> Self {
        Self { source }
    }

    /// Discover the glob containing `seed`.
    ///
    /// Every region absorbed into the glob, the seed included, is removed
    /// from `eligible`. The seed joins the glob even if it was no longer
    /// eligible. A region with no eligible neighbors, or no adjacency
    /// entries at all, yields a singleton.
    pub async fn discover(&self, seed: RegionId, eligible: &mut EligibleSet) -> Result<Glob, DiscoverError> {
        let mut members = BTreeSet::new();
        let mut stack = vec![seed];

        eligible.take(seed);
        members.insert(seed);

        while let Some(region) = stack.pop() {
            let neighbors = self.source.neighbors(region).await
                .map_err(|e| DiscoverError::Adjacency {
                    region,
                    message: e.to_string(),
                })?;

            for neighbor in neighbors {
                // take() fails for self-loops, repeats and regions already
                // absorbed, so each region is pushed at most once.
                if eligible.take(neighbor) {
                    tracing::trace!(from = %region, to = %neighbor, "absorbing neighbor");
                    members.insert(neighbor);
                    stack.push(neighbor);
                }
            }
        }

        tracing::debug!(seed = %seed, size = members.len(), remaining = eligible.len(), "discovered glob");
        Ok(Glob::from_members(members))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryRegionSource;

    fn ids(raw: &[i32]) -> Vec<RegionId> {
        raw.iter().copied().map(RegionId::new).collect()
    }

    fn eligible(raw: &[i32]) -> EligibleSet {
        ids(raw).into_iter().collect()
    }

    fn chain_source() -> InMemoryRegionSource {
        let mut source = InMemoryRegionSource::new();
        source.add_edge(RegionId::new(1), RegionId::new(2));
        source.add_edge(RegionId::new(2), RegionId::new(3));
        source.add_edge(RegionId::new(4), RegionId::new(5));
        source
    }

    #[tokio::test]
    async fn test_discovers_component_and_consumes_it() {
        let source = chain_source();
        let discoverer = ClusterDiscoverer::new(&source);
        let mut set = eligible(&[1, 2, 3, 4, 5]);

        let glob = discoverer.discover(RegionId::new(3), &mut set).await.unwrap();

        assert_eq!(glob.members().collect::<Vec<_>>(), ids(&[1, 2, 3]));
        assert_eq!(set.iter().collect::<Vec<_>>(), ids(&[4, 5]));
    }

    #[tokio::test]
    async fn test_ineligible_regions_split_components() {
        let source = chain_source();
        let discoverer = ClusterDiscoverer::new(&source);
        let mut set = eligible(&[1, 3]);

        let glob = discoverer.discover(RegionId::new(1), &mut set).await.unwrap();

        assert_eq!(glob.len(), 1);
        assert!(set.contains(RegionId::new(3)));
    }

    #[tokio::test]
    async fn test_unknown_region_is_singleton() {
        let source = chain_source();
        let discoverer = ClusterDiscoverer::new(&source);
        let mut set = eligible(&[9]);

        let glob = discoverer.discover(RegionId::new(9), &mut set).await.unwrap();

        assert_eq!(glob.members().collect::<Vec<_>>(), ids(&[9]));
        assert!(set.is_empty());
    }

    #[tokio::test]
    async fn test_self_loops_and_multi_edges() {
        let mut source = InMemoryRegionSource::new();
        source.add_edge(RegionId::new(1), RegionId::new(1));
        source.add_edge(RegionId::new(1), RegionId::new(2));
        source.add_edge(RegionId::new(2), RegionId::new(1));
        source.add_edge(RegionId::new(1), RegionId::new(2));
        let discoverer = ClusterDiscoverer::new(&source);
        let mut set = eligible(&[1, 2]);

        let glob = discoverer.discover(RegionId::new(1), &mut set).await.unwrap();

        assert_eq!(glob.len(), 2);
        assert!(set.is_empty());
    }

    #[tokio::test]
    async fn test_adjacency_failure_is_error() {
        let mut source = chain_source();
        source.fail_neighbors_of(RegionId::new(2));
        let discoverer = ClusterDiscoverer::new(&source);
        let mut set = eligible(&[1, 2, 3]);

        let err = discoverer.discover(RegionId::new(1), &mut set).await.unwrap_err();
        assert!(matches!(err, DiscoverError::Adjacency { region, .. } if region == RegionId::new(2)));
    }

    #[tokio::test]
    async fn test_long_chain_does_not_recurse() {
        let mut source = InMemoryRegionSource::new();
        for i in 1..50_000 {
            source.add_edge(RegionId::new(i), RegionId::new(i + 1));
        }
        let discoverer = ClusterDiscoverer::new(&source);
        let mut set: EligibleSet = (1..=50_000).map(RegionId::new).collect();

        let glob = discoverer.discover(RegionId::new(25_000), &mut set).await.unwrap();

        assert_eq!(glob.len(), 50_000);
        assert!(set.is_empty());
    }
}
