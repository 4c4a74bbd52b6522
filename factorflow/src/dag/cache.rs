use std::sync::Arc;

use crate::api::error::BuildError;
use crate::dag::DependencyGraph;
use crate::metrics::global_metrics;
use crate::model::Topology;
use crate::schedule::Schedule;

/// Everything a built dependency graph depends on.
#[derive(Copy, Clone, Serialize, Deserialize, Debug, Eq, PartialEq, Hash)]
pub struct CacheKey {
    pub topology_version: u64,
    pub schedule_version: u64,
    pub iterations: usize,
}

impl CacheKey {
    pub fn new<T>(topology: &T, schedule: &Schedule, iterations: usize) -> Self
    where
        T: Topology + ?Sized,
    {
        CacheKey {
            topology_version: topology.topology_version(),
            schedule_version: schedule.version(),
            iterations,
        }
    }
}

/// Holds the most recently built dependency graph.
///
/// Owned by the orchestrating thread; any key mismatch rebuilds from scratch
/// and a failed build leaves the previous entry in place.
#[derive(Debug, Default)]
pub struct VersionCache {
    cached: Option<(CacheKey, Arc<DependencyGraph>)>,
    builds: u64,
}

impl VersionCache {
    pub fn new() -> Self {
        VersionCache {
            cached: None,
            builds: 0,
        }
    }

    pub fn get_or_build<T>(
        &mut self,
        topology: &T,
        schedule: &Schedule,
        iterations: usize,
    ) -> Result<Arc<DependencyGraph>, BuildError>
    where
        T: Topology + ?Sized,
    {
        let key = CacheKey::new(topology, schedule, iterations);
        self.get_or_build_with(key, || {
            DependencyGraph::build(topology, schedule, iterations)
        })
    }

    pub fn get_or_build_with<F>(
        &mut self,
        key: CacheKey,
        build: F,
    ) -> Result<Arc<DependencyGraph>, BuildError>
    where
        F: FnOnce() -> Result<DependencyGraph, BuildError>,
    {
        if let Some((cached_key, graph)) = &self.cached {
            if *cached_key == key {
                trace!("dependency graph cache hit, key={:?}", key);
                global_metrics::cache_hit();
                return Ok(graph.clone());
            }
        }

        debug!("dependency graph cache miss, key={:?}", key);
        let graph = Arc::new(build()?);
        self.builds += 1;
        global_metrics::graph_built();
        self.cached = Some((key, graph.clone()));
        Ok(graph)
    }

    pub fn invalidate(&mut self) {
        if let Some((key, _)) = self.cached.take() {
            debug!("dependency graph cache invalidated, key={:?}", key);
        }
    }

    pub fn key(&self) -> Option<CacheKey> {
        self.cached.as_ref().map(|(key, _)| *key)
    }

    /// Number of builds performed by this cache.
    pub fn builds(&self) -> u64 {
        self.builds
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::api::error::BuildError;
    use crate::dag::VersionCache;
    use crate::model::{EdgeId, FactorGraph, FactorTable};
    use crate::schedule::Schedule;

    #[test]
    pub fn cache_hit_test() {
        let mut graph = FactorGraph::new();
        let a = graph.add_variable(2);
        graph.add_factor(FactorTable::xor(1), &[a]).unwrap();
        let schedule = graph.schedule();

        let mut cache = VersionCache::new();
        let g1 = cache.get_or_build(&graph, &schedule, 3).unwrap();
        let g2 = cache.get_or_build(&graph, &schedule, 3).unwrap();
        assert!(Arc::ptr_eq(&g1, &g2));
        assert_eq!(cache.builds(), 1);
    }

    #[test]
    pub fn cache_rebuild_test() {
        let mut graph = FactorGraph::new();
        let a = graph.add_variable(2);
        graph.add_factor(FactorTable::xor(1), &[a]).unwrap();
        let schedule = graph.schedule();

        let mut cache = VersionCache::new();
        let g1 = cache.get_or_build(&graph, &schedule, 3).unwrap();

        // iteration count
        let g2 = cache.get_or_build(&graph, &schedule, 4).unwrap();
        assert!(!Arc::ptr_eq(&g1, &g2));
        assert_eq!(g2.len(), g1.len() / 3 * 4);

        // schedule version
        let custom = Schedule::builder().edge(a, EdgeId(0)).build();
        let g3 = cache.get_or_build(&graph, &custom, 4).unwrap();
        assert!(!Arc::ptr_eq(&g2, &g3));
        assert_eq!(g3.len(), 4);

        // topology version
        graph.add_variable(2);
        let g4 = cache.get_or_build(&graph, &custom, 4).unwrap();
        assert!(!Arc::ptr_eq(&g3, &g4));

        // explicit invalidation
        cache.invalidate();
        assert!(cache.key().is_none());
        let g5 = cache.get_or_build(&graph, &custom, 4).unwrap();
        assert!(!Arc::ptr_eq(&g4, &g5));
        assert_eq!(cache.builds(), 5);
    }

    #[test]
    pub fn failed_build_not_cached_test() {
        let graph = FactorGraph::new();
        let schedule = Schedule::builder().build();
        let mut cache = VersionCache::new();

        assert_eq!(
            cache.get_or_build(&graph, &schedule, 0).unwrap_err(),
            BuildError::ZeroIterations
        );
        assert!(cache.key().is_none());
        assert_eq!(cache.builds(), 0);
    }
}
