use std::convert::TryFrom;
use std::sync::Arc;
use std::time::Instant;

use crate::api::error::{BuildError, EngineError, ExecuteError};
use crate::api::properties::{EngineProperties, Properties, ITERATIONS, LOG_LEVEL, NUM_WORKERS, SEED};
use crate::dag::{DependencyGraph, VersionCache};
use crate::metrics;
use crate::model::Topology;
use crate::runtime::Executor;
use crate::schedule::Schedule;
use crate::solvers::UpdateOperation;

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// `0` uses one worker per cpu.
    pub num_workers: usize,
    pub iterations: usize,
    pub seed: u64,
    pub log_level: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            num_workers: 0,
            iterations: 1,
            seed: 0,
            log_level: "INFO".to_string(),
        }
    }
}

impl EngineConfig {
    /// Resolved worker count.
    pub fn workers(&self) -> usize {
        if self.num_workers == 0 {
            num_cpus::get()
        } else {
            self.num_workers
        }
    }
}

impl TryFrom<&Properties> for EngineConfig {
    type Error = anyhow::Error;

    fn try_from(properties: &Properties) -> Result<Self, Self::Error> {
        let mut config = EngineConfig::default();
        if properties.contains(NUM_WORKERS) {
            config.num_workers = properties.get_num_workers()?;
        }
        if properties.contains(ITERATIONS) {
            config.iterations = properties.get_iterations()?;
        }
        if properties.contains(SEED) {
            config.seed = properties.get_seed()?;
        }
        if properties.contains(LOG_LEVEL) {
            config.log_level = properties.get_log_level()?;
        }
        Ok(config)
    }
}

/// Builds dependency graphs on demand, caches the latest one and runs it on
/// the worker pool.
#[derive(Debug)]
pub struct Engine {
    config: EngineConfig,
    cache: VersionCache,
    executor: Executor,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        let executor = Executor::new(config.workers(), config.seed);
        Engine {
            config,
            cache: VersionCache::new(),
            executor,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cache(&self) -> &VersionCache {
        &self.cache
    }

    pub fn executor(&self) -> &Executor {
        &self.executor
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
        self.cache.get_or_build(topology, schedule, iterations)
    }

    pub fn execute<U>(&self, graph: &DependencyGraph, update: &U) -> Result<(), ExecuteError>
    where
        U: UpdateOperation + ?Sized,
    {
        self.executor.execute(graph, update)
    }

    /// Run `iterations` passes of `schedule` over `topology`, reusing the
    /// cached dependency graph when nothing it was built from has changed.
    pub fn iterate<T, U>(
        &mut self,
        topology: &T,
        schedule: &Schedule,
        update: &U,
        iterations: usize,
    ) -> Result<(), EngineError>
    where
        T: Topology + ?Sized,
        U: UpdateOperation + ?Sized,
    {
        let begin = Instant::now();
        let graph = self.get_or_build(topology, schedule, iterations)?;
        let result = self.execute(graph.as_ref(), update);
        metrics::flush();
        result.map_err(|e| {
            error!("iterate failed: {}", e);
            e
        })?;

        debug!(
            "iterate finish, iterations={}, tasks={}, elapsed={}ms",
            iterations,
            graph.len(),
            begin.elapsed().as_millis()
        );
        Ok(())
    }

    /// Drop the cached dependency graph regardless of versions.
    pub fn invalidate(&mut self) {
        self.cache.invalidate();
    }
}
