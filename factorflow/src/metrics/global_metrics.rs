use crate::metrics::metric::{register_counter, register_gauge, Counter, Gauge};

lazy_static! {
    static ref GRAPH_BUILD: Counter = register_counter("DependencyGraph.Build", vec![]);
    static ref CACHE_HIT: Counter = register_counter("DependencyGraph.CacheHit", vec![]);
    static ref TASK_COMPLETED: Counter = register_counter("Executor.TaskCompleted", vec![]);
    static ref TASK_FAILED: Counter = register_counter("Executor.TaskFailed", vec![]);
    static ref WORKERS: Gauge = register_gauge("Executor.Workers", vec![]);
}

pub(crate) fn graph_built() {
    GRAPH_BUILD.fetch_add(1);
}

pub(crate) fn cache_hit() {
    CACHE_HIT.fetch_add(1);
}

pub(crate) fn task_completed() {
    TASK_COMPLETED.fetch_add(1);
}

pub(crate) fn task_failed() {
    TASK_FAILED.fetch_add(1);
}

pub(crate) fn set_workers(workers: usize) {
    WORKERS.store(workers as i64);
}

pub fn graph_builds() -> u64 {
    GRAPH_BUILD.load()
}

pub fn cache_hits() -> u64 {
    CACHE_HIT.load()
}

pub fn tasks_completed() -> u64 {
    TASK_COMPLETED.load()
}

pub fn tasks_failed() -> u64 {
    TASK_FAILED.load()
}
