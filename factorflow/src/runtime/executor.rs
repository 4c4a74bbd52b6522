use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread::Scope;
use std::time::Instant;

use crate::api::error::ExecuteError;
use crate::dag::DependencyGraph;
use crate::metrics::global_metrics;
use crate::runtime::context::TaskContext;
use crate::runtime::session::ExecutionSession;
use crate::solvers::UpdateOperation;
use crate::utils::panic::panic_message;
use crate::utils::thread::spawn_scoped;

/// Outcome of a finished session.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ExecutionReport {
    pub tasks: usize,
    pub completed: usize,
    /// Ready tasks queued before any worker started.
    pub initial_queue_len: usize,
    pub workers: usize,
}

/// Starts the worker threads of a session.
pub(crate) trait WorkerSpawner {
    fn spawn<'scope, 'env>(
        &mut self,
        scope: &'scope Scope<'scope, 'env>,
        name: &str,
        worker: Box<dyn FnOnce() + Send + 'scope>,
    ) -> std::io::Result<()>;
}

/// Named scoped threads, `FF-Worker-{index}`.
struct NamedWorkers;

impl WorkerSpawner for NamedWorkers {
    fn spawn<'scope, 'env>(
        &mut self,
        scope: &'scope Scope<'scope, 'env>,
        name: &str,
        worker: Box<dyn FnOnce() + Send + 'scope>,
    ) -> std::io::Result<()> {
        spawn_scoped(scope, name, worker).map(|_| ())
    }
}

/// Runs every task of a dependency graph exactly once on a fixed pool of
/// worker threads, started per call and joined before returning.
#[derive(Clone, Debug)]
pub struct Executor {
    num_workers: usize,
    seed: u64,
}

impl Executor {
    pub fn new(num_workers: usize, seed: u64) -> Self {
        Executor {
            num_workers: num_workers.max(1),
            seed,
        }
    }

    pub fn num_workers(&self) -> usize {
        self.num_workers
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn execute<U>(&self, graph: &DependencyGraph, update: &U) -> Result<(), ExecuteError>
    where
        U: UpdateOperation + ?Sized,
    {
        self.execute_with_report(graph, update).map(|_| ())
    }

    /// Blocks until every task completed or the first error was recorded.
    /// On error the state written by already completed tasks is kept.
    pub fn execute_with_report<U>(
        &self,
        graph: &DependencyGraph,
        update: &U,
    ) -> Result<ExecutionReport, ExecuteError>
    where
        U: UpdateOperation + ?Sized,
    {
        self.execute_with_spawner(graph, update, &mut NamedWorkers)
    }

    /// A worker that cannot be started fails the session with
    /// `ExecuteError::Spawn`; the workers already started are stopped.
    pub(crate) fn execute_with_spawner<U, S>(
        &self,
        graph: &DependencyGraph,
        update: &U,
        spawner: &mut S,
    ) -> Result<ExecutionReport, ExecuteError>
    where
        U: UpdateOperation + ?Sized,
        S: WorkerSpawner,
    {
        if graph.is_empty() {
            return Ok(ExecutionReport::default());
        }

        let begin = Instant::now();
        let session = ExecutionSession::new(graph);
        let initial_queue_len = session.seed_roots();
        let workers = self.num_workers.min(graph.len());
        global_metrics::set_workers(workers);
        info!(
            "execution session start, tasks={}, roots={}, workers={}",
            graph.len(),
            initial_queue_len,
            workers
        );

        let seed = self.seed;
        std::thread::scope(|s| {
            let mut spawned = 0;
            for index in 0..workers {
                let session = &session;
                let name = format!("FF-Worker-{}", index);
                let worker = Box::new(move || worker_loop(index, session, update, seed));
                match spawner.spawn(s, name.as_str(), worker) {
                    Ok(_) => spawned += 1,
                    Err(e) => {
                        session.fail(ExecuteError::Spawn(e));
                        break;
                    }
                }
            }

            session.wait();
            session.stop_workers(spawned);
        });

        let completed = session.completed();
        if let Some(e) = session.take_error() {
            warn!(
                "execution session failed, completed={}/{}, elapsed={:?}",
                completed,
                graph.len(),
                begin.elapsed()
            );
            return Err(e);
        }

        info!(
            "execution session finish, tasks={}, elapsed={:?}",
            completed,
            begin.elapsed()
        );
        Ok(ExecutionReport {
            tasks: graph.len(),
            completed,
            initial_queue_len,
            workers,
        })
    }
}

fn worker_loop<U>(index: usize, session: &ExecutionSession, update: &U, seed: u64)
where
    U: UpdateOperation + ?Sized,
{
    debug!("worker {} start", index);
    let mut executed = 0;

    while let Some(task) = session.pop() {
        if !session.is_running() {
            continue;
        }
        if !session.claim(task) {
            error!("task {} dispatched twice, skipped", task);
            continue;
        }

        let node = session.graph().task(task);
        let context = TaskContext::of(node, seed);
        let result = catch_unwind(AssertUnwindSafe(|| update.apply(node.entry(), &context)));
        match result {
            Ok(Ok(())) => {
                executed += 1;
                global_metrics::task_completed();
                session.complete(task);
            }
            Ok(Err(e)) => {
                global_metrics::task_failed();
                session.fail(ExecuteError::Update {
                    task,
                    iteration: node.iteration(),
                    source: e,
                });
            }
            Err(payload) => {
                global_metrics::task_failed();
                session.fail(ExecuteError::Panicked {
                    task,
                    message: panic_message(payload.as_ref()),
                });
            }
        }
    }

    debug!("worker {} exit, executed={}", index, executed);
}
