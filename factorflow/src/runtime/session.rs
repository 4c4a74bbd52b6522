use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crossbeam::channel::{unbounded, Receiver, Sender};

use crate::api::error::ExecuteError;
use crate::dag::{DependencyGraph, TaskId};
use crate::runtime::completion::CompletionSignal;

#[atomic_enum]
#[derive(PartialEq)]
pub enum TaskStatus {
    Pending = 0,
    Running = 1,
    Completed = 2,
}

#[atomic_enum]
#[derive(PartialEq)]
pub enum SessionStatus {
    Running = 0,
    /// every task completed
    Completed = 1,
    /// an error was recorded, no new task is started
    Failed = 2,
}

#[derive(Debug)]
pub(crate) enum WorkItem {
    Task(TaskId),
    Stop,
}

/// Mutable state of one `execute` call over an immutable dependency graph.
pub(crate) struct ExecutionSession<'a> {
    graph: &'a DependencyGraph,
    sender: Sender<WorkItem>,
    receiver: Receiver<WorkItem>,
    unmet: Vec<AtomicUsize>,
    status: Vec<AtomicTaskStatus>,
    remaining: AtomicUsize,
    session_status: AtomicSessionStatus,
    error: Mutex<Option<ExecuteError>>,
    completion: CompletionSignal,
}

impl<'a> ExecutionSession<'a> {
    pub fn new(graph: &'a DependencyGraph) -> Self {
        let (sender, receiver) = unbounded();
        let unmet = graph
            .dependency_counts()
            .iter()
            .map(|count| AtomicUsize::new(*count))
            .collect();
        let status = (0..graph.len())
            .map(|_| AtomicTaskStatus::new(TaskStatus::Pending))
            .collect();

        ExecutionSession {
            graph,
            sender,
            receiver,
            unmet,
            status,
            remaining: AtomicUsize::new(graph.len()),
            session_status: AtomicSessionStatus::new(SessionStatus::Running),
            error: Mutex::new(None),
            completion: CompletionSignal::new(),
        }
    }

    pub fn graph(&self) -> &'a DependencyGraph {
        self.graph
    }

    /// Queue every root. Returns the initial queue length.
    pub fn seed_roots(&self) -> usize {
        for root in self.graph.roots() {
            self.push(*root);
        }
        self.receiver.len()
    }

    fn push(&self, task: TaskId) {
        // the receiver lives as long as the session
        if self.sender.send(WorkItem::Task(task)).is_err() {
            error!("work queue closed, task {} dropped", task);
        }
    }

    /// Blocks until a task or a stop request arrives.
    pub fn pop(&self) -> Option<TaskId> {
        match self.receiver.recv() {
            Ok(WorkItem::Task(task)) => Some(task),
            Ok(WorkItem::Stop) | Err(_) => None,
        }
    }

    /// Move `task` from pending to running. Fails if it was ever started.
    pub fn claim(&self, task: TaskId) -> bool {
        self.status[task.index()]
            .compare_exchange(
                TaskStatus::Pending,
                TaskStatus::Running,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Release the dependents of `task`; the last task to finish signals completion.
    pub fn complete(&self, task: TaskId) {
        self.status[task.index()].store(TaskStatus::Completed, Ordering::Release);

        for dependent in self.graph.dependents(task) {
            if self.unmet[dependent.index()].fetch_sub(1, Ordering::AcqRel) == 1 {
                self.push(dependent);
            }
        }

        if self.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
            let completed = self.session_status.compare_exchange(
                SessionStatus::Running,
                SessionStatus::Completed,
                Ordering::AcqRel,
                Ordering::Acquire,
            );
            if completed.is_ok() {
                self.completion.notify();
            }
        }
    }

    /// Record `error` if it is the first one and stop dispatching.
    pub fn fail(&self, error: ExecuteError) {
        {
            let mut slot = self.error.lock().unwrap();
            if slot.is_none() {
                error!("execution failed: {}", error);
                *slot = Some(error);
            } else {
                debug!("execution already failed, dropping: {}", error);
            }
        }

        let failed = self.session_status.compare_exchange(
            SessionStatus::Running,
            SessionStatus::Failed,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        if failed.is_ok() {
            self.completion.notify();
        }
    }

    pub fn is_running(&self) -> bool {
        self.session_status.load(Ordering::Acquire) == SessionStatus::Running
    }

    pub fn status(&self) -> SessionStatus {
        self.session_status.load(Ordering::Acquire)
    }

    pub fn task_status(&self, task: TaskId) -> TaskStatus {
        self.status[task.index()].load(Ordering::Acquire)
    }

    pub fn completed(&self) -> usize {
        self.graph.len() - self.remaining.load(Ordering::Acquire)
    }

    pub fn wait(&self) {
        self.completion.wait();
    }

    /// One stop request per worker, queued behind any pending task.
    pub fn stop_workers(&self, workers: usize) {
        for _ in 0..workers {
            if self.sender.send(WorkItem::Stop).is_err() {
                break;
            }
        }
    }

    pub fn take_error(&self) -> Option<ExecuteError> {
        self.error.lock().unwrap().take()
    }
}

#[cfg(test)]
mod tests {
    use crate::api::error::{ExecuteError, UpdateError};
    use crate::dag::{DependencyGraph, TaskId};
    use crate::model::{EdgeId, FactorGraph, FactorTable};
    use crate::runtime::session::{ExecutionSession, SessionStatus, TaskStatus};
    use crate::schedule::Schedule;

    fn chain_graph() -> DependencyGraph {
        let mut graph = FactorGraph::new();
        let a = graph.add_variable(2);
        graph.add_factor(FactorTable::xor(1), &[a]).unwrap();
        let schedule = Schedule::builder()
            .edge(a, EdgeId(0))
            .edge(a, EdgeId(0))
            .build();
        DependencyGraph::build(&graph, &schedule, 1).unwrap()
    }

    #[test]
    pub fn session_single_thread_test() {
        let dg = chain_graph();
        let session = ExecutionSession::new(&dg);
        assert_eq!(session.seed_roots(), 1);

        let t0 = session.pop().unwrap();
        assert_eq!(t0, TaskId(0));
        assert!(session.claim(t0));
        assert!(!session.claim(t0));
        assert_eq!(session.task_status(t0), TaskStatus::Running);
        session.complete(t0);
        assert_eq!(session.task_status(t0), TaskStatus::Completed);

        let t1 = session.pop().unwrap();
        assert_eq!(t1, TaskId(1));
        assert!(session.claim(t1));
        session.complete(t1);

        assert_eq!(session.completed(), 2);
        assert_eq!(session.status(), SessionStatus::Completed);
        session.wait();

        session.stop_workers(1);
        assert!(session.pop().is_none());
    }

    #[test]
    pub fn first_error_wins_test() {
        let dg = chain_graph();
        let session = ExecutionSession::new(&dg);
        session.fail(ExecuteError::Update {
            task: TaskId(0),
            iteration: 0,
            source: UpdateError::Failed("first".to_string()),
        });
        session.fail(ExecuteError::Panicked {
            task: TaskId(1),
            message: "second".to_string(),
        });

        assert!(!session.is_running());
        assert_eq!(session.status(), SessionStatus::Failed);
        session.wait();

        let e = session.take_error().unwrap();
        assert_eq!(e.task(), Some(TaskId(0)));
        assert!(session.take_error().is_none());
    }
}
