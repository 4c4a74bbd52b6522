use thiserror::Error;

use crate::dag::TaskId;
use crate::model::{EdgeId, GraphId, NodeId};

/// Errors raised while assembling a factor graph.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("node {0} is not in the graph")]
    UnknownNode(NodeId),
    #[error("node {0} is not a variable")]
    NotAVariable(NodeId),
    #[error("graph {0} is not in the graph")]
    UnknownGraph(GraphId),
    #[error("factor table expects {expected} weights, got {actual}")]
    TableSize { expected: usize, actual: usize },
    #[error("factor table has {dims} dimensions but {variables} variables were given")]
    ArityMismatch { dims: usize, variables: usize },
    #[error("variable {variable} has domain size {domain}, factor table dimension is {dim}")]
    DomainMismatch {
        variable: NodeId,
        domain: usize,
        dim: usize,
    },
    #[error("invalid weights: {0}")]
    InvalidWeights(String),
}

/// Errors raised while flattening a schedule and building its dependency graph.
/// No partial graph is ever cached when one of these is returned.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BuildError {
    #[error("iteration count must be at least 1")]
    ZeroIterations,
    #[error("schedule entry references unknown node {0}")]
    UnknownNode(NodeId),
    #[error("schedule entry references edge {edge}, which is not a port of node {node}")]
    UnknownPort { node: NodeId, edge: EdgeId },
    #[error("block update contains no nodes")]
    EmptyBlock,
    #[error("nested schedule (version {0}) contains itself")]
    NestedScheduleCycle(u64),
    #[error("graph {0} has no schedule to delegate to")]
    UnresolvedSubGraph(GraphId),
    #[error("dependency graph would cycle")]
    WouldCycle,
}

/// Expected, recoverable failures reported by an update operation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum UpdateError {
    #[error("{solver} solver does not support `{entry}`")]
    Unsupported { solver: &'static str, entry: String },
    #[error("numerical error: {0}")]
    Numerical(String),
    #[error("{0}")]
    Failed(String),
}

/// The single fatal error of an execution session.
#[derive(Error, Debug)]
pub enum ExecuteError {
    #[error("task {task} (iteration {iteration}) failed: {source}")]
    Update {
        task: TaskId,
        iteration: usize,
        #[source]
        source: UpdateError,
    },
    #[error("task {task} panicked: {message}")]
    Panicked { task: TaskId, message: String },
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}

impl ExecuteError {
    pub fn task(&self) -> Option<TaskId> {
        match self {
            ExecuteError::Update { task, .. } => Some(*task),
            ExecuteError::Panicked { task, .. } => Some(*task),
            ExecuteError::Spawn(_) => None,
        }
    }
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Build(#[from] BuildError),
    #[error(transparent)]
    Execute(#[from] ExecuteError),
}

#[derive(Error, Debug)]
pub enum SolverError {
    #[error("solver is not initialized for this graph")]
    NotInitialized,
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Engine(#[from] EngineError),
}
