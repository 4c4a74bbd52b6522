//! Dependency graph builder.
//! schedule -> flattened entries -> unrolled tasks -> task DAG

use std::fmt::{Display, Formatter};

use crate::schedule::PrimitiveEntry;

pub mod cache;
pub mod dependency_graph;
pub mod footprint;
pub(crate) mod utils;

pub use cache::{CacheKey, VersionCache};
pub use dependency_graph::DependencyGraph;
pub use footprint::{Footprint, Resource};

/// Dense task index: `iteration * entries_per_iteration + position`.
#[derive(
    Copy, Clone, Serialize, Deserialize, Debug, Eq, PartialEq, Hash, Default, Ord, PartialOrd,
)]
pub struct TaskId(pub u32);

impl TaskId {
    #[inline]
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl Display for TaskId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One schedule entry unrolled for one iteration.
#[derive(Clone, Serialize, Deserialize, Debug, Eq, PartialEq)]
pub struct TaskNode {
    pub(crate) task_id: TaskId,
    pub(crate) iteration: usize,
    pub(crate) position: usize,
    pub(crate) entry: PrimitiveEntry,
}

impl TaskNode {
    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    pub fn iteration(&self) -> usize {
        self.iteration
    }

    /// Position inside the flattened schedule.
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn entry(&self) -> &PrimitiveEntry {
        &self.entry
    }
}

/// The hazard that forces one task to complete before another starts.
#[derive(Copy, Clone, Serialize, Deserialize, Debug, Eq, PartialEq, Hash)]
pub enum DependencyEdge {
    /// the target reads a value the source wrote
    ReadAfterWrite,
    /// the target overwrites a value the source read
    WriteAfterRead,
    /// both write the same value
    WriteAfterWrite,
}
