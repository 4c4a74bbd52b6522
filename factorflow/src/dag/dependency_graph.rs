use std::collections::{BTreeMap, HashMap};
use std::ops::Index;
use std::time::Instant;

use daggy::{Dag, NodeIndex, Walker};

use crate::api::error::BuildError;
use crate::dag::utils::JsonDag;
use crate::dag::{DependencyEdge, Footprint, Resource, TaskId, TaskNode};
use crate::model::Topology;
use crate::schedule::Schedule;

/// The schedule unrolled over `iterations` and linked by data hazards.
///
/// Immutable once built: per-execution counters live in the execution session,
/// so one graph can be executed any number of times.
#[derive(Debug)]
pub struct DependencyGraph {
    dag: Dag<TaskNode, DependencyEdge>,
    roots: Vec<TaskId>,
    dependency_counts: Vec<usize>,
    iterations: usize,
    entries_per_iteration: usize,
}

impl DependencyGraph {
    pub fn build<T>(
        topology: &T,
        schedule: &Schedule,
        iterations: usize,
    ) -> Result<Self, BuildError>
    where
        T: Topology + ?Sized,
    {
        if iterations == 0 {
            return Err(BuildError::ZeroIterations);
        }

        let begin = Instant::now();
        let entries = schedule.flatten(topology)?;
        let footprints = entries
            .iter()
            .map(|entry| Footprint::of(topology, entry))
            .collect::<Result<Vec<Footprint>, BuildError>>()?;

        let len = entries.len() * iterations;
        let mut dag = Dag::with_capacity(len, len);
        let mut dependency_counts = Vec::with_capacity(len);
        let mut edges = Vec::new();
        let mut tracker = HazardTracker::default();

        for iteration in 0..iterations {
            for (position, entry) in entries.iter().enumerate() {
                let task_id = TaskId(dag.node_count() as u32);
                dag.add_node(TaskNode {
                    task_id,
                    iteration,
                    position,
                    entry: entry.clone(),
                });

                let dependencies = tracker.record(task_id, &footprints[position]);
                dependency_counts.push(dependencies.len());
                for (dependency, kind) in dependencies {
                    edges.push((
                        NodeIndex::new(dependency.index()),
                        NodeIndex::new(task_id.index()),
                        kind,
                    ));
                }
            }
        }

        dag.add_edges(edges).map_err(|_| BuildError::WouldCycle)?;

        let roots = dependency_counts
            .iter()
            .enumerate()
            .filter(|(_, count)| **count == 0)
            .map(|(index, _)| TaskId(index as u32))
            .collect();

        debug!(
            "dependency graph built, tasks={}, edges={}, iterations={}, elapsed={:?}",
            dag.node_count(),
            dag.edge_count(),
            iterations,
            begin.elapsed()
        );

        Ok(DependencyGraph {
            dag,
            roots,
            dependency_counts,
            iterations,
            entries_per_iteration: entries.len(),
        })
    }

    /// Number of tasks.
    pub fn len(&self) -> usize {
        self.dag.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.dag.node_count() == 0
    }

    pub fn edge_count(&self) -> usize {
        self.dag.edge_count()
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    pub fn entries_per_iteration(&self) -> usize {
        self.entries_per_iteration
    }

    /// Tasks without dependencies, in task order.
    pub fn roots(&self) -> &[TaskId] {
        self.roots.as_slice()
    }

    pub fn dependency_count(&self, task: TaskId) -> usize {
        self.dependency_counts[task.index()]
    }

    pub fn dependency_counts(&self) -> &[usize] {
        self.dependency_counts.as_slice()
    }

    pub fn task(&self, task: TaskId) -> &TaskNode {
        self.dag.index(NodeIndex::new(task.index()))
    }

    pub fn tasks(&self) -> impl Iterator<Item = &TaskNode> {
        self.dag.raw_nodes().iter().map(|node| &node.weight)
    }

    /// Tasks that cannot start before `task` completes.
    pub fn dependents(&self, task: TaskId) -> impl Iterator<Item = TaskId> + '_ {
        self.dag
            .children(NodeIndex::new(task.index()))
            .iter(&self.dag)
            .map(|(_edge, node)| TaskId(node.index() as u32))
    }

    /// Tasks `task` waits on, with the hazard behind each wait.
    pub fn dependencies(&self, task: TaskId) -> Vec<(TaskId, DependencyEdge)> {
        let mut dependencies: Vec<(TaskId, DependencyEdge)> = self
            .dag
            .parents(NodeIndex::new(task.index()))
            .iter(&self.dag)
            .map(|(edge, node)| (TaskId(node.index() as u32), *self.dag.index(edge)))
            .collect();
        dependencies.sort_by_key(|(task, _)| *task);
        dependencies
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        let json_dag = JsonDag::from(&self.dag);
        serde_json::to_string(&json_dag)
    }
}

#[derive(Debug, Default)]
struct AccessLog {
    last_writer: Option<TaskId>,
    readers: Vec<TaskId>,
}

/// Walks tasks in unrolled order and reports, per task, the earlier tasks it
/// conflicts with. Ties resolve to the most recent access in that order.
#[derive(Debug, Default)]
struct HazardTracker {
    resources: HashMap<Resource, AccessLog>,
}

impl HazardTracker {
    fn record(&mut self, task: TaskId, footprint: &Footprint) -> BTreeMap<TaskId, DependencyEdge> {
        let mut dependencies = BTreeMap::new();

        for resource in footprint.reads() {
            if let Some(log) = self.resources.get(resource) {
                if let Some(writer) = log.last_writer {
                    add_dependency(&mut dependencies, writer, DependencyEdge::ReadAfterWrite);
                }
            }
        }

        for resource in footprint.writes() {
            if let Some(log) = self.resources.get(resource) {
                if let Some(writer) = log.last_writer {
                    add_dependency(&mut dependencies, writer, DependencyEdge::WriteAfterWrite);
                }
                for reader in &log.readers {
                    add_dependency(&mut dependencies, *reader, DependencyEdge::WriteAfterRead);
                }
            }
        }
        dependencies.remove(&task);

        for resource in footprint.writes() {
            let log = self.resources.entry(*resource).or_default();
            log.last_writer = Some(task);
            log.readers.clear();
        }
        for resource in footprint.reads() {
            if !footprint.is_write(resource) {
                self.resources.entry(*resource).or_default().readers.push(task);
            }
        }

        dependencies
    }
}

fn add_dependency(
    dependencies: &mut BTreeMap<TaskId, DependencyEdge>,
    task: TaskId,
    kind: DependencyEdge,
) {
    let current = dependencies.entry(task).or_insert(kind);
    if kind == DependencyEdge::ReadAfterWrite {
        *current = kind;
    }
}
