//! Schedule model.
//!
//! A schedule is an immutable, ordered list of update entries for one pass
//! over a graph. Nested schedules and sub-graph delegations are spliced in
//! place by [`Schedule::flatten`] before the dependency graph is built.

use std::collections::HashSet;
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::api::error::BuildError;
use crate::model::{EdgeId, GraphId, NodeId, Topology};

pub mod scheduler;

pub use scheduler::{Scheduler, SchedulerKind};

static SCHEDULE_VERSION: AtomicU64 = AtomicU64::new(1);

fn next_version() -> u64 {
    SCHEDULE_VERSION.fetch_add(1, Ordering::SeqCst)
}

/// An entry that maps onto exactly one task per iteration.
#[derive(Clone, Serialize, Deserialize, Debug, Eq, PartialEq, Hash)]
pub enum PrimitiveEntry {
    /// Recompute every output of a node.
    Node(NodeId),
    /// Recompute the single outgoing value of `node` on `edge`.
    Edge { node: NodeId, edge: EdgeId },
    /// Jointly update a fixed set of nodes, in the given order.
    Block(Vec<NodeId>),
}

impl Display for PrimitiveEntry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            PrimitiveEntry::Node(node) => write!(f, "NodeUpdate({})", node),
            PrimitiveEntry::Edge { node, edge } => write!(f, "EdgeUpdate({}, {})", node, edge),
            PrimitiveEntry::Block(nodes) => {
                let nodes: Vec<String> = nodes.iter().map(|n| n.to_string()).collect();
                write!(f, "BlockUpdate([{}])", nodes.join(", "))
            }
        }
    }
}

#[derive(Clone, Debug)]
pub enum ScheduleEntry {
    Node(NodeId),
    Edge { node: NodeId, edge: EdgeId },
    Block(Vec<NodeId>),
    /// Run another schedule as a unit.
    Nested(Arc<Schedule>),
    /// Delegate to the schedule of a nested graph, resolved at flatten time.
    SubGraph(GraphId),
}

#[derive(Clone, Debug)]
pub struct Schedule {
    version: u64,
    entries: Vec<ScheduleEntry>,
    scheduler: Option<SchedulerKind>,
}

impl Schedule {
    pub fn new(entries: Vec<ScheduleEntry>) -> Self {
        Schedule {
            version: next_version(),
            entries,
            scheduler: None,
        }
    }

    /// A schedule produced by `scheduler`. Sub-graphs it delegates to that
    /// choose no scheduler of their own are built with the same kind.
    pub fn with_scheduler(entries: Vec<ScheduleEntry>, scheduler: SchedulerKind) -> Self {
        Schedule {
            version: next_version(),
            entries,
            scheduler: Some(scheduler),
        }
    }

    pub fn builder() -> ScheduleBuilder {
        ScheduleBuilder::new()
    }

    /// Process-wide monotonic tag, unique per built schedule.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// The scheduler that built this schedule, `None` for custom schedules.
    pub fn scheduler(&self) -> Option<SchedulerKind> {
        self.scheduler
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ScheduleEntry> {
        self.entries.iter()
    }

    pub fn entries(&self) -> &[ScheduleEntry] {
        self.entries.as_slice()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Splice nested schedules and sub-graph delegations in place and check
    /// every entry against `topology`. The returned order is the total order
    /// used to resolve producer/consumer ties.
    pub fn flatten<T>(&self, topology: &T) -> Result<Vec<PrimitiveEntry>, BuildError>
    where
        T: Topology + ?Sized,
    {
        let mut flattener = Flattener {
            topology,
            versions: Vec::new(),
            graphs: HashSet::new(),
            entries: Vec::new(),
        };
        flattener.visit(self, None)?;
        Ok(flattener.entries)
    }
}

impl<'a> IntoIterator for &'a Schedule {
    type Item = &'a ScheduleEntry;
    type IntoIter = std::slice::Iter<'a, ScheduleEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

struct Flattener<'a, T: ?Sized> {
    topology: &'a T,
    versions: Vec<u64>,
    graphs: HashSet<GraphId>,
    entries: Vec<PrimitiveEntry>,
}

impl<'a, T> Flattener<'a, T>
where
    T: Topology + ?Sized,
{
    fn visit(
        &mut self,
        schedule: &Schedule,
        inherited: Option<SchedulerKind>,
    ) -> Result<(), BuildError> {
        if self.versions.contains(&schedule.version) {
            return Err(BuildError::NestedScheduleCycle(schedule.version));
        }
        self.versions.push(schedule.version);
        let inherited = schedule.scheduler.or(inherited);

        for entry in schedule.iter() {
            match entry {
                ScheduleEntry::Node(node) => {
                    self.check_node(*node)?;
                    self.entries.push(PrimitiveEntry::Node(*node));
                }
                ScheduleEntry::Edge { node, edge } => {
                    self.check_port(*node, *edge)?;
                    self.entries.push(PrimitiveEntry::Edge {
                        node: *node,
                        edge: *edge,
                    });
                }
                ScheduleEntry::Block(nodes) => {
                    if nodes.is_empty() {
                        return Err(BuildError::EmptyBlock);
                    }
                    for node in nodes {
                        self.check_node(*node)?;
                    }
                    self.entries.push(PrimitiveEntry::Block(nodes.clone()));
                }
                ScheduleEntry::Nested(nested) => self.visit(nested.as_ref(), inherited)?,
                ScheduleEntry::SubGraph(graph) => {
                    if !self.graphs.insert(*graph) {
                        return Err(BuildError::NestedScheduleCycle(schedule.version));
                    }
                    let nested = self
                        .topology
                        .sub_graph_schedule(*graph, inherited)
                        .ok_or(BuildError::UnresolvedSubGraph(*graph))?;
                    self.visit(nested.as_ref(), inherited)?;
                    self.graphs.remove(graph);
                }
            }
        }

        self.versions.pop();
        Ok(())
    }

    fn check_node(&self, node: NodeId) -> Result<(), BuildError> {
        if self.topology.contains_node(node) {
            Ok(())
        } else {
            Err(BuildError::UnknownNode(node))
        }
    }

    fn check_port(&self, node: NodeId, edge: EdgeId) -> Result<(), BuildError> {
        let ports = self
            .topology
            .ports(node)
            .ok_or(BuildError::UnknownNode(node))?;
        if ports.iter().any(|port| port.edge == edge) {
            Ok(())
        } else {
            Err(BuildError::UnknownPort { node, edge })
        }
    }
}

/// Collects entries for a custom schedule.
#[derive(Default, Debug)]
pub struct ScheduleBuilder {
    entries: Vec<ScheduleEntry>,
}

impl ScheduleBuilder {
    pub fn new() -> Self {
        ScheduleBuilder {
            entries: Vec::new(),
        }
    }

    pub fn node(mut self, node: NodeId) -> Self {
        self.entries.push(ScheduleEntry::Node(node));
        self
    }

    pub fn edge(mut self, node: NodeId, edge: EdgeId) -> Self {
        self.entries.push(ScheduleEntry::Edge { node, edge });
        self
    }

    pub fn block<I>(mut self, nodes: I) -> Self
    where
        I: IntoIterator<Item = NodeId>,
    {
        self.entries
            .push(ScheduleEntry::Block(nodes.into_iter().collect()));
        self
    }

    pub fn nested(mut self, schedule: Arc<Schedule>) -> Self {
        self.entries.push(ScheduleEntry::Nested(schedule));
        self
    }

    pub fn sub_graph(mut self, graph: GraphId) -> Self {
        self.entries.push(ScheduleEntry::SubGraph(graph));
        self
    }

    pub fn push(&mut self, entry: ScheduleEntry) {
        self.entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn build(self) -> Schedule {
        Schedule::new(self.entries)
    }

    pub fn build_with_scheduler(self, scheduler: SchedulerKind) -> Schedule {
        Schedule::with_scheduler(self.entries, scheduler)
    }
}
