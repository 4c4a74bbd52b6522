//! Arena factor graph.
//!
//! Nodes, edges and sub-graphs live in flat vectors and reference each other
//! by index; a connection is a pair of indices, never a pointer back.

use std::sync::Arc;

use crate::schedule::{Schedule, SchedulerKind};

pub mod factor_graph;
pub mod factor_table;

pub use factor_graph::{FactorGraph, Node, NodeKind, SubGraph};
pub use factor_table::FactorTable;

#[derive(
    Copy, Clone, Serialize, Deserialize, Debug, Eq, PartialEq, Hash, Default, Ord, PartialOrd,
)]
pub struct NodeId(pub u32);

impl NodeId {
    #[inline]
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(
    Copy, Clone, Serialize, Deserialize, Debug, Eq, PartialEq, Hash, Default, Ord, PartialOrd,
)]
pub struct EdgeId(pub u32);

impl EdgeId {
    #[inline]
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for EdgeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of a (sub-)graph. The root graph is always `GraphId::ROOT`.
#[derive(
    Copy, Clone, Serialize, Deserialize, Debug, Eq, PartialEq, Hash, Default, Ord, PartialOrd,
)]
pub struct GraphId(pub u32);

impl GraphId {
    pub const ROOT: GraphId = GraphId(0);

    #[inline]
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for GraphId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One side of an edge as seen from a node: the edge itself and the node at
/// its other end.
///
/// ```text
///                  ┌──────────────────┐
///      node ──────►│  edge (2 slots)  ├────► sibling
///                  └──────────────────┘
/// ```
#[derive(Copy, Clone, Serialize, Deserialize, Debug, Eq, PartialEq, Hash)]
pub struct Port {
    pub edge: EdgeId,
    pub sibling: NodeId,
}

/// What the dependency graph builder needs to know about a graph.
pub trait Topology {
    /// Monotonic counter bumped on every structural change.
    fn topology_version(&self) -> u64;

    /// Ports of `node` in port order, `None` if the node does not exist.
    fn ports(&self, node: NodeId) -> Option<&[Port]>;

    fn contains_node(&self, node: NodeId) -> bool {
        self.ports(node).is_some()
    }

    /// The schedule a `SubGraph` entry delegates to. `inherited` is the
    /// scheduler of the delegating schedule, used when neither the sub-graph
    /// nor its ancestors choose one.
    fn sub_graph_schedule(
        &self,
        graph: GraphId,
        inherited: Option<SchedulerKind>,
    ) -> Option<Arc<Schedule>>;
}
