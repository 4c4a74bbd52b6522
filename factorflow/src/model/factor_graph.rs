use std::sync::{Arc, Mutex};

use crate::api::error::ModelError;
use crate::model::{EdgeId, FactorTable, GraphId, NodeId, Port, Topology};
use crate::schedule::scheduler::{Scheduler, SchedulerKind};
use crate::schedule::Schedule;

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub enum NodeKind {
    Variable {
        domain_size: usize,
        /// prior over the domain, normalised
        input: Vec<f64>,
    },
    Factor {
        table: FactorTable,
    },
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct Node {
    pub(crate) id: NodeId,
    pub(crate) graph: GraphId,
    pub(crate) kind: NodeKind,
    pub(crate) ports: Vec<Port>,
}

impl Node {
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// The (sub-)graph owning this node.
    pub fn graph(&self) -> GraphId {
        self.graph
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn ports(&self) -> &[Port] {
        self.ports.as_slice()
    }

    pub fn is_variable(&self) -> bool {
        match self.kind {
            NodeKind::Variable { .. } => true,
            NodeKind::Factor { .. } => false,
        }
    }

    pub fn is_factor(&self) -> bool {
        !self.is_variable()
    }

    /// Position of `edge` among this node's ports.
    pub fn port_index(&self, edge: EdgeId) -> Option<usize> {
        self.ports.iter().position(|port| port.edge == edge)
    }
}

#[derive(Copy, Clone, Serialize, Deserialize, Debug, Eq, PartialEq)]
pub struct Edge {
    pub variable: NodeId,
    pub factor: NodeId,
}

#[derive(Clone, Debug)]
pub struct SubGraph {
    pub(crate) id: GraphId,
    pub(crate) parent: Option<GraphId>,
    pub(crate) variables: Vec<NodeId>,
    pub(crate) factors: Vec<NodeId>,
    pub(crate) children: Vec<GraphId>,
    pub(crate) scheduler: Option<SchedulerKind>,
    pub(crate) schedule: Option<Arc<Schedule>>,
}

impl SubGraph {
    fn new(id: GraphId, parent: Option<GraphId>) -> Self {
        SubGraph {
            id,
            parent,
            variables: Vec::new(),
            factors: Vec::new(),
            children: Vec::new(),
            scheduler: None,
            schedule: None,
        }
    }

    pub fn id(&self) -> GraphId {
        self.id
    }

    pub fn parent(&self) -> Option<GraphId> {
        self.parent
    }

    pub fn variables(&self) -> &[NodeId] {
        self.variables.as_slice()
    }

    pub fn factors(&self) -> &[NodeId] {
        self.factors.as_slice()
    }

    pub fn children(&self) -> &[GraphId] {
        self.children.as_slice()
    }

    pub fn scheduler(&self) -> Option<SchedulerKind> {
        self.scheduler
    }
}

#[derive(Debug)]
struct BuiltSchedule {
    topology_version: u64,
    kind: SchedulerKind,
    schedule: Arc<Schedule>,
}

/// Bipartite graph of variables and factors. Sub-graphs partition the
/// factors (and optionally variables) into a tree rooted at `GraphId::ROOT`.
#[derive(Debug)]
pub struct FactorGraph {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    graphs: Vec<SubGraph>,
    topology_version: u64,
    scheduler: Option<SchedulerKind>,
    schedule: Option<Arc<Schedule>>,
    built_schedule: Mutex<Option<BuiltSchedule>>,
}

impl FactorGraph {
    pub fn new() -> Self {
        FactorGraph {
            nodes: Vec::new(),
            edges: Vec::new(),
            graphs: vec![SubGraph::new(GraphId::ROOT, None)],
            topology_version: 0,
            scheduler: None,
            schedule: None,
            built_schedule: Mutex::new(None),
        }
    }

    pub fn add_variable(&mut self, domain_size: usize) -> NodeId {
        self.add_variable_unchecked(GraphId::ROOT, domain_size)
    }

    pub fn add_variable_in(
        &mut self,
        graph: GraphId,
        domain_size: usize,
    ) -> Result<NodeId, ModelError> {
        self.check_graph(graph)?;
        Ok(self.add_variable_unchecked(graph, domain_size))
    }

    fn add_variable_unchecked(&mut self, graph: GraphId, domain_size: usize) -> NodeId {
        let domain_size = domain_size.max(1);
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            id,
            graph,
            kind: NodeKind::Variable {
                domain_size,
                input: vec![1f64 / domain_size as f64; domain_size],
            },
            ports: Vec::new(),
        });
        self.graphs[graph.index()].variables.push(id);
        self.bump_version();
        id
    }

    pub fn add_factor(
        &mut self,
        table: FactorTable,
        variables: &[NodeId],
    ) -> Result<NodeId, ModelError> {
        self.add_factor_in(GraphId::ROOT, table, variables)
    }

    pub fn add_factor_in(
        &mut self,
        graph: GraphId,
        table: FactorTable,
        variables: &[NodeId],
    ) -> Result<NodeId, ModelError> {
        self.check_graph(graph)?;
        if table.arity() != variables.len() {
            return Err(ModelError::ArityMismatch {
                dims: table.arity(),
                variables: variables.len(),
            });
        }
        for (variable, dim) in variables.iter().zip(table.dims().iter()) {
            let domain = self.domain_size(*variable)?;
            if domain != *dim {
                return Err(ModelError::DomainMismatch {
                    variable: *variable,
                    domain,
                    dim: *dim,
                });
            }
        }

        let factor = NodeId(self.nodes.len() as u32);
        let mut ports = Vec::with_capacity(variables.len());
        for variable in variables {
            let edge = EdgeId(self.edges.len() as u32);
            self.edges.push(Edge {
                variable: *variable,
                factor,
            });
            ports.push(Port {
                edge,
                sibling: *variable,
            });
            self.nodes[variable.index()].ports.push(Port {
                edge,
                sibling: factor,
            });
        }
        self.nodes.push(Node {
            id: factor,
            graph,
            kind: NodeKind::Factor { table },
            ports,
        });
        self.graphs[graph.index()].factors.push(factor);
        self.bump_version();

        Ok(factor)
    }

    pub fn add_sub_graph(&mut self, parent: GraphId) -> Result<GraphId, ModelError> {
        self.check_graph(parent)?;
        let id = GraphId(self.graphs.len() as u32);
        self.graphs.push(SubGraph::new(id, Some(parent)));
        self.graphs[parent.index()].children.push(id);
        self.bump_version();
        Ok(id)
    }

    pub fn set_input(&mut self, variable: NodeId, probabilities: &[f64]) -> Result<(), ModelError> {
        let node = self
            .nodes
            .get_mut(variable.index())
            .ok_or(ModelError::UnknownNode(variable))?;
        match &mut node.kind {
            NodeKind::Variable { domain_size, input } => {
                if probabilities.len() != *domain_size {
                    return Err(ModelError::TableSize {
                        expected: *domain_size,
                        actual: probabilities.len(),
                    });
                }
                let sum: f64 = probabilities.iter().sum();
                if probabilities.iter().any(|p| !p.is_finite() || *p < 0f64) || sum <= 0f64 {
                    return Err(ModelError::InvalidWeights(format!(
                        "input {:?} is not a distribution",
                        probabilities
                    )));
                }
                *input = probabilities.iter().map(|p| p / sum).collect();
                Ok(())
            }
            NodeKind::Factor { .. } => Err(ModelError::NotAVariable(variable)),
        }
    }

    pub fn input(&self, variable: NodeId) -> Result<&[f64], ModelError> {
        match &self.node(variable)?.kind {
            NodeKind::Variable { input, .. } => Ok(input.as_slice()),
            NodeKind::Factor { .. } => Err(ModelError::NotAVariable(variable)),
        }
    }

    pub fn domain_size(&self, variable: NodeId) -> Result<usize, ModelError> {
        match &self.node(variable)?.kind {
            NodeKind::Variable { domain_size, .. } => Ok(*domain_size),
            NodeKind::Factor { .. } => Err(ModelError::NotAVariable(variable)),
        }
    }

    /// Scheduler used when no custom schedule is attached.
    pub fn set_scheduler(&mut self, kind: SchedulerKind) {
        self.scheduler = Some(kind);
    }

    pub fn scheduler(&self) -> Option<SchedulerKind> {
        self.scheduler
    }

    /// Scheduler for a nested graph. Nested graphs without one inherit the
    /// scheduler of their parent.
    pub fn set_sub_graph_scheduler(
        &mut self,
        graph: GraphId,
        kind: SchedulerKind,
    ) -> Result<(), ModelError> {
        self.check_graph(graph)?;
        self.graphs[graph.index()].scheduler = Some(kind);
        self.bump_version();
        Ok(())
    }

    pub fn set_sub_graph_schedule(
        &mut self,
        graph: GraphId,
        schedule: Schedule,
    ) -> Result<(), ModelError> {
        self.check_graph(graph)?;
        self.graphs[graph.index()].schedule = Some(Arc::new(schedule));
        self.bump_version();
        Ok(())
    }

    /// Attach a custom schedule. The schedule carries its own version, so the
    /// topology version does not move.
    pub fn set_schedule(&mut self, schedule: Schedule) {
        self.schedule = Some(Arc::new(schedule));
    }

    pub fn clear_schedule(&mut self) {
        self.schedule = None;
    }

    /// The attached schedule, or the one built by the graph's scheduler
    /// (sequential when none is set).
    pub fn schedule(&self) -> Arc<Schedule> {
        self.schedule_or(SchedulerKind::Sequential)
    }

    /// Like [`FactorGraph::schedule`] with `default_kind` used when the graph
    /// has no scheduler of its own.
    pub fn schedule_or(&self, default_kind: SchedulerKind) -> Arc<Schedule> {
        if let Some(schedule) = &self.schedule {
            return schedule.clone();
        }

        let kind = self.scheduler.unwrap_or(default_kind);
        let mut built = self.built_schedule.lock().unwrap();
        if let Some(b) = built.as_ref() {
            if b.topology_version == self.topology_version && b.kind == kind {
                return b.schedule.clone();
            }
        }

        let schedule = Arc::new(kind.build_schedule(self, GraphId::ROOT));
        debug!(
            "build {:?} schedule, version={}, entries={}",
            kind,
            schedule.version(),
            schedule.len()
        );
        *built = Some(BuiltSchedule {
            topology_version: self.topology_version,
            kind,
            schedule: schedule.clone(),
        });
        schedule
    }

    pub fn node(&self, node: NodeId) -> Result<&Node, ModelError> {
        self.nodes
            .get(node.index())
            .ok_or(ModelError::UnknownNode(node))
    }

    pub fn nodes(&self) -> &[Node] {
        self.nodes.as_slice()
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn edges(&self) -> &[Edge] {
        self.edges.as_slice()
    }

    pub fn edge(&self, edge: EdgeId) -> Option<&Edge> {
        self.edges.get(edge.index())
    }

    pub fn variables(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(|node| node.is_variable())
    }

    pub fn factors(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(|node| node.is_factor())
    }

    pub fn sub_graph(&self, graph: GraphId) -> Option<&SubGraph> {
        self.graphs.get(graph.index())
    }

    pub fn factors_of(&self, graph: GraphId) -> &[NodeId] {
        self.graphs
            .get(graph.index())
            .map(|g| g.factors())
            .unwrap_or(&[])
    }

    pub fn variables_of(&self, graph: GraphId) -> &[NodeId] {
        self.graphs
            .get(graph.index())
            .map(|g| g.variables())
            .unwrap_or(&[])
    }

    pub fn sub_graphs_of(&self, graph: GraphId) -> &[GraphId] {
        self.graphs
            .get(graph.index())
            .map(|g| g.children())
            .unwrap_or(&[])
    }

    /// Whether `node` is owned by `graph` or by one of its descendants.
    pub fn is_within(&self, node: NodeId, graph: GraphId) -> bool {
        let mut current = match self.nodes.get(node.index()) {
            Some(n) => Some(n.graph),
            None => return false,
        };
        while let Some(g) = current {
            if g == graph {
                return true;
            }
            current = self.graphs[g.index()].parent;
        }
        false
    }

    pub fn topology_version(&self) -> u64 {
        self.topology_version
    }

    fn check_graph(&self, graph: GraphId) -> Result<(), ModelError> {
        if graph.index() < self.graphs.len() {
            Ok(())
        } else {
            Err(ModelError::UnknownGraph(graph))
        }
    }

    fn bump_version(&mut self) {
        self.topology_version += 1;
    }
}

impl Default for FactorGraph {
    fn default() -> Self {
        FactorGraph::new()
    }
}

impl Topology for FactorGraph {
    fn topology_version(&self) -> u64 {
        self.topology_version
    }

    fn ports(&self, node: NodeId) -> Option<&[Port]> {
        self.nodes.get(node.index()).map(|n| n.ports())
    }

    fn sub_graph_schedule(
        &self,
        graph: GraphId,
        inherited: Option<SchedulerKind>,
    ) -> Option<Arc<Schedule>> {
        let sub_graph = self.graphs.get(graph.index())?;
        if let Some(schedule) = &sub_graph.schedule {
            return Some(schedule.clone());
        }

        let kind = self.inherited_scheduler(graph, inherited);
        Some(Arc::new(kind.build_schedule(self, graph)))
    }
}

impl FactorGraph {
    /// The scheduler kind governing `graph`: its own, else the nearest
    /// ancestor's, else `fallback`, else the root scheduler, else sequential.
    pub fn inherited_scheduler(
        &self,
        graph: GraphId,
        fallback: Option<SchedulerKind>,
    ) -> SchedulerKind {
        let mut current = self.graphs.get(graph.index());
        while let Some(g) = current {
            if let Some(kind) = g.scheduler {
                return kind;
            }
            current = g.parent.and_then(|p| self.graphs.get(p.index()));
        }
        fallback
            .or(self.scheduler)
            .unwrap_or(SchedulerKind::Sequential)
    }
}

#[cfg(test)]
mod tests {
    use crate::api::error::ModelError;
    use crate::model::{FactorGraph, FactorTable, GraphId, NodeId, Topology};
    use crate::schedule::SchedulerKind;

    #[test]
    pub fn build_graph_test() {
        let mut graph = FactorGraph::new();
        let a = graph.add_variable(2);
        let b = graph.add_variable(2);
        let f = graph.add_factor(FactorTable::xor(2), &[a, b]).unwrap();

        assert_eq!(graph.num_nodes(), 3);
        assert_eq!(graph.edges().len(), 2);

        let ports = graph.ports(f).unwrap();
        assert_eq!(ports.len(), 2);
        assert_eq!(ports[0].sibling, a);
        assert_eq!(ports[1].sibling, b);

        let a_ports = graph.ports(a).unwrap();
        assert_eq!(a_ports.len(), 1);
        assert_eq!(a_ports[0].sibling, f);
        assert_eq!(a_ports[0].edge, ports[0].edge);

        assert!(graph.ports(NodeId(99)).is_none());
        assert!(!graph.contains_node(NodeId(99)));
    }

    #[test]
    pub fn topology_version_test() {
        let mut graph = FactorGraph::new();
        let v0 = graph.topology_version();
        let a = graph.add_variable(2);
        let v1 = graph.topology_version();
        assert!(v1 > v0);

        graph.set_input(a, &[3f64, 1f64]).unwrap();
        assert_eq!(graph.topology_version(), v1);
        assert_eq!(graph.input(a).unwrap(), &[0.75, 0.25]);

        graph.add_factor(FactorTable::xor(1), &[a]).unwrap();
        assert!(graph.topology_version() > v1);
    }

    #[test]
    pub fn model_errors_test() {
        let mut graph = FactorGraph::new();
        let a = graph.add_variable(2);
        let b = graph.add_variable(3);

        let e = graph.add_factor(FactorTable::xor(2), &[a, b]).unwrap_err();
        assert_eq!(
            e,
            ModelError::DomainMismatch {
                variable: b,
                domain: 3,
                dim: 2
            }
        );
        let e = graph.add_factor(FactorTable::xor(3), &[a, a]).unwrap_err();
        assert_eq!(
            e,
            ModelError::ArityMismatch {
                dims: 3,
                variables: 2
            }
        );
        assert!(graph.set_input(a, &[0f64, 0f64]).is_err());
        assert_eq!(
            graph.add_sub_graph(GraphId(5)).unwrap_err(),
            ModelError::UnknownGraph(GraphId(5))
        );
    }

    #[test]
    pub fn sub_graph_test() {
        let mut graph = FactorGraph::new();
        let a = graph.add_variable(2);
        let sg = graph.add_sub_graph(GraphId::ROOT).unwrap();
        let inner = graph.add_variable_in(sg, 2).unwrap();
        let f = graph
            .add_factor_in(sg, FactorTable::xor(2), &[a, inner])
            .unwrap();

        assert_eq!(graph.sub_graphs_of(GraphId::ROOT), &[sg]);
        assert_eq!(graph.factors_of(sg), &[f]);
        assert!(graph.is_within(f, sg));
        assert!(graph.is_within(f, GraphId::ROOT));
        assert!(!graph.is_within(a, sg));
        assert!(graph.sub_graph_schedule(sg, None).is_some());
        assert!(graph.sub_graph_schedule(GraphId(9), None).is_none());

        assert_eq!(graph.inherited_scheduler(sg, None), SchedulerKind::Sequential);
        assert_eq!(
            graph.inherited_scheduler(sg, Some(SchedulerKind::GibbsSequential)),
            SchedulerKind::GibbsSequential
        );
        graph
            .set_sub_graph_scheduler(sg, SchedulerKind::Flooding)
            .unwrap();
        assert_eq!(
            graph.inherited_scheduler(sg, Some(SchedulerKind::GibbsSequential)),
            SchedulerKind::Flooding
        );
    }

    #[test]
    pub fn schedule_reuse_test() {
        let mut graph = FactorGraph::new();
        let a = graph.add_variable(2);
        graph.add_factor(FactorTable::xor(1), &[a]).unwrap();

        let s1 = graph.schedule();
        let s2 = graph.schedule();
        assert_eq!(s1.version(), s2.version());

        graph.add_variable(2);
        let s3 = graph.schedule();
        assert!(s3.version() > s1.version());
    }
}
