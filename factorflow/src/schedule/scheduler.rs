use crate::model::{FactorGraph, GraphId, NodeId};
use crate::schedule::{Schedule, ScheduleBuilder, ScheduleEntry};

/// Builds the default update order of one (sub-)graph.
pub trait Scheduler {
    fn build_schedule(&self, graph: &FactorGraph, target: GraphId) -> Schedule;
}

/// The closed set of built-in schedulers.
#[derive(Copy, Clone, Serialize, Deserialize, Debug, Eq, PartialEq, Hash)]
pub enum SchedulerKind {
    /// Per factor: every variable-to-factor edge, then the factor.
    Sequential,
    /// Every variable, then every factor.
    Flooding,
    /// Per variable: every factor-to-variable edge, then the variable.
    GibbsSequential,
}

impl Default for SchedulerKind {
    fn default() -> Self {
        SchedulerKind::Sequential
    }
}

impl Scheduler for SchedulerKind {
    fn build_schedule(&self, graph: &FactorGraph, target: GraphId) -> Schedule {
        let mut builder = ScheduleBuilder::new();
        match self {
            SchedulerKind::Sequential => sequential(graph, target, &mut builder),
            SchedulerKind::Flooding => flooding(graph, target, &mut builder),
            SchedulerKind::GibbsSequential => gibbs_sequential(graph, target, &mut builder),
        }
        builder.build_with_scheduler(*self)
    }
}

fn sequential(graph: &FactorGraph, target: GraphId, builder: &mut ScheduleBuilder) {
    for factor in graph.factors_of(target) {
        push_inbound_edges(graph, *factor, builder, |variable| {
            graph.is_within(variable, target)
        });
        builder.push(ScheduleEntry::Node(*factor));
    }

    for child in graph.sub_graphs_of(target) {
        // edges crossing into the child are owned by this level
        for factor in subtree_factors(graph, *child) {
            push_inbound_edges(graph, factor, builder, |variable| {
                !graph.is_within(variable, *child)
            });
        }
        builder.push(ScheduleEntry::SubGraph(*child));
    }
}

fn flooding(graph: &FactorGraph, target: GraphId, builder: &mut ScheduleBuilder) {
    for variable in graph.variables_of(target) {
        let connected = graph
            .node(*variable)
            .map(|node| !node.ports().is_empty())
            .unwrap_or(false);
        if connected {
            builder.push(ScheduleEntry::Node(*variable));
        }
    }
    for factor in graph.factors_of(target) {
        builder.push(ScheduleEntry::Node(*factor));
    }
    for child in graph.sub_graphs_of(target) {
        builder.push(ScheduleEntry::SubGraph(*child));
    }
}

fn gibbs_sequential(graph: &FactorGraph, target: GraphId, builder: &mut ScheduleBuilder) {
    for variable in graph.variables_of(target) {
        let ports = match graph.node(*variable) {
            Ok(node) => node.ports(),
            Err(_) => continue,
        };
        if ports.is_empty() {
            continue;
        }
        for port in ports {
            builder.push(ScheduleEntry::Edge {
                node: port.sibling,
                edge: port.edge,
            });
        }
        builder.push(ScheduleEntry::Node(*variable));
    }
    for child in graph.sub_graphs_of(target) {
        builder.push(ScheduleEntry::SubGraph(*child));
    }
}

/// Variable-to-factor edges of `factor` whose variable passes `filter`.
fn push_inbound_edges<F>(
    graph: &FactorGraph,
    factor: NodeId,
    builder: &mut ScheduleBuilder,
    filter: F,
) where
    F: Fn(NodeId) -> bool,
{
    let ports = match graph.node(factor) {
        Ok(node) => node.ports(),
        Err(_) => return,
    };
    for port in ports {
        if filter(port.sibling) {
            builder.push(ScheduleEntry::Edge {
                node: port.sibling,
                edge: port.edge,
            });
        }
    }
}

fn subtree_factors(graph: &FactorGraph, root: GraphId) -> Vec<NodeId> {
    let mut factors = Vec::new();
    let mut stack = vec![root];
    while let Some(g) = stack.pop() {
        factors.extend_from_slice(graph.factors_of(g));
        stack.extend(graph.sub_graphs_of(g).iter().rev());
    }
    factors
}
