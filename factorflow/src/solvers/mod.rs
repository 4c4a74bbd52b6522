//! Update operations and the solver façade.
//!
//! A solver owns per-edge message storage and turns each primitive schedule
//! entry into an in-place update of that storage. The engine decides when an
//! entry may run; the solver only decides what it computes.

use rand::rngs::StdRng;

use crate::api::error::{ModelError, SolverError, UpdateError};
use crate::engine::{Engine, EngineConfig};
use crate::model::{FactorGraph, Node, NodeId, NodeKind};
use crate::runtime::TaskContext;
use crate::schedule::{PrimitiveEntry, SchedulerKind};

pub mod gibbs;
pub mod messages;
pub mod minsum;
pub mod sumproduct;

pub use gibbs::{GibbsState, GibbsUpdate};
pub use messages::{Direction, MessageStore};
pub use minsum::MinSumUpdate;
pub use sumproduct::SumProductUpdate;

/// Performs the recomputation behind one primitive entry.
///
/// Called concurrently for entries the dependency graph does not order, so
/// an implementation must not keep mutable state outside the values named
/// by the entry's footprint.
pub trait UpdateOperation: Sync {
    fn apply(&self, entry: &PrimitiveEntry, context: &TaskContext) -> Result<(), UpdateError>;
}

impl<F> UpdateOperation for F
where
    F: Fn(&PrimitiveEntry, &TaskContext) -> Result<(), UpdateError> + Sync,
{
    fn apply(&self, entry: &PrimitiveEntry, context: &TaskContext) -> Result<(), UpdateError> {
        self(entry, context)
    }
}

/// Per-apply scratch: the task context and a lazily seeded random source
/// shared by every node of a block.
pub struct TaskScope<'c> {
    context: &'c TaskContext,
    rng: Option<StdRng>,
}

impl<'c> TaskScope<'c> {
    pub fn new(context: &'c TaskContext) -> Self {
        TaskScope { context, rng: None }
    }

    pub fn context(&self) -> &TaskContext {
        self.context
    }

    pub fn rng(&mut self) -> &mut StdRng {
        let context = self.context;
        self.rng.get_or_insert_with(|| context.rng())
    }
}

/// Local message rules of one inference algorithm.
pub(crate) trait MessageRule: Sync {
    const NAME: &'static str;

    fn graph(&self) -> &FactorGraph;

    fn variable_edge(
        &self,
        variable: &Node,
        port: usize,
        scope: &mut TaskScope,
    ) -> Result<(), UpdateError>;

    fn variable_node(&self, variable: &Node, scope: &mut TaskScope) -> Result<(), UpdateError> {
        for port in 0..variable.ports().len() {
            self.variable_edge(variable, port, scope)?;
        }
        Ok(())
    }

    fn factor_edge(&self, factor: &Node, port: usize, scope: &mut TaskScope)
        -> Result<(), UpdateError>;

    fn factor_node(&self, factor: &Node, scope: &mut TaskScope) -> Result<(), UpdateError> {
        for port in 0..factor.ports().len() {
            self.factor_edge(factor, port, scope)?;
        }
        Ok(())
    }
}

pub(crate) fn apply_rule<R>(
    rule: &R,
    entry: &PrimitiveEntry,
    context: &TaskContext,
) -> Result<(), UpdateError>
where
    R: MessageRule,
{
    let mut scope = TaskScope::new(context);
    match entry {
        PrimitiveEntry::Node(node) => update_node(rule, *node, &mut scope),
        PrimitiveEntry::Edge { node, edge } => {
            let n = node_of(rule.graph(), *node)?;
            let port = n.port_index(*edge).ok_or_else(|| {
                UpdateError::Failed(format!("edge {} is not a port of node {}", edge, node))
            })?;
            if n.is_variable() {
                rule.variable_edge(n, port, &mut scope)
            } else {
                rule.factor_edge(n, port, &mut scope)
            }
        }
        PrimitiveEntry::Block(nodes) => {
            for node in nodes {
                update_node(rule, *node, &mut scope)?;
            }
            Ok(())
        }
    }
}

fn update_node<R>(rule: &R, node: NodeId, scope: &mut TaskScope) -> Result<(), UpdateError>
where
    R: MessageRule,
{
    let n = node_of(rule.graph(), node)?;
    if n.is_variable() {
        rule.variable_node(n, scope)
    } else {
        rule.factor_node(n, scope)
    }
}

pub(crate) fn node_of(graph: &FactorGraph, node: NodeId) -> Result<&Node, UpdateError> {
    graph
        .node(node)
        .map_err(|e| UpdateError::Failed(e.to_string()))
}

pub(crate) fn input_of(variable: &Node) -> Result<&[f64], UpdateError> {
    match variable.kind() {
        NodeKind::Variable { input, .. } => Ok(input.as_slice()),
        NodeKind::Factor { .. } => Err(UpdateError::Failed(format!(
            "node {} is not a variable",
            variable.id()
        ))),
    }
}

/// Scale `values` to sum 1.
pub(crate) fn normalize(mut values: Vec<f64>, node: &Node) -> Result<Vec<f64>, UpdateError> {
    let sum: f64 = values.iter().sum();
    if !(sum > 0f64) || !sum.is_finite() {
        return Err(UpdateError::Numerical(format!(
            "messages of node {} sum to {}",
            node.id(),
            sum
        )));
    }
    values.iter_mut().for_each(|v| *v /= sum);
    Ok(values)
}

fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, v) in values.iter().enumerate() {
        if *v > values[best] {
            best = i;
        }
    }
    best
}

#[derive(Copy, Clone, Serialize, Deserialize, Debug, Eq, PartialEq, Hash)]
pub enum SolverKind {
    SumProduct,
    MinSum,
    Gibbs,
}

impl SolverKind {
    pub fn name(&self) -> &'static str {
        match self {
            SolverKind::SumProduct => sumproduct::NAME,
            SolverKind::MinSum => minsum::NAME,
            SolverKind::Gibbs => gibbs::NAME,
        }
    }

    /// Scheduler used for graphs that do not choose one.
    pub fn default_scheduler(&self) -> SchedulerKind {
        match self {
            SolverKind::SumProduct | SolverKind::MinSum => SchedulerKind::Sequential,
            SolverKind::Gibbs => SchedulerKind::GibbsSequential,
        }
    }
}

enum SolverState {
    SumProduct(MessageStore),
    MinSum(MessageStore),
    Gibbs(GibbsState),
}

/// Runs one inference algorithm over a factor graph on the parallel engine.
pub struct Solver {
    kind: SolverKind,
    engine: Engine,
    state: Option<SolverState>,
    topology_version: u64,
}

impl Solver {
    pub fn new(kind: SolverKind, config: EngineConfig) -> Self {
        Solver {
            kind,
            engine: Engine::new(config),
            state: None,
            topology_version: 0,
        }
    }

    pub fn kind(&self) -> SolverKind {
        self.kind
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Allocate fresh messages for `graph`. Must be repeated after any
    /// structural change of the graph.
    pub fn initialize(&mut self, graph: &FactorGraph) {
        let state = match self.kind {
            SolverKind::SumProduct => SolverState::SumProduct(sumproduct::init_messages(graph)),
            SolverKind::MinSum => SolverState::MinSum(minsum::init_messages(graph)),
            SolverKind::Gibbs => SolverState::Gibbs(GibbsState::new(graph)),
        };
        self.state = Some(state);
        self.topology_version = graph.topology_version();
        info!(
            "{} solver initialized, nodes={}, edges={}",
            self.kind.name(),
            graph.num_nodes(),
            graph.edges().len()
        );
    }

    /// Drop the cached dependency graph; the next iterate rebuilds it.
    pub fn reset(&mut self) {
        self.engine.invalidate();
    }

    pub fn iterate(&mut self, graph: &FactorGraph, iterations: usize) -> Result<(), SolverError> {
        if self.topology_version != graph.topology_version() {
            return Err(SolverError::NotInitialized);
        }
        let state = self.state.as_ref().ok_or(SolverError::NotInitialized)?;
        let schedule = graph.schedule_or(self.kind.default_scheduler());

        match state {
            SolverState::SumProduct(messages) => {
                let update = SumProductUpdate::new(graph, messages);
                self.engine.iterate(graph, &schedule, &update, iterations)?;
            }
            SolverState::MinSum(messages) => {
                let update = MinSumUpdate::new(graph, messages);
                self.engine.iterate(graph, &schedule, &update, iterations)?;
            }
            SolverState::Gibbs(gibbs) => {
                let update = GibbsUpdate::new(graph, gibbs);
                self.engine.iterate(graph, &schedule, &update, iterations)?;
            }
        }
        Ok(())
    }

    /// Iterate the configured number of times.
    pub fn solve(&mut self, graph: &FactorGraph) -> Result<(), SolverError> {
        let iterations = self.engine.config().iterations;
        self.iterate(graph, iterations)
    }

    /// Normalised marginal of `variable`.
    pub fn belief(&self, graph: &FactorGraph, variable: NodeId) -> Result<Vec<f64>, SolverError> {
        let state = self.state.as_ref().ok_or(SolverError::NotInitialized)?;
        let node = graph.node(variable)?;
        if !node.is_variable() {
            return Err(ModelError::NotAVariable(variable).into());
        }

        let belief = match state {
            SolverState::SumProduct(messages) => sumproduct::belief(node, messages),
            SolverState::MinSum(messages) => minsum::belief(node, messages),
            SolverState::Gibbs(gibbs) => gibbs.belief(node),
        };
        Ok(belief)
    }

    /// Most likely value of `variable`, lowest index on ties.
    pub fn value(&self, graph: &FactorGraph, variable: NodeId) -> Result<usize, SolverError> {
        let belief = self.belief(graph, variable)?;
        Ok(argmax(belief.as_slice()))
    }

    pub fn messages(&self) -> Option<&MessageStore> {
        match self.state.as_ref()? {
            SolverState::SumProduct(messages) => Some(messages),
            SolverState::MinSum(messages) => Some(messages),
            SolverState::Gibbs(gibbs) => Some(gibbs.messages()),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::api::error::{EngineError, ExecuteError, SolverError, UpdateError};
    use crate::engine::EngineConfig;
    use crate::model::{FactorGraph, FactorTable, GraphId, NodeId};
    use crate::runtime::TaskContext;
    use crate::schedule::PrimitiveEntry;
    use crate::solvers::{argmax, Solver, SolverKind, UpdateOperation};

    pub(crate) fn config(num_workers: usize, iterations: usize) -> EngineConfig {
        EngineConfig {
            num_workers,
            iterations,
            ..Default::default()
        }
    }

    /// a ring of binary variables joined by xor factors, with a loop so the
    /// messages keep changing between iterations
    pub(crate) fn loopy_graph() -> (FactorGraph, Vec<NodeId>) {
        let mut graph = FactorGraph::new();
        let vars: Vec<NodeId> = (0..6).map(|_| graph.add_variable(2)).collect();
        for i in 0..vars.len() {
            let next = vars[(i + 1) % vars.len()];
            let table = FactorTable::new(vec![2, 2], vec![0.9, 0.1, 0.2, 0.8]).unwrap();
            graph.add_factor(table, &[vars[i], next]).unwrap();
        }
        graph
            .add_factor(FactorTable::xor(3), &[vars[0], vars[2], vars[4]])
            .unwrap();
        graph.set_input(vars[0], &[0.8, 0.2]).unwrap();
        graph.set_input(vars[3], &[0.3, 0.7]).unwrap();
        (graph, vars)
    }

    fn bits(values: Vec<Vec<f64>>) -> Vec<Vec<u64>> {
        values
            .into_iter()
            .map(|v| v.into_iter().map(f64::to_bits).collect())
            .collect()
    }

    #[test]
    pub fn closure_update_test() {
        let update = |entry: &PrimitiveEntry, _: &TaskContext| -> Result<(), UpdateError> {
            match entry {
                PrimitiveEntry::Node(_) => Ok(()),
                _ => Err(UpdateError::Failed("node only".to_string())),
            }
        };
        let context = TaskContext::new(Default::default(), 0, 0, 0);
        assert!(update.apply(&PrimitiveEntry::Node(NodeId(1)), &context).is_ok());
        assert!(update
            .apply(&PrimitiveEntry::Block(vec![NodeId(1)]), &context)
            .is_err());
        assert_eq!(argmax(&[0.1, 0.7, 0.7]), 1);
    }

    #[test]
    pub fn not_initialized_test() {
        let (mut graph, vars) = loopy_graph();
        let mut solver = Solver::new(SolverKind::SumProduct, config(2, 1));
        assert!(matches!(
            solver.solve(&graph),
            Err(SolverError::NotInitialized)
        ));
        assert!(solver.belief(&graph, vars[0]).is_err());

        solver.initialize(&graph);
        solver.solve(&graph).unwrap();

        graph.add_variable(2);
        assert!(matches!(
            solver.solve(&graph),
            Err(SolverError::NotInitialized)
        ));
    }

    #[test]
    pub fn determinism_across_workers_test() {
        for kind in [SolverKind::SumProduct, SolverKind::MinSum, SolverKind::Gibbs] {
            let (graph, vars) = loopy_graph();
            let mut reference: Option<(Vec<Vec<u64>>, Vec<Vec<u64>>)> = None;

            for workers in [1, 2, 4, 8] {
                let mut solver = Solver::new(kind, config(workers, 7));
                solver.initialize(&graph);
                solver.solve(&graph).unwrap();

                let messages = bits(solver.messages().unwrap().snapshot());
                let beliefs = bits(
                    vars.iter()
                        .map(|v| solver.belief(&graph, *v).unwrap())
                        .collect(),
                );
                match &reference {
                    None => reference = Some((messages, beliefs)),
                    Some((m, b)) => {
                        assert_eq!(*m, messages, "{:?} messages, {} workers", kind, workers);
                        assert_eq!(*b, beliefs, "{:?} beliefs, {} workers", kind, workers);
                    }
                }
            }
        }
    }

    #[test]
    pub fn gibbs_sub_graph_test() {
        let mut graph = FactorGraph::new();
        let a = graph.add_variable(2);
        let sg = graph.add_sub_graph(GraphId::ROOT).unwrap();
        let inner = graph.add_variable_in(sg, 2).unwrap();
        let agree = FactorTable::new(vec![2, 2], vec![0.9, 0.1, 0.1, 0.9]).unwrap();
        graph.add_factor_in(sg, agree, &[a, inner]).unwrap();
        graph.set_input(a, &[0.3, 0.7]).unwrap();

        let mut reference: Option<Vec<Vec<u64>>> = None;
        for workers in [1, 2, 4, 8] {
            let mut solver = Solver::new(SolverKind::Gibbs, config(workers, 5));
            solver.initialize(&graph);
            solver.solve(&graph).unwrap();

            // five samples can never split evenly
            let belief = solver.belief(&graph, inner).unwrap();
            assert_ne!(belief, vec![0.5, 0.5]);
            assert!((belief.iter().sum::<f64>() - 1f64).abs() < 1e-12);

            let beliefs = bits(vec![solver.belief(&graph, a).unwrap(), belief]);
            match &reference {
                None => reference = Some(beliefs),
                Some(b) => assert_eq!(*b, beliefs, "{} workers", workers),
            }
        }
    }

    #[test]
    pub fn reset_rebuilds_test() {
        let (graph, _vars) = loopy_graph();
        let mut solver = Solver::new(SolverKind::SumProduct, config(2, 2));
        solver.initialize(&graph);
        solver.solve(&graph).unwrap();
        solver.solve(&graph).unwrap();
        assert_eq!(solver.engine().cache().builds(), 1);

        solver.reset();
        solver.solve(&graph).unwrap();
        assert_eq!(solver.engine().cache().builds(), 2);
    }

    #[test]
    pub fn unsupported_entry_test() {
        let (mut graph, vars) = loopy_graph();
        // variable-to-factor edge updates have no meaning for a sampler
        graph.set_scheduler(crate::schedule::SchedulerKind::Sequential);

        let mut solver = Solver::new(SolverKind::Gibbs, config(3, 2));
        solver.initialize(&graph);
        match solver.solve(&graph) {
            Err(SolverError::Engine(EngineError::Execute(ExecuteError::Update {
                source: UpdateError::Unsupported { solver: name, entry },
                ..
            }))) => {
                assert_eq!(name, "Gibbs");
                assert!(entry.starts_with("EdgeUpdate("), "{}", entry);
            }
            other => panic!("unexpected result {:?}", other),
        }
        assert!(solver.belief(&graph, vars[0]).is_ok());
    }
}
