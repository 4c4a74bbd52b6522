//! Sum-product belief propagation over discrete variables.
//!
//! Messages are probability vectors normalised to sum 1.

use crate::api::error::UpdateError;
use crate::model::{FactorGraph, Node, NodeKind};
use crate::runtime::TaskContext;
use crate::schedule::PrimitiveEntry;
use crate::solvers::messages::{Direction, MessageStore};
use crate::solvers::{apply_rule, input_of, normalize, MessageRule, TaskScope, UpdateOperation};

pub const NAME: &'static str = "SumProduct";

/// Uniform messages in both directions.
pub fn init_messages(graph: &FactorGraph) -> MessageStore {
    MessageStore::new(graph, |d| vec![1f64 / d.max(1) as f64; d])
}

pub struct SumProductUpdate<'a> {
    graph: &'a FactorGraph,
    messages: &'a MessageStore,
}

impl<'a> SumProductUpdate<'a> {
    pub fn new(graph: &'a FactorGraph, messages: &'a MessageStore) -> Self {
        SumProductUpdate { graph, messages }
    }
}

impl<'a> UpdateOperation for SumProductUpdate<'a> {
    fn apply(&self, entry: &PrimitiveEntry, context: &TaskContext) -> Result<(), UpdateError> {
        apply_rule(self, entry, context)
    }
}

impl<'a> MessageRule for SumProductUpdate<'a> {
    const NAME: &'static str = NAME;

    fn graph(&self) -> &FactorGraph {
        self.graph
    }

    fn variable_edge(
        &self,
        variable: &Node,
        port: usize,
        _scope: &mut TaskScope,
    ) -> Result<(), UpdateError> {
        let mut out = input_of(variable)?.to_vec();
        for (j, p) in variable.ports().iter().enumerate() {
            if j == port {
                continue;
            }
            let incoming = self.messages.read(p.edge, Direction::ToVariable);
            out.iter_mut()
                .zip(incoming.iter())
                .for_each(|(o, m)| *o *= *m);
        }

        let out = normalize(out, variable)?;
        let edge = variable.ports()[port].edge;
        self.messages.write(edge, Direction::ToFactor, out);
        Ok(())
    }

    fn factor_edge(
        &self,
        factor: &Node,
        port: usize,
        _scope: &mut TaskScope,
    ) -> Result<(), UpdateError> {
        let table = match factor.kind() {
            NodeKind::Factor { table } => table,
            NodeKind::Variable { .. } => {
                return Err(UpdateError::Failed(format!(
                    "node {} is not a factor",
                    factor.id()
                )))
            }
        };

        // the target port's own input is never read
        let incoming: Vec<Vec<f64>> = factor
            .ports()
            .iter()
            .enumerate()
            .map(|(j, p)| {
                if j == port {
                    Vec::new()
                } else {
                    self.messages.get(p.edge, Direction::ToFactor)
                }
            })
            .collect();

        let mut out = vec![0f64; table.dims()[port]];
        table.for_each(|assignment, weight| {
            if weight == 0f64 {
                return;
            }
            let mut product = weight;
            for (j, value) in assignment.iter().enumerate() {
                if j != port {
                    product *= incoming[j][*value];
                }
            }
            out[assignment[port]] += product;
        });

        let out = normalize(out, factor)?;
        let edge = factor.ports()[port].edge;
        self.messages.write(edge, Direction::ToVariable, out);
        Ok(())
    }
}

/// Prior times every incoming message, normalised. Uniform when the product
/// vanishes.
pub fn belief(variable: &Node, messages: &MessageStore) -> Vec<f64> {
    let mut belief = match variable.kind() {
        NodeKind::Variable { input, .. } => input.clone(),
        NodeKind::Factor { .. } => return Vec::new(),
    };
    for p in variable.ports() {
        let incoming = messages.read(p.edge, Direction::ToVariable);
        belief
            .iter_mut()
            .zip(incoming.iter())
            .for_each(|(b, m)| *b *= *m);
    }

    let sum: f64 = belief.iter().sum();
    if sum > 0f64 && sum.is_finite() {
        belief.iter_mut().for_each(|b| *b /= sum);
    } else {
        let d = belief.len().max(1) as f64;
        belief.iter_mut().for_each(|b| *b = 1f64 / d);
    }
    belief
}

#[cfg(test)]
mod tests {
    use crate::api::error::{EngineError, ExecuteError, SolverError, UpdateError};
    use crate::model::{EdgeId, FactorGraph, FactorTable};
    use crate::runtime::TaskContext;
    use crate::schedule::PrimitiveEntry;
    use crate::solvers::messages::Direction;
    use crate::solvers::sumproduct::{init_messages, SumProductUpdate};
    use crate::solvers::tests::config;
    use crate::solvers::{Solver, SolverKind, UpdateOperation};

    fn assert_close(a: &[f64], b: &[f64]) {
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b.iter()) {
            assert!((x - y).abs() < 1e-9, "{:?} != {:?}", a, b);
        }
    }

    #[test]
    pub fn tree_marginals_test() {
        // a - f(a, b) - b, exact on a tree after one pass
        let mut graph = FactorGraph::new();
        let a = graph.add_variable(2);
        let b = graph.add_variable(2);
        let table = FactorTable::new(vec![2, 2], vec![0.9, 0.1, 0.2, 0.8]).unwrap();
        graph.add_factor(table, &[a, b]).unwrap();
        graph.set_input(a, &[0.6, 0.4]).unwrap();

        let mut solver = Solver::new(SolverKind::SumProduct, config(2, 1));
        solver.initialize(&graph);
        solver.solve(&graph).unwrap();

        // p(b) = sum_a p(a) f(a, b) / Z
        let b0 = 0.6 * 0.9 + 0.4 * 0.2;
        let b1 = 0.6 * 0.1 + 0.4 * 0.8;
        assert_close(
            solver.belief(&graph, b).unwrap().as_slice(),
            &[b0 / (b0 + b1), b1 / (b0 + b1)],
        );
        assert_eq!(solver.value(&graph, b).unwrap(), 0);
    }

    #[test]
    pub fn xor_parity_test() {
        // a xor b must be even, with a pinned to 1
        let mut graph = FactorGraph::new();
        let a = graph.add_variable(2);
        let b = graph.add_variable(2);
        graph.add_factor(FactorTable::xor(2), &[a, b]).unwrap();
        graph.set_input(a, &[0f64, 1f64]).unwrap();

        let mut solver = Solver::new(SolverKind::SumProduct, config(4, 3));
        solver.initialize(&graph);
        solver.solve(&graph).unwrap();
        assert_close(solver.belief(&graph, b).unwrap().as_slice(), &[0f64, 1f64]);
        assert_eq!(solver.value(&graph, b).unwrap(), 1);
    }

    #[test]
    pub fn contradiction_is_numerical_error_test() {
        let mut graph = FactorGraph::new();
        let a = graph.add_variable(2);
        let b = graph.add_variable(2);
        graph.add_factor(FactorTable::xor(2), &[a, b]).unwrap();
        graph
            .add_factor(FactorTable::new(vec![2, 2], vec![0.0, 1.0, 1.0, 0.0]).unwrap(), &[a, b])
            .unwrap();
        graph.set_input(a, &[1f64, 0f64]).unwrap();

        let mut solver = Solver::new(SolverKind::SumProduct, config(1, 2));
        solver.initialize(&graph);
        match solver.solve(&graph) {
            Err(SolverError::Engine(EngineError::Execute(ExecuteError::Update {
                source: UpdateError::Numerical(_),
                ..
            }))) => {}
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    pub fn factor_edge_skips_target_input_test() {
        let mut graph = FactorGraph::new();
        let a = graph.add_variable(2);
        let b = graph.add_variable(2);
        let f = graph.add_factor(FactorTable::equality(2, 2), &[a, b]).unwrap();

        let messages = init_messages(&graph);
        // b's own message into f has no part in f's message back to b
        messages.poison(EdgeId(1), Direction::ToFactor);

        let update = SumProductUpdate::new(&graph, &messages);
        let context = TaskContext::new(Default::default(), 0, 0, 0);
        let entry = PrimitiveEntry::Edge {
            node: f,
            edge: EdgeId(1),
        };
        update.apply(&entry, &context).unwrap();
        assert_eq!(messages.get(EdgeId(1), Direction::ToVariable), vec![0.5, 0.5]);
    }
}
