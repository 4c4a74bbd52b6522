//! Min-sum over discrete variables.
//!
//! Messages are energies (`-ln p`) shifted so their minimum is 0.

use crate::api::error::UpdateError;
use crate::model::{FactorGraph, Node, NodeKind};
use crate::runtime::TaskContext;
use crate::schedule::PrimitiveEntry;
use crate::solvers::messages::{Direction, MessageStore};
use crate::solvers::{apply_rule, input_of, MessageRule, TaskScope, UpdateOperation};

pub const NAME: &'static str = "MinSum";

/// Zero energy in both directions.
pub fn init_messages(graph: &FactorGraph) -> MessageStore {
    MessageStore::new(graph, |d| vec![0f64; d])
}

fn energy(p: f64) -> f64 {
    if p > 0f64 {
        -p.ln()
    } else {
        f64::INFINITY
    }
}

/// Shift `values` so the smallest is 0.
fn normalize(mut values: Vec<f64>, node: &Node) -> Result<Vec<f64>, UpdateError> {
    let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
    if !min.is_finite() {
        return Err(UpdateError::Numerical(format!(
            "messages of node {} have no finite energy",
            node.id()
        )));
    }
    values.iter_mut().for_each(|v| *v -= min);
    Ok(values)
}

pub struct MinSumUpdate<'a> {
    graph: &'a FactorGraph,
    messages: &'a MessageStore,
}

impl<'a> MinSumUpdate<'a> {
    pub fn new(graph: &'a FactorGraph, messages: &'a MessageStore) -> Self {
        MinSumUpdate { graph, messages }
    }
}

impl<'a> UpdateOperation for MinSumUpdate<'a> {
    fn apply(&self, entry: &PrimitiveEntry, context: &TaskContext) -> Result<(), UpdateError> {
        apply_rule(self, entry, context)
    }
}

impl<'a> MessageRule for MinSumUpdate<'a> {
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
        let mut out: Vec<f64> = input_of(variable)?.iter().map(|p| energy(*p)).collect();
        for (j, p) in variable.ports().iter().enumerate() {
            if j == port {
                continue;
            }
            let incoming = self.messages.read(p.edge, Direction::ToVariable);
            out.iter_mut()
                .zip(incoming.iter())
                .for_each(|(o, m)| *o += *m);
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

        let mut out = vec![f64::INFINITY; table.dims()[port]];
        table.for_each(|assignment, weight| {
            if weight == 0f64 {
                return;
            }
            let mut sum = energy(weight);
            for (j, value) in assignment.iter().enumerate() {
                if j != port {
                    sum += incoming[j][*value];
                }
            }
            let slot = &mut out[assignment[port]];
            if sum < *slot {
                *slot = sum;
            }
        });

        let out = normalize(out, factor)?;
        let edge = factor.ports()[port].edge;
        self.messages.write(edge, Direction::ToVariable, out);
        Ok(())
    }
}

/// Total energy of each value mapped back to normalised probabilities.
pub fn belief(variable: &Node, messages: &MessageStore) -> Vec<f64> {
    let mut energies: Vec<f64> = match variable.kind() {
        NodeKind::Variable { input, .. } => input.iter().map(|p| energy(*p)).collect(),
        NodeKind::Factor { .. } => return Vec::new(),
    };
    for p in variable.ports() {
        let incoming = messages.read(p.edge, Direction::ToVariable);
        energies
            .iter_mut()
            .zip(incoming.iter())
            .for_each(|(e, m)| *e += *m);
    }

    let min = energies.iter().cloned().fold(f64::INFINITY, f64::min);
    if !min.is_finite() {
        let d = energies.len().max(1) as f64;
        return energies.iter().map(|_| 1f64 / d).collect();
    }
    let weights: Vec<f64> = energies.iter().map(|e| (-(e - min)).exp()).collect();
    let sum: f64 = weights.iter().sum();
    weights.into_iter().map(|w| w / sum).collect()
}
