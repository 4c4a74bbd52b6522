//! Gibbs sampling over discrete variables.
//!
//! A variable update draws a new sample from its prior times the conditionals
//! sent by its factors and broadcasts the sample as a one-hot message. A
//! factor edge update computes the conditional of one neighbour given the
//! current samples of the others. Random numbers come from the task context,
//! so a run is reproducible for any worker count.

use std::sync::Mutex;

use rand::Rng;

use crate::api::error::UpdateError;
use crate::model::{EdgeId, FactorGraph, Node, NodeKind};
use crate::runtime::TaskContext;
use crate::schedule::PrimitiveEntry;
use crate::solvers::messages::{Direction, MessageStore};
use crate::solvers::{apply_rule, input_of, normalize, MessageRule, TaskScope, UpdateOperation};

pub const NAME: &'static str = "Gibbs";

#[derive(Clone, Debug, Default)]
struct Sampled {
    sample: usize,
    counts: Vec<u64>,
}

/// Messages plus the sample and histogram of every variable.
#[derive(Debug)]
pub struct GibbsState {
    messages: MessageStore,
    variables: Vec<Mutex<Sampled>>,
}

impl GibbsState {
    /// Every variable starts at value 0 with an empty histogram.
    pub fn new(graph: &FactorGraph) -> Self {
        let messages = MessageStore::new(graph, |d| vec![1f64 / d.max(1) as f64; d]);
        for index in 0..messages.num_edges() {
            let edge = EdgeId(index as u32);
            let mut one_hot = vec![0f64; messages.read(edge, Direction::ToFactor).len()];
            if let Some(first) = one_hot.first_mut() {
                *first = 1f64;
            }
            messages.write(edge, Direction::ToFactor, one_hot);
        }

        let variables = graph
            .nodes()
            .iter()
            .map(|node| {
                let counts = match node.kind() {
                    NodeKind::Variable { domain_size, .. } => vec![0; *domain_size],
                    NodeKind::Factor { .. } => Vec::new(),
                };
                Mutex::new(Sampled { sample: 0, counts })
            })
            .collect();

        GibbsState {
            messages,
            variables,
        }
    }

    pub fn messages(&self) -> &MessageStore {
        &self.messages
    }

    pub fn sample(&self, variable: &Node) -> usize {
        self.variables[variable.id().index()].lock().unwrap().sample
    }

    /// Normalised histogram of samples, uniform before the first sample.
    pub fn belief(&self, variable: &Node) -> Vec<f64> {
        let state = self.variables[variable.id().index()].lock().unwrap();
        let total: u64 = state.counts.iter().sum();
        if total == 0 {
            let d = state.counts.len().max(1) as f64;
            return state.counts.iter().map(|_| 1f64 / d).collect();
        }
        state
            .counts
            .iter()
            .map(|c| *c as f64 / total as f64)
            .collect()
    }
}

pub struct GibbsUpdate<'a> {
    graph: &'a FactorGraph,
    state: &'a GibbsState,
}

impl<'a> GibbsUpdate<'a> {
    pub fn new(graph: &'a FactorGraph, state: &'a GibbsState) -> Self {
        GibbsUpdate { graph, state }
    }
}

impl<'a> UpdateOperation for GibbsUpdate<'a> {
    fn apply(&self, entry: &PrimitiveEntry, context: &TaskContext) -> Result<(), UpdateError> {
        apply_rule(self, entry, context)
    }
}

impl<'a> MessageRule for GibbsUpdate<'a> {
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
        let entry = PrimitiveEntry::Edge {
            node: variable.id(),
            edge: variable.ports()[port].edge,
        };
        Err(UpdateError::Unsupported {
            solver: Self::NAME,
            entry: entry.to_string(),
        })
    }

    fn variable_node(&self, variable: &Node, scope: &mut TaskScope) -> Result<(), UpdateError> {
        let mut conditional = input_of(variable)?.to_vec();
        for p in variable.ports() {
            let incoming = self.state.messages.read(p.edge, Direction::ToVariable);
            conditional
                .iter_mut()
                .zip(incoming.iter())
                .for_each(|(c, m)| *c *= *m);
        }
        let conditional = normalize(conditional, variable)?;

        let r: f64 = scope.rng().gen();
        let mut sample = conditional.len() - 1;
        let mut cumulative = 0f64;
        for (value, p) in conditional.iter().enumerate() {
            cumulative += *p;
            if r < cumulative {
                sample = value;
                break;
            }
        }

        {
            let mut state = self.state.variables[variable.id().index()].lock().unwrap();
            state.sample = sample;
            state.counts[sample] += 1;
        }

        for p in variable.ports() {
            let mut one_hot = vec![0f64; conditional.len()];
            one_hot[sample] = 1f64;
            self.state.messages.write(p.edge, Direction::ToFactor, one_hot);
        }
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

        // neighbours' current samples, read back from their one-hot messages
        let mut assignment = Vec::with_capacity(factor.ports().len());
        for (j, p) in factor.ports().iter().enumerate() {
            if j == port {
                assignment.push(0);
                continue;
            }
            let incoming = self.state.messages.read(p.edge, Direction::ToFactor);
            let value = incoming.iter().position(|m| *m > 0f64).unwrap_or(0);
            assignment.push(value);
        }

        let d = table.dims()[port];
        let mut out = Vec::with_capacity(d);
        for value in 0..d {
            assignment[port] = value;
            out.push(table.weight(assignment.as_slice()));
        }

        let out = normalize(out, factor)?;
        let edge = factor.ports()[port].edge;
        self.state.messages.write(edge, Direction::ToVariable, out);
        Ok(())
    }
}
