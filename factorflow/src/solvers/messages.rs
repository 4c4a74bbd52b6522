use std::sync::{RwLock, RwLockReadGuard};

use crate::model::{EdgeId, FactorGraph, NodeKind};

/// Which way a message travels along its edge.
#[derive(Copy, Clone, Serialize, Deserialize, Debug, Eq, PartialEq, Hash)]
pub enum Direction {
    ToFactor,
    ToVariable,
}

/// Two message slots per edge.
///
/// Every slot is written only by tasks the dependency graph orders against
/// each other, so the locks are never contended; they only make the sharing
/// sound.
#[derive(Debug)]
pub struct MessageStore {
    to_factor: Vec<RwLock<Vec<f64>>>,
    to_variable: Vec<RwLock<Vec<f64>>>,
}

impl MessageStore {
    /// One slot pair per edge, both initialised by `init(domain_size)`.
    pub fn new<F>(graph: &FactorGraph, init: F) -> Self
    where
        F: Fn(usize) -> Vec<f64>,
    {
        let mut to_factor = Vec::with_capacity(graph.edges().len());
        let mut to_variable = Vec::with_capacity(graph.edges().len());
        for edge in graph.edges() {
            let domain_size = match graph.node(edge.variable).map(|node| node.kind()) {
                Ok(NodeKind::Variable { domain_size, .. }) => *domain_size,
                _ => 0,
            };
            to_factor.push(RwLock::new(init(domain_size)));
            to_variable.push(RwLock::new(init(domain_size)));
        }

        MessageStore {
            to_factor,
            to_variable,
        }
    }

    fn slots(&self, direction: Direction) -> &[RwLock<Vec<f64>>] {
        match direction {
            Direction::ToFactor => self.to_factor.as_slice(),
            Direction::ToVariable => self.to_variable.as_slice(),
        }
    }

    pub fn read(&self, edge: EdgeId, direction: Direction) -> RwLockReadGuard<'_, Vec<f64>> {
        self.slots(direction)[edge.index()].read().unwrap()
    }

    pub fn get(&self, edge: EdgeId, direction: Direction) -> Vec<f64> {
        self.read(edge, direction).clone()
    }

    pub fn write(&self, edge: EdgeId, direction: Direction, values: Vec<f64>) {
        *self.slots(direction)[edge.index()].write().unwrap() = values;
    }

    pub fn num_edges(&self) -> usize {
        self.to_factor.len()
    }

    /// Poison one slot so any later access panics.
    #[cfg(test)]
    pub(crate) fn poison(&self, edge: EdgeId, direction: Direction) {
        let slot = &self.slots(direction)[edge.index()];
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = slot.write().unwrap();
            panic!("slot {} poisoned", edge);
        }));
    }

    /// Copy of every slot, variable-to-factor first.
    pub fn snapshot(&self) -> Vec<Vec<f64>> {
        self.to_factor
            .iter()
            .chain(self.to_variable.iter())
            .map(|slot| slot.read().unwrap().clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use crate::model::{EdgeId, FactorGraph, FactorTable};
    use crate::solvers::messages::{Direction, MessageStore};

    #[test]
    pub fn message_store_test() {
        let mut graph = FactorGraph::new();
        let a = graph.add_variable(2);
        let b = graph.add_variable(3);
        graph
            .add_factor(FactorTable::new(vec![2, 3], vec![1f64; 6]).unwrap(), &[a, b])
            .unwrap();

        let store = MessageStore::new(&graph, |d| vec![1f64 / d as f64; d]);
        assert_eq!(store.num_edges(), 2);
        assert_eq!(store.get(EdgeId(0), Direction::ToFactor), vec![0.5, 0.5]);
        assert_eq!(store.read(EdgeId(1), Direction::ToVariable).len(), 3);

        store.write(EdgeId(1), Direction::ToVariable, vec![1f64, 0f64, 0f64]);
        assert_eq!(store.get(EdgeId(1), Direction::ToVariable), vec![1f64, 0f64, 0f64]);
        assert_eq!(store.get(EdgeId(1), Direction::ToFactor).len(), 3);
        assert_eq!(store.snapshot().len(), 4);
    }
}
