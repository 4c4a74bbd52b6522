use std::ops::Index;

use daggy::{Dag, NodeIndex};
use serde::Serialize;

#[derive(Clone, Serialize, Debug)]
pub(crate) struct JsonNode<N>
where
    N: Serialize,
{
    id: String,
    detail: N,
}

#[derive(Clone, Serialize, Debug)]
pub(crate) struct JsonEdge<E>
where
    E: Serialize,
{
    /// source JsonNode id
    source: String,
    /// target JsonNode id
    target: String,
    detail: E,
}

/// Serialisable view of a task DAG, nodes in index order.
#[derive(Clone, Serialize, Debug)]
pub(crate) struct JsonDag<N, E>
where
    N: Clone + Serialize,
    E: Clone + Serialize,
{
    nodes: Vec<JsonNode<N>>,
    edges: Vec<JsonEdge<E>>,
}

impl<'a, N, E> From<&'a Dag<N, E>> for JsonDag<N, E>
where
    N: Clone + Serialize,
    E: Clone + Serialize,
{
    fn from(dag: &'a Dag<N, E, u32>) -> Self {
        let nodes = (0..dag.node_count())
            .map(|index| JsonDag::create_json_node(dag, NodeIndex::new(index)))
            .collect();

        let edges = dag
            .raw_edges()
            .iter()
            .map(|edge| JsonEdge {
                source: edge.source().index().to_string(),
                target: edge.target().index().to_string(),
                detail: edge.weight.clone(),
            })
            .collect();

        JsonDag { nodes, edges }
    }
}

impl<N, E> JsonDag<N, E>
where
    N: Clone + Serialize,
    E: Clone + Serialize,
{
    fn create_json_node(dag: &Dag<N, E>, node_index: NodeIndex) -> JsonNode<N> {
        let n = dag.index(node_index);
        let id = node_index.index().to_string();

        JsonNode {
            id,
            detail: n.clone(),
        }
    }
}
