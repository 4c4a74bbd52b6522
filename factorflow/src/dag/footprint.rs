use crate::api::error::BuildError;
use crate::model::{EdgeId, NodeId, Port, Topology};
use crate::schedule::PrimitiveEntry;

/// A value an update reads or writes.
#[derive(Copy, Clone, Serialize, Deserialize, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum Resource {
    /// The message on `edge` produced by `from`.
    Message { edge: EdgeId, from: NodeId },
    /// Private state of a node (a sample, a histogram).
    State(NodeId),
}

/// Read and write sets of one primitive entry, sorted and deduplicated.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Footprint {
    reads: Vec<Resource>,
    writes: Vec<Resource>,
}

impl Footprint {
    pub fn of<T>(topology: &T, entry: &PrimitiveEntry) -> Result<Self, BuildError>
    where
        T: Topology + ?Sized,
    {
        let mut footprint = Footprint::default();
        match entry {
            PrimitiveEntry::Node(node) => {
                footprint.add_node_update(*node, ports_of(topology, *node)?);
            }
            PrimitiveEntry::Edge { node, edge } => {
                let ports = ports_of(topology, *node)?;
                if !ports.iter().any(|port| port.edge == *edge) {
                    return Err(BuildError::UnknownPort {
                        node: *node,
                        edge: *edge,
                    });
                }
                for port in ports.iter().filter(|port| port.edge != *edge) {
                    footprint.reads.push(Resource::Message {
                        edge: port.edge,
                        from: port.sibling,
                    });
                }
                footprint.reads.push(Resource::State(*node));
                footprint.writes.push(Resource::Message {
                    edge: *edge,
                    from: *node,
                });
            }
            PrimitiveEntry::Block(nodes) => {
                if nodes.is_empty() {
                    return Err(BuildError::EmptyBlock);
                }
                for node in nodes {
                    footprint.add_node_update(*node, ports_of(topology, *node)?);
                }
            }
        }

        footprint.reads.sort();
        footprint.reads.dedup();
        footprint.writes.sort();
        footprint.writes.dedup();
        Ok(footprint)
    }

    fn add_node_update(&mut self, node: NodeId, ports: &[Port]) {
        for port in ports {
            self.reads.push(Resource::Message {
                edge: port.edge,
                from: port.sibling,
            });
            self.writes.push(Resource::Message {
                edge: port.edge,
                from: node,
            });
        }
        self.reads.push(Resource::State(node));
        self.writes.push(Resource::State(node));
    }

    pub fn reads(&self) -> &[Resource] {
        self.reads.as_slice()
    }

    pub fn writes(&self) -> &[Resource] {
        self.writes.as_slice()
    }

    pub fn is_write(&self, resource: &Resource) -> bool {
        self.writes.binary_search(resource).is_ok()
    }
}

fn ports_of<T>(topology: &T, node: NodeId) -> Result<&[Port], BuildError>
where
    T: Topology + ?Sized,
{
    topology.ports(node).ok_or(BuildError::UnknownNode(node))
}

#[cfg(test)]
mod tests {
    use crate::dag::{Footprint, Resource};
    use crate::model::{EdgeId, FactorGraph, FactorTable, NodeId};
    use crate::schedule::PrimitiveEntry;

    #[test]
    pub fn edge_footprint_test() {
        let mut graph = FactorGraph::new();
        let a = graph.add_variable(2);
        let b = graph.add_variable(2);
        let c = graph.add_variable(2);
        let f = graph.add_factor(FactorTable::xor(3), &[a, b, c]).unwrap();

        let fp = Footprint::of(
            &graph,
            &PrimitiveEntry::Edge {
                node: f,
                edge: EdgeId(1),
            },
        )
        .unwrap();
        assert_eq!(
            fp.reads(),
            &[
                Resource::Message {
                    edge: EdgeId(0),
                    from: a
                },
                Resource::Message {
                    edge: EdgeId(2),
                    from: c
                },
                Resource::State(f),
            ]
        );
        assert_eq!(
            fp.writes(),
            &[Resource::Message {
                edge: EdgeId(1),
                from: f
            }]
        );
    }

    #[test]
    pub fn node_and_block_footprint_test() {
        let mut graph = FactorGraph::new();
        let a = graph.add_variable(2);
        let b = graph.add_variable(2);
        let f = graph.add_factor(FactorTable::xor(2), &[a, b]).unwrap();

        let fp = Footprint::of(&graph, &PrimitiveEntry::Node(a)).unwrap();
        assert_eq!(fp.reads().len(), 2);
        assert!(fp.is_write(&Resource::Message {
            edge: EdgeId(0),
            from: a
        }));
        assert!(fp.is_write(&Resource::State(a)));

        let fp = Footprint::of(&graph, &PrimitiveEntry::Block(vec![a, b])).unwrap();
        assert_eq!(fp.writes().len(), 4);
        assert!(fp.reads().contains(&Resource::Message {
            edge: EdgeId(1),
            from: f
        }));

        assert!(Footprint::of(&graph, &PrimitiveEntry::Node(NodeId(9))).is_err());
    }
}
