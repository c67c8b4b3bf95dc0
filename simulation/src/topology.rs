//! Network topologies for OLSB simulations
//!
//! Provides functions to create various topologies:
//! - Line: each node linked to the next
//! - Ring: a line closed back on itself
//! - Grid: rows × columns, linked to horizontal and vertical neighbours
//! - Random: seeded connection probability, no isolated nodes
//! - Custom: built from an edge list
//!
//! Node `i` gets address `10.1.1.(i + 1)/24`, so every node shares one
//! broadcast domain and links decide who actually hears whom.

use std::collections::BTreeSet;
use std::net::Ipv4Addr;

use olsb_core::InterfaceAddress;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Largest node count addressable in the `10.1.1.0/24` subnet
pub const MAX_NODES: usize = 254;

/// Index of a simulated node
pub type NodeId = usize;

/// Interface address of a node
pub fn node_address(node: NodeId) -> InterfaceAddress {
    let host = (node + 1).min(MAX_NODES) as u8;
    InterfaceAddress::with_prefix(Ipv4Addr::new(10, 1, 1, host), 24)
}

/// Node owning an address, if it is one of ours
pub fn node_for_address(address: Ipv4Addr) -> Option<NodeId> {
    match address.octets() {
        [10, 1, 1, host] if (1..=MAX_NODES as u8).contains(&host) => Some(host as usize - 1),
        _ => None,
    }
}

/// An undirected topology
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topology {
    node_count: usize,
    /// Normalized edges (smaller id first)
    edges: BTreeSet<(NodeId, NodeId)>,
}

impl Topology {
    /// Create a topology of unconnected nodes
    pub fn new(node_count: usize) -> Self {
        Self {
            node_count,
            edges: BTreeSet::new(),
        }
    }

    /// Add an undirected link; self-loops are ignored
    pub fn connect(&mut self, a: NodeId, b: NodeId) {
        if a == b {
            return;
        }
        self.node_count = self.node_count.max(a.max(b) + 1);
        self.edges.insert((a.min(b), a.max(b)));
    }

    /// Check if two nodes are directly linked
    pub fn are_connected(&self, a: NodeId, b: NodeId) -> bool {
        self.edges.contains(&(a.min(b), a.max(b)))
    }

    /// Neighbours of a node
    pub fn neighbors(&self, node: NodeId) -> BTreeSet<NodeId> {
        self.edges
            .iter()
            .filter_map(|&(a, b)| match node {
                n if n == a => Some(b),
                n if n == b => Some(a),
                _ => None,
            })
            .collect()
    }

    /// All links
    pub fn edges(&self) -> impl Iterator<Item = (NodeId, NodeId)> + '_ {
        self.edges.iter().copied()
    }

    /// Number of nodes
    pub fn node_count(&self) -> usize {
        self.node_count
    }

    /// Number of links
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Print a simple ASCII view of the adjacency lists
    pub fn visualize(&self) -> String {
        let mut output = String::new();
        output.push_str("Topology:\n");
        output.push_str(&format!("  Nodes: {}\n", self.node_count));
        output.push_str(&format!("  Links: {}\n\n", self.edge_count()));

        for node in 0..self.node_count {
            let neighbors: Vec<String> = self
                .neighbors(node)
                .into_iter()
                .map(|n| node_address(n).local.to_string())
                .collect();
            output.push_str(&format!(
                "  {} -> [{}]\n",
                node_address(node).local,
                neighbors.join(", ")
            ));
        }
        output
    }
}

/// Builder for standard topologies
pub struct TopologyBuilder {
    node_count: usize,
}

impl TopologyBuilder {
    /// Create a builder for the given number of nodes
    pub fn new(node_count: usize) -> Self {
        Self { node_count }
    }

    /// 0 - 1 - 2 - ... - n-1
    pub fn line(self) -> Topology {
        let mut topology = Topology::new(self.node_count);
        for i in 1..self.node_count {
            topology.connect(i - 1, i);
        }
        topology
    }

    /// 0 - 1 - ... - n-1 - 0
    pub fn ring(self) -> Topology {
        let mut topology = self.line();
        if topology.node_count > 2 {
            topology.connect(topology.node_count - 1, 0);
        }
        topology
    }

    /// Random links with the given probability
    ///
    /// Isolated nodes are attached to a random other node. The same seed
    /// always yields the same topology.
    pub fn random(self, connection_probability: f64, seed: u64) -> Topology {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut topology = Topology::new(self.node_count);

        for i in 0..self.node_count {
            for j in (i + 1)..self.node_count {
                if rng.random::<f64>() < connection_probability {
                    topology.connect(i, j);
                }
            }
        }

        if self.node_count > 1 {
            for node in 0..self.node_count {
                if topology.neighbors(node).is_empty() {
                    let offset = rng.random_range(1..self.node_count);
                    topology.connect(node, (node + offset) % self.node_count);
                }
            }
        }
        topology
    }
}

/// rows × columns grid, node `r * columns + c`
pub fn grid(rows: usize, columns: usize) -> Topology {
    let mut topology = Topology::new(rows * columns);
    for r in 0..rows {
        for c in 0..columns {
            let node = r * columns + c;
            if c + 1 < columns {
                topology.connect(node, node + 1);
            }
            if r + 1 < rows {
                topology.connect(node, node + columns);
            }
        }
    }
    topology
}

/// Create a custom topology from an edge list
pub fn from_edges(edges: &[(NodeId, NodeId)]) -> Topology {
    let mut topology = Topology::new(0);
    for &(a, b) in edges {
        topology.connect(a, b);
    }
    topology
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_topology() {
        let topology = TopologyBuilder::new(4).line();
        assert_eq!(topology.node_count(), 4);
        assert_eq!(topology.edge_count(), 3);
        assert!(topology.are_connected(1, 2));
        assert!(!topology.are_connected(0, 3));
    }

    #[test]
    fn test_ring_topology() {
        let topology = TopologyBuilder::new(5).ring();
        assert_eq!(topology.edge_count(), 5);
        assert!(topology.are_connected(4, 0)); // Wrap around
        assert_eq!(topology.neighbors(0), BTreeSet::from([1, 4]));
    }

    #[test]
    fn test_grid_topology() {
        let topology = grid(3, 3);
        assert_eq!(topology.node_count(), 9);
        assert_eq!(topology.edge_count(), 12);
        // Center node has four neighbours
        assert_eq!(topology.neighbors(4).len(), 4);
        assert_eq!(topology.neighbors(0), BTreeSet::from([1, 3]));
    }

    #[test]
    fn test_random_is_seeded_and_connected() {
        let a = TopologyBuilder::new(12).random(0.1, 7);
        let b = TopologyBuilder::new(12).random(0.1, 7);
        assert_eq!(a, b);
        assert!((0..12).all(|n| !a.neighbors(n).is_empty()));
    }

    #[test]
    fn test_custom_topology() {
        let topology = from_edges(&[(0, 1), (1, 2), (2, 0), (2, 3), (3, 3)]);
        assert_eq!(topology.node_count(), 4);
        assert_eq!(topology.edge_count(), 4);
        assert!(topology.are_connected(0, 2));
        assert!(!topology.are_connected(0, 3));
    }

    #[test]
    fn test_node_addresses() {
        assert_eq!(node_address(0).local, Ipv4Addr::new(10, 1, 1, 1));
        assert_eq!(node_address(0).broadcast(), Ipv4Addr::new(10, 1, 1, 255));
        assert_eq!(node_for_address(Ipv4Addr::new(10, 1, 1, 5)), Some(4));
        assert_eq!(node_for_address(Ipv4Addr::new(10, 1, 1, 255)), None);
        assert_eq!(node_for_address(Ipv4Addr::new(10, 1, 2, 5)), None);
    }
}
