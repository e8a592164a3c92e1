//! LouvainGate: admission control for similarity candidates
//!
//! Similarity edges are only considered between nodes that already share a
//! community, between two boundary nodes, or when the raw score is high
//! enough to bypass the community structure entirely. This keeps the
//! candidate set near `O(N · avg community size)` instead of `O(N²)`.

use crate::config::GateConfig;
use crate::graph::{Graph, NodeId};
use std::collections::{HashMap, HashSet};

/// Counters for one batch's gating decisions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GateStats {
    pub checked: usize,
    pub rejected: usize,
}

impl GateStats {
    pub fn admitted(&self) -> usize {
        self.checked - self.rejected
    }
}

/// Community view frozen at batch start
#[derive(Debug, Clone)]
pub struct LouvainGate {
    communities: HashMap<NodeId, u32>,
    boundary: HashSet<NodeId>,
    override_threshold: f64,
}

impl LouvainGate {
    /// Build the gate from a snapshot's community assignments.
    ///
    /// A node is on the boundary if any of its edges, in either direction,
    /// reaches a node assigned to a different community. Nodes without an
    /// assignment are never on the boundary.
    pub fn from_graph(graph: &Graph, config: &GateConfig) -> Self {
        let communities: HashMap<NodeId, u32> = graph
            .nodes()
            .filter_map(|n| n.community_id.map(|c| (n.id.clone(), c)))
            .collect();

        let mut boundary = HashSet::new();
        for edge in graph.edges() {
            if let (Some(a), Some(b)) = (
                communities.get(&edge.source),
                communities.get(&edge.target),
            ) {
                if a != b {
                    boundary.insert(edge.source.clone());
                    boundary.insert(edge.target.clone());
                }
            }
        }

        Self {
            communities,
            boundary,
            override_threshold: config.override_threshold,
        }
    }

    /// Whether a similarity pair may be materialized
    pub fn admit(&self, a: &NodeId, b: &NodeId, raw_score: f64) -> bool {
        if raw_score > self.override_threshold {
            return true;
        }
        if let (Some(ca), Some(cb)) = (self.communities.get(a), self.communities.get(b)) {
            if ca == cb {
                return true;
            }
        }
        self.is_boundary(a) && self.is_boundary(b)
    }

    pub fn is_boundary(&self, id: &NodeId) -> bool {
        self.boundary.contains(id)
    }

    pub fn boundary_len(&self) -> usize {
        self.boundary.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Edge, EdgeType, Node, NodeKind};

    fn node(id: &str, community: Option<u32>) -> Node {
        let mut node = Node::new(id, NodeKind::Content);
        node.community_id = community;
        node
    }

    /// Two communities {a, b} and {c, d}; `bridge` adds a b -> c edge.
    fn two_clusters(bridge: bool) -> Graph {
        let mut g = Graph::new();
        g.add_node(node("a", Some(0)));
        g.add_node(node("b", Some(0)));
        g.add_node(node("c", Some(1)));
        g.add_node(node("d", Some(1)));
        g.add_node(node("fresh", None));
        g.add_edge(Edge::new("a", "b", EdgeType::Cites)).unwrap();
        g.add_edge(Edge::new("c", "d", EdgeType::Cites)).unwrap();
        if bridge {
            g.add_edge(Edge::new("b", "c", EdgeType::Mentions)).unwrap();
        }
        g
    }

    fn id(s: &str) -> NodeId {
        NodeId::from(s)
    }

    #[test]
    fn cross_community_pair_needs_the_override() {
        let gate = LouvainGate::from_graph(&two_clusters(false), &GateConfig::default());
        assert!(!gate.admit(&id("a"), &id("d"), 0.80));
        assert!(gate.admit(&id("a"), &id("d"), 0.95));
    }

    #[test]
    fn override_is_strictly_greater() {
        let gate = LouvainGate::from_graph(&two_clusters(false), &GateConfig::default());
        assert!(!gate.admit(&id("a"), &id("d"), 0.92));
    }

    #[test]
    fn same_community_is_admitted_at_any_score() {
        let gate = LouvainGate::from_graph(&two_clusters(false), &GateConfig::default());
        assert!(gate.admit(&id("a"), &id("b"), 0.01));
    }

    #[test]
    fn boundary_nodes_are_admitted_across_communities() {
        let gate = LouvainGate::from_graph(&two_clusters(true), &GateConfig::default());
        assert!(gate.is_boundary(&id("b")));
        assert!(gate.is_boundary(&id("c")));
        assert!(!gate.is_boundary(&id("a")));
        assert_eq!(gate.boundary_len(), 2);

        assert!(gate.admit(&id("b"), &id("c"), 0.3));
        // Only one side on the boundary
        assert!(!gate.admit(&id("a"), &id("c"), 0.3));
    }

    #[test]
    fn unassigned_nodes_rely_on_the_override() {
        let gate = LouvainGate::from_graph(&two_clusters(true), &GateConfig::default());
        assert!(!gate.admit(&id("fresh"), &id("a"), 0.9));
        assert!(gate.admit(&id("fresh"), &id("a"), 0.93));
    }

    #[test]
    fn stats_report_admitted() {
        let stats = GateStats {
            checked: 5,
            rejected: 2,
        };
        assert_eq!(stats.admitted(), 3);
    }
}
