//! Typed multigraph with bidirectional adjacency indices

use super::edge::{Edge, EdgeKey, EdgeType};
use super::node::{Node, NodeId};
use super::store::{GraphError, GraphResult};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

/// Which side of a node's adjacency to walk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    /// Edges leaving the node
    Outgoing,
    /// Edges arriving at the node
    Incoming,
    /// Both directions
    #[default]
    Both,
}

/// In-memory typed multigraph.
///
/// Nodes and edges are keyed for O(1) lookup; each node keeps its incident
/// edge keys in both directions so neighbor iteration is O(degree).
/// At most one edge exists per `(source, target, type)`.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    nodes: HashMap<NodeId, Node>,
    edges: HashMap<EdgeKey, Edge>,
    outgoing: HashMap<NodeId, BTreeSet<EdgeKey>>,
    incoming: HashMap<NodeId, BTreeSet<EdgeKey>>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a node, or refresh an existing node's content fields in place.
    ///
    /// Returns true if the node was new. Existing edges are left untouched.
    pub fn add_node(&mut self, node: Node) -> bool {
        match self.nodes.get_mut(&node.id) {
            Some(existing) => {
                existing.refresh_from(&node);
                false
            }
            None => {
                self.put_node(node);
                true
            }
        }
    }

    /// Store a node exactly as given, replacing any previous version.
    pub fn put_node(&mut self, node: Node) {
        self.outgoing.entry(node.id.clone()).or_default();
        self.incoming.entry(node.id.clone()).or_default();
        self.nodes.insert(node.id.clone(), node);
    }

    /// Materialize an edge.
    ///
    /// Returns `Ok(true)` if the edge is new and `Ok(false)` if an edge with
    /// the same `(source, target, type)` already exists. A missing endpoint
    /// rejects the edge rather than creating a dangling node.
    pub fn add_edge(&mut self, edge: Edge) -> GraphResult<bool> {
        for endpoint in [&edge.source, &edge.target] {
            if !self.nodes.contains_key(endpoint) {
                return Err(GraphError::NodeNotFound(endpoint.clone()));
            }
        }
        if edge.edge_type == EdgeType::SimilarTo && edge.is_self_loop() {
            return Err(GraphError::SelfLoop(edge.source.clone()));
        }

        let key = edge.key();
        if self.edges.contains_key(&key) {
            return Ok(false);
        }
        self.outgoing
            .entry(key.source.clone())
            .or_default()
            .insert(key.clone());
        self.incoming
            .entry(key.target.clone())
            .or_default()
            .insert(key.clone());
        self.edges.insert(key, edge);
        Ok(true)
    }

    /// Remove a single edge
    pub fn remove_edge(&mut self, key: &EdgeKey) -> Option<Edge> {
        let edge = self.edges.remove(key)?;
        if let Some(keys) = self.outgoing.get_mut(&key.source) {
            keys.remove(key);
        }
        if let Some(keys) = self.incoming.get_mut(&key.target) {
            keys.remove(key);
        }
        Some(edge)
    }

    /// Remove a node and every edge touching it.
    ///
    /// Returns the removed node together with the cascaded edges.
    pub fn remove_node(&mut self, id: &NodeId) -> Option<(Node, Vec<Edge>)> {
        let node = self.nodes.remove(id)?;
        let mut touching: BTreeSet<EdgeKey> = BTreeSet::new();
        if let Some(keys) = self.outgoing.remove(id) {
            touching.extend(keys);
        }
        if let Some(keys) = self.incoming.remove(id) {
            touching.extend(keys);
        }
        let removed = touching
            .iter()
            .filter_map(|key| self.remove_edge(key))
            .collect();
        Some((node, removed))
    }

    /// Distinct neighbor ids in the given direction, sorted by id.
    pub fn neighbors(&self, id: &NodeId, direction: Direction) -> Vec<NodeId> {
        let ids: BTreeSet<NodeId> = self
            .incident_keys(id, direction)
            .map(|key| {
                if &key.source == id {
                    key.target.clone()
                } else {
                    key.source.clone()
                }
            })
            .collect();
        ids.into_iter().collect()
    }

    /// Edges incident to a node in the given direction
    pub fn edges_of<'a>(
        &'a self,
        id: &NodeId,
        direction: Direction,
    ) -> impl Iterator<Item = &'a Edge> + 'a {
        let keys: Vec<&EdgeKey> = self.incident_keys(id, direction).collect();
        keys.into_iter().filter_map(move |key| self.edges.get(key))
    }

    fn incident_keys<'a>(
        &'a self,
        id: &NodeId,
        direction: Direction,
    ) -> impl Iterator<Item = &'a EdgeKey> + 'a {
        let out = match direction {
            Direction::Outgoing | Direction::Both => self.outgoing.get(id),
            Direction::Incoming => None,
        };
        let inc = match direction {
            Direction::Incoming | Direction::Both => self.incoming.get(id),
            Direction::Outgoing => None,
        };
        out.into_iter().flatten().chain(inc.into_iter().flatten())
    }

    /// Number of incident edges (in + out)
    pub fn degree(&self, id: &NodeId) -> usize {
        self.outgoing.get(id).map_or(0, BTreeSet::len) + self.incoming.get(id).map_or(0, BTreeSet::len)
    }

    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn node_mut(&mut self, id: &NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id)
    }

    pub fn contains_node(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn edge(&self, key: &EdgeKey) -> Option<&Edge> {
        self.edges.get(key)
    }

    pub fn contains_edge(&self, key: &EdgeKey) -> bool {
        self.edges.contains_key(key)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.values()
    }

    /// Edges in ascending key order, for reproducible accumulation
    pub fn sorted_edges(&self) -> Vec<&Edge> {
        let mut edges: Vec<&Edge> = self.edges.values().collect();
        edges.sort_by(|a, b| {
            (&a.source, &a.target, a.edge_type).cmp(&(&b.source, &b.target, b.edge_type))
        });
        edges
    }

    /// Shortest directed path by hop count, endpoints included.
    ///
    /// BFS over outgoing edges; neighbors are visited in id order so ties
    /// resolve to the lexicographically smallest path. `None` if either node
    /// is missing or `to` is unreachable.
    pub fn shortest_path(&self, from: &NodeId, to: &NodeId) -> Option<Vec<NodeId>> {
        if !self.contains_node(from) || !self.contains_node(to) {
            return None;
        }
        if from == to {
            return Some(vec![from.clone()]);
        }

        let mut parent: HashMap<NodeId, NodeId> = HashMap::new();
        let mut queue = VecDeque::from([from.clone()]);
        while let Some(current) = queue.pop_front() {
            for next in self.neighbors(&current, Direction::Outgoing) {
                if &next == from || parent.contains_key(&next) {
                    continue;
                }
                parent.insert(next.clone(), current.clone());
                if &next == to {
                    let mut path = vec![next];
                    while let Some(step) = parent.get(&path[path.len() - 1]) {
                        path.push(step.clone());
                    }
                    path.reverse();
                    return Some(path);
                }
                queue.push_back(next);
            }
        }
        None
    }

    /// Weakly connected components.
    ///
    /// Members are sorted by id and components are ordered by their smallest
    /// member.
    pub fn components(&self) -> Vec<Vec<NodeId>> {
        let mut seen: HashSet<NodeId> = HashSet::new();
        let mut components = Vec::new();
        for start in self.sorted_node_ids() {
            if !seen.insert(start.clone()) {
                continue;
            }
            let mut members = vec![start.clone()];
            let mut queue = VecDeque::from([start]);
            while let Some(current) = queue.pop_front() {
                for next in self.neighbors(&current, Direction::Both) {
                    if seen.insert(next.clone()) {
                        members.push(next.clone());
                        queue.push_back(next);
                    }
                }
            }
            members.sort();
            components.push(members);
        }
        components
    }

    /// All node ids in ascending order
    pub fn sorted_node_ids(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self.nodes.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }
}
