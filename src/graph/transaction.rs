//! Staged mutations: change sets and working-copy transactions

use super::adjacency::{Direction, Graph};
use super::edge::{Edge, EdgeKey};
use super::node::{Node, NodeId};
use super::store::GraphResult;
use std::collections::{BTreeMap, BTreeSet};

/// Net effect of a batch or pass, in the form the persistence layer flushes.
///
/// Entries are kept consistent as they are recorded: removing a node drops
/// any staged upserts touching it, re-adding an item cancels its removal.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    pub upserted_nodes: BTreeMap<NodeId, Node>,
    pub upserted_edges: BTreeMap<EdgeKey, Edge>,
    pub removed_nodes: BTreeSet<NodeId>,
    pub removed_edges: BTreeSet<EdgeKey>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.upserted_nodes.is_empty()
            && self.upserted_edges.is_empty()
            && self.removed_nodes.is_empty()
            && self.removed_edges.is_empty()
    }

    pub fn record_node(&mut self, node: Node) {
        self.removed_nodes.remove(&node.id);
        self.upserted_nodes.insert(node.id.clone(), node);
    }

    pub fn record_edge(&mut self, edge: Edge) {
        let key = edge.key();
        self.removed_edges.remove(&key);
        self.upserted_edges.insert(key, edge);
    }

    pub fn record_edge_removal(&mut self, key: EdgeKey) {
        self.upserted_edges.remove(&key);
        self.removed_edges.insert(key);
    }

    pub fn record_node_removal(&mut self, id: NodeId) {
        self.upserted_nodes.remove(&id);
        self.upserted_edges.retain(|key, _| !key.touches(&id));
        self.removed_nodes.insert(id);
    }

    /// Apply this change set onto a graph.
    ///
    /// Edges whose endpoints are gone are skipped and returned as errors so
    /// the caller can log them.
    pub fn apply_to(&self, graph: &mut Graph) -> Vec<super::store::GraphError> {
        let mut errors = Vec::new();
        for key in &self.removed_edges {
            graph.remove_edge(key);
        }
        for id in &self.removed_nodes {
            graph.remove_node(id);
        }
        for node in self.upserted_nodes.values() {
            graph.put_node(node.clone());
        }
        for edge in self.upserted_edges.values() {
            // An upserted edge replaces any previous version of itself
            graph.remove_edge(&edge.key());
            if let Err(e) = graph.add_edge(edge.clone()) {
                errors.push(e);
            }
        }
        errors
    }
}

/// A private working copy of the graph plus the changes made to it.
///
/// Nothing is visible to readers or persisted until the owning store
/// commits the transaction; dropping it discards every staged change.
#[derive(Debug, Clone)]
pub struct Transaction {
    graph: Graph,
    changes: ChangeSet,
}

impl Transaction {
    pub(crate) fn new(graph: Graph) -> Self {
        Self {
            graph,
            changes: ChangeSet::new(),
        }
    }

    /// The working copy, including staged changes
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn changes(&self) -> &ChangeSet {
        &self.changes
    }

    pub fn into_changes(self) -> ChangeSet {
        self.changes
    }

    /// Insert or refresh a node; returns true if it was new
    pub fn add_node(&mut self, node: Node) -> bool {
        let id = node.id.clone();
        let is_new = self.graph.add_node(node);
        if let Some(stored) = self.graph.node(&id) {
            self.changes.record_node(stored.clone());
        }
        is_new
    }

    /// Materialize an edge; see [`Graph::add_edge`]
    pub fn add_edge(&mut self, edge: Edge) -> GraphResult<bool> {
        let added = self.graph.add_edge(edge.clone())?;
        if added {
            self.changes.record_edge(edge);
        }
        Ok(added)
    }

    pub fn remove_edge(&mut self, key: &EdgeKey) -> Option<Edge> {
        let edge = self.graph.remove_edge(key)?;
        self.changes.record_edge_removal(key.clone());
        Some(edge)
    }

    /// Remove a node, cascading to its edges
    pub fn remove_node(&mut self, id: &NodeId) -> Option<(Node, Vec<Edge>)> {
        let (node, edges) = self.graph.remove_node(id)?;
        for edge in &edges {
            self.changes.record_edge_removal(edge.key());
        }
        self.changes.record_node_removal(id.clone());
        Some((node, edges))
    }

    /// Mutate a node in place and stage the result
    pub fn update_node(&mut self, id: &NodeId, update: impl FnOnce(&mut Node)) -> bool {
        match self.graph.node_mut(id) {
            Some(node) => {
                update(node);
                let stored = node.clone();
                self.changes.record_node(stored);
                true
            }
            None => false,
        }
    }

    /// Edges incident to a node in the working copy, cloned
    pub fn edges_of(&self, id: &NodeId, direction: Direction) -> Vec<Edge> {
        self.graph.edges_of(id, direction).cloned().collect()
    }
}
