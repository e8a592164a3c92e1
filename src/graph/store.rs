//! GraphStore: the canonical, shared in-memory graph

use super::adjacency::{Direction, Graph};
use super::edge::{Edge, EdgeType};
use super::node::{CentralityScores, Node, NodeId};
use super::transaction::{ChangeSet, Transaction};
use crate::storage::{PersistentStore, StorageError};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors that can occur in graph operations
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("Similarity self-loop on {0}")]
    SelfLoop(NodeId),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(#[from] StorageError),
}

/// Result type for graph operations
pub type GraphResult<T> = Result<T, GraphError>;

/// Whether a direct mutation took effect now or was queued behind an
/// active analysis pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied<T> {
    Now(T),
    Deferred,
}

/// Counts describing a committed change set
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitSummary {
    pub nodes_upserted: usize,
    pub edges_upserted: usize,
    pub nodes_removed: usize,
    pub edges_removed: usize,
    /// True if the in-memory merge waits for an analysis pass to finish
    pub deferred: bool,
}

/// Aggregate statistics over the current graph
#[derive(Debug, Clone, PartialEq)]
pub struct GraphStats {
    pub nodes: usize,
    pub edges: usize,
    /// `edges / (n·(n−1))`
    pub density: f64,
    pub edges_by_type: BTreeMap<EdgeType, usize>,
}

#[derive(Debug)]
enum DeferredMutation {
    AddNode(Node),
    AddEdge(Edge),
    RemoveNode(NodeId),
    Merge(ChangeSet),
}

#[derive(Debug, Default)]
struct AnalysisState {
    active: usize,
    queue: Vec<DeferredMutation>,
}

/// Owns the canonical graph.
///
/// Readers take a short-held shared lock to clone an `Arc` of the current
/// graph; writers replace it copy-on-write. While an analysis guard is
/// alive, mutations are queued and merged once the last guard drops.
pub struct GraphStore {
    graph: RwLock<Arc<Graph>>,
    persistence: Arc<dyn PersistentStore>,
    analysis: Mutex<AnalysisState>,
}

impl GraphStore {
    /// Create an empty store over the given persistence collaborator
    pub fn new(persistence: Arc<dyn PersistentStore>) -> Self {
        Self {
            graph: RwLock::new(Arc::new(Graph::new())),
            persistence,
            analysis: Mutex::new(AnalysisState::default()),
        }
    }

    /// Hydrate the working set from the persistence collaborator.
    ///
    /// Edges whose endpoints are missing are skipped with a warning.
    pub fn load(persistence: Arc<dyn PersistentStore>) -> GraphResult<Self> {
        let nodes = persistence.all_nodes()?;
        let edges = persistence.all_edges()?;

        let mut graph = Graph::new();
        for node in nodes {
            graph.put_node(node);
        }
        let mut skipped = 0usize;
        for edge in edges {
            let key = edge.key();
            if let Err(e) = graph.add_edge(edge) {
                debug!(edge = %key, error = %e, "skipping stored edge");
                skipped += 1;
            }
        }
        if skipped > 0 {
            warn!(skipped, "stored edges rejected while loading graph");
        }
        info!(
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            "graph loaded"
        );

        Ok(Self {
            graph: RwLock::new(Arc::new(graph)),
            persistence,
            analysis: Mutex::new(AnalysisState::default()),
        })
    }

    // === Read API ===

    /// Immutable view of the current graph
    pub fn snapshot(&self) -> Arc<Graph> {
        self.graph
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn node(&self, id: &NodeId) -> Option<Node> {
        self.snapshot().node(id).cloned()
    }

    pub fn neighbors(&self, id: &NodeId, direction: Direction) -> Vec<NodeId> {
        self.snapshot().neighbors(id, direction)
    }

    pub fn degree(&self, id: &NodeId) -> usize {
        self.snapshot().degree(id)
    }

    /// Directed shortest path, endpoints included
    pub fn shortest_path(&self, from: &NodeId, to: &NodeId) -> Option<Vec<NodeId>> {
        self.snapshot().shortest_path(from, to)
    }

    pub fn components(&self) -> Vec<Vec<NodeId>> {
        self.snapshot().components()
    }

    pub fn community_of(&self, id: &NodeId) -> Option<u32> {
        self.snapshot().node(id).and_then(|n| n.community_id)
    }

    pub fn centrality_of(&self, id: &NodeId) -> Option<CentralityScores> {
        self.snapshot().node(id).and_then(|n| n.centrality)
    }

    /// Active nodes grouped by community; members sorted by id.
    ///
    /// Nodes without an assignment are not listed.
    pub fn communities(&self) -> BTreeMap<u32, Vec<NodeId>> {
        let snapshot = self.snapshot();
        let mut groups: BTreeMap<u32, Vec<NodeId>> = BTreeMap::new();
        for node in snapshot.nodes() {
            if let Some(community) = node.community_id {
                groups.entry(community).or_default().push(node.id.clone());
            }
        }
        for members in groups.values_mut() {
            members.sort();
        }
        groups
    }

    pub fn stats(&self) -> GraphStats {
        let snapshot = self.snapshot();
        let n = snapshot.node_count();
        let mut edges_by_type = BTreeMap::new();
        for edge in snapshot.edges() {
            *edges_by_type.entry(edge.edge_type).or_insert(0) += 1;
        }
        let possible = (n * n.saturating_sub(1)).max(1);
        GraphStats {
            nodes: n,
            edges: snapshot.edge_count(),
            density: snapshot.edge_count() as f64 / possible as f64,
            edges_by_type,
        }
    }

    // === Direct mutations ===

    /// Insert or refresh a single node, persisting it immediately
    pub fn add_node(&self, node: Node) -> GraphResult<Applied<bool>> {
        if let Some(node) = self.try_defer(DeferredMutation::AddNode, node) {
            let mut guard = self.graph.write().unwrap_or_else(PoisonError::into_inner);
            let graph = Arc::make_mut(&mut guard);
            let id = node.id.clone();
            let mut staged = graph.node(&id).cloned().unwrap_or_else(|| node.clone());
            let is_new = !graph.contains_node(&id);
            if !is_new {
                staged.refresh_from(&node);
            }
            self.persistence.upsert_node(&staged)?;
            graph.put_node(staged);
            return Ok(Applied::Now(is_new));
        }
        Ok(Applied::Deferred)
    }

    /// Materialize a single edge, persisting it immediately.
    ///
    /// Returns whether it was newly materialized; re-insertion is a no-op.
    pub fn add_edge(&self, edge: Edge) -> GraphResult<Applied<bool>> {
        if let Some(edge) = self.try_defer(DeferredMutation::AddEdge, edge) {
            let mut guard = self.graph.write().unwrap_or_else(PoisonError::into_inner);
            let graph = Arc::make_mut(&mut guard);
            let key = edge.key();
            let added = graph.add_edge(edge.clone())?;
            if added {
                if let Err(e) = self.persistence.upsert_edge(&edge) {
                    graph.remove_edge(&key);
                    return Err(e.into());
                }
            }
            return Ok(Applied::Now(added));
        }
        Ok(Applied::Deferred)
    }

    /// Remove a node and cascade to its edges
    pub fn remove_node(&self, id: &NodeId) -> GraphResult<Applied<bool>> {
        if let Some(id) = self.try_defer(DeferredMutation::RemoveNode, id.clone()) {
            let mut guard = self.graph.write().unwrap_or_else(PoisonError::into_inner);
            if !guard.contains_node(&id) {
                return Ok(Applied::Now(false));
            }
            self.persistence.delete_node(&id)?;
            Arc::make_mut(&mut guard).remove_node(&id);
            return Ok(Applied::Now(true));
        }
        Ok(Applied::Deferred)
    }

    /// Queue the mutation if an analysis pass is active, otherwise hand the
    /// payload back so the caller applies it.
    fn try_defer<T>(&self, wrap: impl FnOnce(T) -> DeferredMutation, payload: T) -> Option<T> {
        let mut state = self.analysis.lock().unwrap_or_else(PoisonError::into_inner);
        if state.active > 0 {
            state.queue.push(wrap(payload));
            debug!(queued = state.queue.len(), "mutation deferred behind analysis");
            None
        } else {
            Some(payload)
        }
    }

    // === Transactions ===

    /// Start a transaction over a private copy of the current graph
    pub fn begin(&self) -> Transaction {
        Transaction::new(self.snapshot().as_ref().clone())
    }

    /// Flush a transaction to persistence, then publish it.
    ///
    /// If the flush fails nothing is published and the error is returned.
    pub fn commit(&self, tx: Transaction) -> GraphResult<CommitSummary> {
        let changes = tx.into_changes();
        let mut summary = CommitSummary {
            nodes_upserted: changes.upserted_nodes.len(),
            edges_upserted: changes.upserted_edges.len(),
            nodes_removed: changes.removed_nodes.len(),
            edges_removed: changes.removed_edges.len(),
            deferred: false,
        };
        if changes.is_empty() {
            return Ok(summary);
        }

        self.persistence.flush(&changes)?;

        if let Some(changes) = self.try_defer(DeferredMutation::Merge, changes) {
            self.publish(&changes);
        } else {
            summary.deferred = true;
        }
        Ok(summary)
    }

    fn publish(&self, changes: &ChangeSet) {
        let mut guard = self.graph.write().unwrap_or_else(PoisonError::into_inner);
        let errors = changes.apply_to(Arc::make_mut(&mut guard));
        for e in errors {
            warn!(error = %e, "dropping change that no longer applies");
        }
    }

    // === Analysis guard ===

    /// Mark an analysis pass as active.
    ///
    /// Until the returned guard drops, mutations are queued rather than
    /// applied, so the analyzed snapshot and the live graph cannot diverge
    /// mid-pass.
    pub fn begin_analysis(&self) -> AnalysisGuard<'_> {
        let mut state = self.analysis.lock().unwrap_or_else(PoisonError::into_inner);
        state.active += 1;
        AnalysisGuard { store: self }
    }

    pub fn analysis_active(&self) -> bool {
        self.analysis
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .active
            > 0
    }

    fn end_analysis(&self) {
        let queue = {
            let mut state = self.analysis.lock().unwrap_or_else(PoisonError::into_inner);
            state.active = state.active.saturating_sub(1);
            if state.active > 0 {
                return;
            }
            std::mem::take(&mut state.queue)
        };
        if queue.is_empty() {
            return;
        }
        debug!(count = queue.len(), "merging deferred mutations");
        for mutation in queue {
            if let Err(e) = self.replay(mutation) {
                warn!(error = %e, "deferred mutation dropped");
            }
        }
    }

    fn replay(&self, mutation: DeferredMutation) -> GraphResult<()> {
        match mutation {
            DeferredMutation::AddNode(node) => self.add_node(node).map(|_| ()),
            DeferredMutation::AddEdge(edge) => self.add_edge(edge).map(|_| ()),
            DeferredMutation::RemoveNode(id) => self.remove_node(&id).map(|_| ()),
            DeferredMutation::Merge(changes) => {
                self.publish(&changes);
                Ok(())
            }
        }
    }
}

/// RAII marker for an active analysis pass; see [`GraphStore::begin_analysis`]
pub struct AnalysisGuard<'a> {
    store: &'a GraphStore,
}

impl AnalysisGuard<'_> {
    /// The snapshot being analyzed
    pub fn snapshot(&self) -> Arc<Graph> {
        self.store.snapshot()
    }
}

impl Drop for AnalysisGuard<'_> {
    fn drop(&mut self) {
        self.store.end_analysis();
    }
}
