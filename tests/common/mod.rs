//! Shared helpers for graphweave integration tests
//!
//! Seeded random graphs plus persistence stubs that fail or block on demand.

#![allow(dead_code)]

use graphweave::graph::{ChangeSet, Graph};
use graphweave::{
    ContentRecord, Edge, EdgeKey, EdgeType, Node, NodeId, NodeKind, OpenStore, PersistentStore,
    SqliteStore, StorageError, StorageResult,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Mutex;

pub fn record(id: &str, text: &str) -> ContentRecord {
    ContentRecord::new(Node::new(id, NodeKind::Content), text)
}

pub fn titled(id: &str, title: &str, text: &str) -> ContentRecord {
    ContentRecord::new(Node::new(id, NodeKind::Document).with_title(title), text)
}

const EDGE_TYPES: [EdgeType; 4] = [
    EdgeType::Cites,
    EdgeType::References,
    EdgeType::Mentions,
    EdgeType::SimilarTo,
];

/// Random nodes and edges from a fixed seed; no self-loops
pub fn random_parts(seed: u64, nodes: usize, edges: usize) -> (Vec<Node>, Vec<Edge>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let ids: Vec<String> = (0..nodes).map(|i| format!("n{:03}", i)).collect();
    let node_list = ids
        .iter()
        .map(|id| Node::new(id.as_str(), NodeKind::Content))
        .collect();

    let mut edge_list = Vec::with_capacity(edges);
    while edge_list.len() < edges && nodes > 1 {
        let a = rng.gen_range(0..nodes);
        let b = rng.gen_range(0..nodes);
        if a == b {
            continue;
        }
        let edge_type = EDGE_TYPES[rng.gen_range(0..EDGE_TYPES.len())];
        let weight: f64 = rng.gen_range(0.05..1.0);
        edge_list.push(Edge::new(ids[a].as_str(), ids[b].as_str(), edge_type).with_weight(weight));
    }
    (node_list, edge_list)
}

pub fn random_graph(seed: u64, nodes: usize, edges: usize) -> Graph {
    let (node_list, edge_list) = random_parts(seed, nodes, edges);
    let mut graph = Graph::new();
    for node in node_list {
        graph.add_node(node);
    }
    for edge in edge_list {
        graph.add_edge(edge).unwrap();
    }
    graph
}

/// SQLite store that can be switched to refuse every write
pub struct FlakyStore {
    inner: SqliteStore,
    down: AtomicBool,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self {
            inner: SqliteStore::open_in_memory().unwrap(),
            down: AtomicBool::new(false),
        }
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    fn check(&self) -> StorageResult<()> {
        if self.down.load(Ordering::SeqCst) {
            Err(StorageError::Unavailable("database offline".into()))
        } else {
            Ok(())
        }
    }
}

impl PersistentStore for FlakyStore {
    fn upsert_node(&self, node: &Node) -> StorageResult<()> {
        self.check()?;
        self.inner.upsert_node(node)
    }

    fn upsert_edge(&self, edge: &Edge) -> StorageResult<bool> {
        self.check()?;
        self.inner.upsert_edge(edge)
    }

    fn delete_node(&self, id: &NodeId) -> StorageResult<bool> {
        self.check()?;
        self.inner.delete_node(id)
    }

    fn delete_edge(&self, key: &EdgeKey) -> StorageResult<bool> {
        self.check()?;
        self.inner.delete_edge(key)
    }

    fn all_nodes(&self) -> StorageResult<Vec<Node>> {
        self.inner.all_nodes()
    }

    fn all_edges(&self) -> StorageResult<Vec<Edge>> {
        self.inner.all_edges()
    }

    fn flush(&self, changes: &ChangeSet) -> StorageResult<()> {
        self.check()?;
        self.inner.flush(changes)
    }
}

/// SQLite store whose first flush blocks until released.
///
/// `entered` fires once the flush has started; sending on `release`
/// lets it proceed. Later flushes pass straight through.
pub struct GatedStore {
    inner: SqliteStore,
    entered: Mutex<Option<mpsc::Sender<()>>>,
    release: Mutex<Option<mpsc::Receiver<()>>>,
    fail_gated: bool,
}

impl GatedStore {
    pub fn new() -> (Self, mpsc::Receiver<()>, mpsc::Sender<()>) {
        Self::build(false)
    }

    /// Like `new`, but the gated flush fails with `Unavailable` once released
    pub fn failing() -> (Self, mpsc::Receiver<()>, mpsc::Sender<()>) {
        Self::build(true)
    }

    fn build(fail_gated: bool) -> (Self, mpsc::Receiver<()>, mpsc::Sender<()>) {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let store = Self {
            inner: SqliteStore::open_in_memory().unwrap(),
            entered: Mutex::new(Some(entered_tx)),
            release: Mutex::new(Some(release_rx)),
            fail_gated,
        };
        (store, entered_rx, release_tx)
    }
}

impl PersistentStore for GatedStore {
    fn upsert_node(&self, node: &Node) -> StorageResult<()> {
        self.inner.upsert_node(node)
    }

    fn upsert_edge(&self, edge: &Edge) -> StorageResult<bool> {
        self.inner.upsert_edge(edge)
    }

    fn delete_node(&self, id: &NodeId) -> StorageResult<bool> {
        self.inner.delete_node(id)
    }

    fn delete_edge(&self, key: &EdgeKey) -> StorageResult<bool> {
        self.inner.delete_edge(key)
    }

    fn all_nodes(&self) -> StorageResult<Vec<Node>> {
        self.inner.all_nodes()
    }

    fn all_edges(&self) -> StorageResult<Vec<Edge>> {
        self.inner.all_edges()
    }

    fn flush(&self, changes: &ChangeSet) -> StorageResult<()> {
        let entered = self.entered.lock().unwrap().take();
        if let Some(entered) = entered {
            entered.send(()).unwrap();
            let release = self.release.lock().unwrap().take();
            if let Some(release) = release {
                release.recv().unwrap();
            }
            if self.fail_gated {
                return Err(StorageError::Unavailable("gated flush refused".into()));
            }
        }
        self.inner.flush(changes)
    }
}
