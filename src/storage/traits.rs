//! Storage trait definitions

use crate::graph::{ChangeSet, Edge, EdgeKey, Node, NodeId};
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Date parsing error: {0}")]
    DateParse(String),

    #[error("Corrupt row: {0}")]
    CorruptRow(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Persistence collaborator behind the in-memory graph.
///
/// The engine treats its graph as a working-set cache over this store and
/// flushes one change set at the end of every weaving batch and gardening
/// pass. Implementations must be thread-safe (Send + Sync).
pub trait PersistentStore: Send + Sync {
    /// Insert or update a node
    fn upsert_node(&self, node: &Node) -> StorageResult<()>;

    /// Insert or update an edge, idempotent on `(source, target, type)`.
    ///
    /// Returns true if the edge did not exist before.
    fn upsert_edge(&self, edge: &Edge) -> StorageResult<bool>;

    /// Delete a node and every edge touching it
    fn delete_node(&self, id: &NodeId) -> StorageResult<bool>;

    /// Delete a single edge
    fn delete_edge(&self, key: &EdgeKey) -> StorageResult<bool>;

    /// Load every node
    fn all_nodes(&self) -> StorageResult<Vec<Node>>;

    /// Load every edge
    fn all_edges(&self) -> StorageResult<Vec<Edge>>;

    /// Apply a whole change set.
    ///
    /// Order: edge deletions, node deletions, node upserts, edge upserts.
    /// The default applies item by item; backends with transactions should
    /// override it so a failure leaves nothing partially written.
    fn flush(&self, changes: &ChangeSet) -> StorageResult<()> {
        for key in &changes.removed_edges {
            self.delete_edge(key)?;
        }
        for id in &changes.removed_nodes {
            self.delete_node(id)?;
        }
        for node in changes.upserted_nodes.values() {
            self.upsert_node(node)?;
        }
        for edge in changes.upserted_edges.values() {
            self.upsert_edge(edge)?;
        }
        Ok(())
    }
}

/// Extension trait for opening stores from paths
pub trait OpenStore: PersistentStore + Sized {
    /// Open or create a store at the given path
    fn open(path: impl AsRef<Path>) -> StorageResult<Self>;

    /// Create an in-memory store (useful for testing)
    fn open_in_memory() -> StorageResult<Self>;
}
