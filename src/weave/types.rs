//! Ingestion records and the similarity collaborator

use crate::graph::{Node, NodeId};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use thiserror::Error;

/// Failure reported by an external collaborator (embedding index,
/// existence check)
#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("collaborator unavailable: {0}")]
    Unavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A node-shaped record from the content collaborator, plus its raw text.
///
/// The engine never parses source files; `text` is what heuristics run on.
/// When it is empty the node's narrative is used instead.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentRecord {
    pub node: Node,
    pub text: String,
}

impl ContentRecord {
    pub fn new(node: Node, text: impl Into<String>) -> Self {
        Self {
            node,
            text: text.into(),
        }
    }

    pub fn id(&self) -> &NodeId {
        &self.node.id
    }

    /// Text the extractor matches against
    pub fn content(&self) -> &str {
        if self.text.is_empty() {
            &self.node.narrative
        } else {
            &self.text
        }
    }
}

/// One nearest-neighbor candidate from the embedding collaborator
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredNeighbor {
    pub id: NodeId,
    /// Raw similarity in [0, 1]
    pub score: f64,
}

impl ScoredNeighbor {
    pub fn new(id: impl Into<NodeId>, score: f64) -> Self {
        Self {
            id: id.into(),
            score,
        }
    }
}

/// Supplies top-K nearest neighbors with raw similarity scores.
///
/// Embedding computation is external; implementations wrap whatever
/// vector index holds the embeddings.
pub trait SimilaritySource: Send + Sync {
    fn nearest(&self, id: &NodeId) -> Result<Vec<ScoredNeighbor>, CollaboratorError>;
}

/// Similarity source backed by a fixed table of scored pairs.
///
/// Pairs are stored symmetrically. Useful for tests and for callers that
/// precompute neighbors outside the process.
#[derive(Debug, Default)]
pub struct InMemorySimilarity {
    neighbors: RwLock<HashMap<NodeId, Vec<ScoredNeighbor>>>,
}

impl InMemorySimilarity {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a symmetric score between two nodes, replacing any previous one
    pub fn insert(&self, a: impl Into<NodeId>, b: impl Into<NodeId>, score: f64) {
        let (a, b) = (a.into(), b.into());
        let mut table = self.neighbors.write().unwrap_or_else(PoisonError::into_inner);
        for (from, to) in [(&a, &b), (&b, &a)] {
            let list = table.entry(from.clone()).or_default();
            list.retain(|n| &n.id != to);
            list.push(ScoredNeighbor::new(to.clone(), score));
        }
    }
}

impl SimilaritySource for InMemorySimilarity {
    fn nearest(&self, id: &NodeId) -> Result<Vec<ScoredNeighbor>, CollaboratorError> {
        let table = self.neighbors.read().unwrap_or_else(PoisonError::into_inner);
        let mut found = table.get(id).cloned().unwrap_or_default();
        found.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(found)
    }
}
