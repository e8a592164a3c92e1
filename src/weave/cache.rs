//! Extraction cache keyed by content hash
//!
//! Heuristic extraction (regex scans, tokenization) only depends on a node's
//! text, so results are reused until the text changes. Entries are keyed by
//! node id and carry the SHA-256 of the text they were computed from; a
//! different hash replaces the entry.

use crate::graph::NodeId;
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Per-node results that do not depend on the rest of the graph
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContentFeatures {
    /// Cited ids in first-occurrence order, own id excluded
    pub cites: Vec<NodeId>,
    /// `[[...]]` targets with any `|alias` removed, in first-occurrence
    /// order; resolved against the graph at extraction time
    pub references: Vec<String>,
    /// Lowercased word tokens in content order
    pub tokens: Vec<String>,
}

#[derive(Debug)]
struct Entry {
    hash: String,
    features: Arc<ContentFeatures>,
}

/// Hex SHA-256 of a text
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

/// Shared, thread-safe extraction cache; inject one per extractor
#[derive(Debug, Default)]
pub struct ExtractionCache {
    entries: DashMap<NodeId, Entry>,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl ExtractionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached features for `id` if `text` is unchanged, otherwise compute and
    /// store fresh ones
    pub fn get_or_compute(
        &self,
        id: &NodeId,
        text: &str,
        compute: impl FnOnce(&str) -> ContentFeatures,
    ) -> Arc<ContentFeatures> {
        let hash = content_hash(text);
        if let Some(entry) = self.entries.get(id) {
            if entry.hash == hash {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return entry.features.clone();
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let features = Arc::new(compute(text));
        self.entries.insert(
            id.clone(),
            Entry {
                hash,
                features: features.clone(),
            },
        );
        features
    }

    pub fn invalidate(&self, id: &NodeId) -> bool {
        self.entries.remove(id).is_some()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `(hits, misses)` since creation
    pub fn counters(&self) -> (usize, usize) {
        (
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
        )
    }
}
