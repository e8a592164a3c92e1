//! Typed edge representation

use super::node::NodeId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Types of relationship the engine materializes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EdgeType {
    /// Membership in a domain or document
    BelongsTo,
    /// Fixed-format identifier citation (e.g. `OH-001`)
    Cites,
    /// Bracketed cross-reference (`[[target]]`)
    References,
    /// Title keyword found in content
    Mentions,
    /// Gated embedding similarity
    SimilarTo,
}

impl EdgeType {
    pub const ALL: [EdgeType; 5] = [
        Self::BelongsTo,
        Self::Cites,
        Self::References,
        Self::Mentions,
        Self::SimilarTo,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BelongsTo => "BELONGS_TO",
            Self::Cites => "CITES",
            Self::References => "REFERENCES",
            Self::Mentions => "MENTIONS",
            Self::SimilarTo => "SIMILAR_TO",
        }
    }
}

impl std::fmt::Display for EdgeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EdgeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown edge type: {}", s))
    }
}

/// Uniqueness key of an edge: `(source, target, type)`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EdgeKey {
    pub source: NodeId,
    pub target: NodeId,
    pub edge_type: EdgeType,
}

impl EdgeKey {
    pub fn new(source: NodeId, target: NodeId, edge_type: EdgeType) -> Self {
        Self {
            source,
            target,
            edge_type,
        }
    }

    /// True if either endpoint is `id`
    pub fn touches(&self, id: &NodeId) -> bool {
        &self.source == id || &self.target == id
    }
}

impl std::fmt::Display for EdgeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {})", self.source, self.target, self.edge_type)
    }
}

/// A directed, typed edge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub source: NodeId,
    pub target: NodeId,
    pub edge_type: EdgeType,
    /// Relationship strength; similarity edges carry the raw score
    pub weight: f64,
    pub created_at: DateTime<Utc>,
}

impl Edge {
    /// Create a new edge with the default weight of 1.0
    pub fn new(source: impl Into<NodeId>, target: impl Into<NodeId>, edge_type: EdgeType) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            edge_type,
            weight: 1.0,
            created_at: Utc::now(),
        }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn key(&self) -> EdgeKey {
        EdgeKey::new(self.source.clone(), self.target.clone(), self.edge_type)
    }

    pub fn is_self_loop(&self) -> bool {
        self.source == self.target
    }
}
