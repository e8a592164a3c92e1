//! Node representation in the content graph

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Stable identifier for a node
///
/// Derived from a content fingerprint or a source path, so re-ingesting the
/// same source yields the same id. Serializes as a plain string.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Create a NodeId from a string
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the inner string value
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// What a node stands for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    /// A chunk of source content (file, section)
    Content,
    /// A whole document
    Document,
    /// An extracted entity (person, term, concept)
    Entity,
    /// A domain grouping node
    Domain,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Content => "content",
            Self::Document => "document",
            Self::Entity => "entity",
            Self::Domain => "domain",
        }
    }

    /// Content and documents are backed by a file; entities and domains are derived.
    pub fn has_backing_source(&self) -> bool {
        matches!(self, Self::Content | Self::Document)
    }
}

impl std::str::FromStr for NodeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "content" => Ok(Self::Content),
            "document" => Ok(Self::Document),
            "entity" => Ok(Self::Entity),
            "domain" => Ok(Self::Domain),
            other => Err(format!("unknown node kind: {}", other)),
        }
    }
}

/// Cached centrality scores, written by the gardener
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CentralityScores {
    pub pagerank: f64,
    pub betweenness: f64,
}

/// A node in the content graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Stable identifier
    pub id: NodeId,
    pub kind: NodeKind,
    /// Human-readable title, source of MENTIONS keywords
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub layer: Option<String>,
    /// Extracted summary text
    #[serde(default)]
    pub narrative: String,
    #[serde(default)]
    pub external_refs: Vec<String>,
    /// Calendar date from the source's metadata; orders timeline suggestions
    #[serde(default)]
    pub date: Option<NaiveDate>,
    /// Community assigned by the last gardening pass
    #[serde(default)]
    pub community_id: Option<u32>,
    /// Centrality cached by the last gardening pass
    #[serde(default)]
    pub centrality: Option<CentralityScores>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Node {
    /// Create a new node with the given id and kind
    pub fn new(id: impl Into<NodeId>, kind: NodeKind) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            kind,
            title: String::new(),
            domain: String::new(),
            layer: None,
            narrative: String::new(),
            external_refs: Vec::new(),
            date: None,
            community_id: None,
            centrality: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = domain.into();
        self
    }

    pub fn with_layer(mut self, layer: impl Into<String>) -> Self {
        self.layer = Some(layer.into());
        self
    }

    pub fn with_narrative(mut self, narrative: impl Into<String>) -> Self {
        self.narrative = narrative.into();
        self
    }

    pub fn with_external_ref(mut self, reference: impl Into<String>) -> Self {
        self.external_refs.push(reference.into());
        self
    }

    pub fn with_date(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }

    /// Overwrite the content-derived fields from a re-ingested record.
    ///
    /// Identity, creation time and the gardener's derived fields
    /// (community, centrality) are kept.
    pub fn refresh_from(&mut self, incoming: &Node) {
        self.kind = incoming.kind;
        self.title = incoming.title.clone();
        self.domain = incoming.domain.clone();
        self.layer = incoming.layer.clone();
        self.narrative = incoming.narrative.clone();
        self.external_refs = incoming.external_refs.clone();
        self.date = incoming.date;
        self.updated_at = Utc::now();
    }

    /// Identity used to detect duplicate nodes: slugged title plus domain.
    ///
    /// Nodes without a title have no normalized identity and are never merged.
    pub fn normalized_identity(&self) -> Option<(String, String)> {
        let slug = slugify(&self.title);
        if slug.is_empty() {
            return None;
        }
        Some((slug, self.domain.trim().to_lowercase()))
    }
}

/// Lowercase, alphanumeric runs joined by single dashes.
pub fn slugify(text: &str) -> String {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(|part| part.to_lowercase())
        .collect::<Vec<_>>()
        .join("-")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_id_serializes_as_string() {
        let id = NodeId::from_string("docs/intro.md");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"docs/intro.md\"");
    }

    #[test]
    fn slugify_collapses_punctuation_and_case() {
        assert_eq!(slugify("Circular  Logic!"), "circular-logic");
        assert_eq!(slugify("  --Michelle_Robertson-- "), "michelle-robertson");
        assert_eq!(slugify("***"), "");
    }

    #[test]
    fn normalized_identity_uses_title_and_domain() {
        let a = Node::new("a", NodeKind::Document)
            .with_title("Circular Logic")
            .with_domain("Philosophy");
        let b = Node::new("b", NodeKind::Document)
            .with_title("circular-logic")
            .with_domain("philosophy ");
        assert_eq!(a.normalized_identity(), b.normalized_identity());

        let untitled = Node::new("c", NodeKind::Document);
        assert_eq!(untitled.normalized_identity(), None);
    }

    #[test]
    fn refresh_keeps_identity_and_derived_fields() {
        let mut node = Node::new("n", NodeKind::Content).with_narrative("old");
        node.community_id = Some(3);
        let created = node.created_at;

        let incoming = Node::new("n", NodeKind::Content)
            .with_narrative("new")
            .with_external_ref("https://example.org");
        node.refresh_from(&incoming);

        assert_eq!(node.narrative, "new");
        assert_eq!(node.external_refs, vec!["https://example.org".to_string()]);
        assert_eq!(node.community_id, Some(3));
        assert_eq!(node.created_at, created);
    }

    #[test]
    fn only_content_and_documents_have_backing_sources() {
        assert!(NodeKind::Content.has_backing_source());
        assert!(NodeKind::Document.has_backing_source());
        assert!(!NodeKind::Entity.has_backing_source());
        assert!(!NodeKind::Domain.has_backing_source());
        assert_eq!("entity".parse::<NodeKind>(), Ok(NodeKind::Entity));
    }
}
