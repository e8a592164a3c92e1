//! CandidateExtractor: typed candidate edges from content heuristics
//!
//! Candidates are produced in a fixed order so diagnostics are
//! reproducible: CITES, REFERENCES, MENTIONS, then gated SIMILAR_TO.

use super::cache::{ContentFeatures, ExtractionCache};
use super::gate::{GateStats, LouvainGate};
use super::types::{ContentRecord, SimilaritySource};
use crate::config::{ConfigError, ExtractorConfig};
use crate::graph::{slugify, Edge, EdgeType, Graph, NodeId};
use regex_lite::Regex;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Curated words that never count as title keywords
pub const STOP_WORDS: &[&str] = &[
    "about", "above", "after", "again", "against", "also", "because", "been", "before", "being",
    "below", "between", "both", "could", "does", "doing", "down", "during", "each", "from",
    "further", "have", "having", "here", "into", "itself", "just", "more", "most", "only",
    "other", "over", "same", "should", "some", "such", "than", "that", "their", "them", "then",
    "there", "these", "they", "this", "those", "through", "under", "until", "very", "were",
    "what", "when", "where", "which", "while", "will", "with", "would", "your", "notes", "note",
    "overview", "introduction", "index", "readme", "draft", "todo", "untitled",
];

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Extraction failed for {node:?}: {reason}")]
    ExtractionFailure { node: NodeId, reason: String },
}

/// A transient typed edge proposal
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub source: NodeId,
    pub target: NodeId,
    pub edge_type: EdgeType,
    /// 1.0 for heuristic edges, the raw similarity for SIMILAR_TO
    pub score: f64,
}

impl Candidate {
    fn heuristic(source: &NodeId, target: NodeId, edge_type: EdgeType) -> Self {
        Self {
            source: source.clone(),
            target,
            edge_type,
            score: 1.0,
        }
    }

    pub fn into_edge(self) -> Edge {
        Edge::new(self.source, self.target, self.edge_type).with_weight(self.score)
    }
}

/// Title lookups over a graph: an inverted keyword → node index for
/// MENTIONS and a title-slug index for resolving `[[...]]` references
#[derive(Debug, Clone, Default)]
pub struct MentionIndex {
    keywords: HashMap<String, BTreeSet<NodeId>>,
    slugs: HashMap<String, BTreeSet<NodeId>>,
    ids: HashSet<NodeId>,
}

impl MentionIndex {
    /// Nodes whose title carries `keyword`, ascending by id
    pub fn lookup(&self, keyword: &str) -> impl Iterator<Item = &NodeId> {
        self.keywords.get(keyword).into_iter().flatten()
    }

    pub fn keyword_count(&self) -> usize {
        self.keywords.len()
    }

    /// Resolve an alias-stripped reference target to a node id.
    ///
    /// Tried in order: the target as an id, the target without its file
    /// extension as an id, then a node whose title slugs the same (smallest
    /// id wins). Unresolved targets fall back to the extension-stripped
    /// literal, which the store rejects if no such node exists.
    pub fn resolve_reference(&self, target: &str) -> NodeId {
        let literal = NodeId::from(target);
        if self.ids.contains(&literal) {
            return literal;
        }
        let stem = NodeId::from(strip_extension(target));
        if self.ids.contains(&stem) {
            return stem;
        }
        self.slugs
            .get(&slugify(stem.as_str()))
            .and_then(|ids| ids.iter().next())
            .cloned()
            .unwrap_or(stem)
    }
}

/// Lowercased alphanumeric runs
fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

/// Drop an optional `|alias`; `None` if nothing is left
fn reference_target(raw: &str) -> Option<&str> {
    let target = raw.split('|').next().unwrap_or(raw).trim();
    if target.is_empty() {
        None
    } else {
        Some(target)
    }
}

/// Drop a trailing `.ext` made of ASCII alphanumerics
fn strip_extension(target: &str) -> &str {
    match target.rsplit_once('.') {
        Some((stem, ext))
            if !stem.is_empty() && !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            stem
        }
        _ => target,
    }
}

pub struct CandidateExtractor {
    citation_patterns: Vec<Regex>,
    wikilink: Regex,
    stop_words: HashSet<String>,
    min_keyword_len: usize,
    cache: Arc<ExtractionCache>,
    similarity: Option<Arc<dyn SimilaritySource>>,
}

impl CandidateExtractor {
    pub fn new(config: &ExtractorConfig, cache: Arc<ExtractionCache>) -> Result<Self, ConfigError> {
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|e| ConfigError::InvalidPattern {
                pattern: pattern.to_string(),
                message: e.to_string(),
            })
        };
        let citation_patterns = config
            .citation_patterns
            .iter()
            .map(|p| compile(p))
            .collect::<Result<Vec<_>, _>>()?;

        let stop_words = STOP_WORDS
            .iter()
            .map(|w| w.to_string())
            .chain(config.extra_stop_words.iter().map(|w| w.to_lowercase()))
            .collect();

        Ok(Self {
            citation_patterns,
            wikilink: compile(r"\[\[([^\]]+)\]\]")?,
            stop_words,
            min_keyword_len: config.min_keyword_len,
            cache,
            similarity: None,
        })
    }

    /// Attach the embedding collaborator; without one no SIMILAR_TO
    /// candidates are produced
    pub fn with_similarity(mut self, source: Arc<dyn SimilaritySource>) -> Self {
        self.similarity = Some(source);
        self
    }

    pub fn cache(&self) -> &Arc<ExtractionCache> {
        &self.cache
    }

    /// Title keywords eligible for MENTIONS matching
    pub fn keywords(&self, title: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        tokenize(title)
            .into_iter()
            .filter(|w| w.chars().count() >= self.min_keyword_len)
            .filter(|w| !self.stop_words.contains(w))
            .filter(|w| seen.insert(w.clone()))
            .collect()
    }

    pub fn mention_index(&self, graph: &Graph) -> MentionIndex {
        let mut index = MentionIndex::default();
        for node in graph.nodes() {
            index.ids.insert(node.id.clone());
            let slug = slugify(&node.title);
            if !slug.is_empty() {
                index.slugs.entry(slug).or_default().insert(node.id.clone());
            }
            for keyword in self.keywords(&node.title) {
                index
                    .keywords
                    .entry(keyword)
                    .or_default()
                    .insert(node.id.clone());
            }
        }
        index
    }

    fn compute_features(&self, own_id: &NodeId, text: &str) -> ContentFeatures {
        let mut cites = Vec::new();
        let mut seen = HashSet::new();
        for pattern in &self.citation_patterns {
            for found in pattern.find_iter(text) {
                let id = NodeId::from(found.as_str());
                if &id != own_id && seen.insert(id.clone()) {
                    cites.push(id);
                }
            }
        }

        let mut references = Vec::new();
        let mut seen = HashSet::new();
        for caps in self.wikilink.captures_iter(text) {
            if let Some(target) = caps.get(1).and_then(|m| reference_target(m.as_str())) {
                if seen.insert(target.to_string()) {
                    references.push(target.to_string());
                }
            }
        }

        ContentFeatures {
            cites,
            references,
            tokens: tokenize(text),
        }
    }

    /// Content-derived features for a record, served from the cache when the
    /// text is unchanged
    pub fn features(&self, record: &ContentRecord) -> Arc<ContentFeatures> {
        let id = record.id();
        self.cache
            .get_or_compute(id, record.content(), |text| self.compute_features(id, text))
    }

    /// All candidates for one record.
    ///
    /// Gate decisions are tallied into `stats`. A failure here concerns this
    /// record only; callers skip it and carry on.
    pub fn extract(
        &self,
        record: &ContentRecord,
        mentions: &MentionIndex,
        gate: &LouvainGate,
        stats: &mut GateStats,
    ) -> Result<Vec<Candidate>, ExtractError> {
        let id = record.id();
        if id.as_str().trim().is_empty() {
            return Err(ExtractError::ExtractionFailure {
                node: id.clone(),
                reason: "record has an empty id".to_string(),
            });
        }

        let features = self.features(record);
        let mut candidates = Vec::new();

        for target in &features.cites {
            candidates.push(Candidate::heuristic(id, target.clone(), EdgeType::Cites));
        }

        let mut referenced = HashSet::new();
        for raw in &features.references {
            let target = mentions.resolve_reference(raw);
            if &target != id && referenced.insert(target.clone()) {
                candidates.push(Candidate::heuristic(id, target, EdgeType::References));
            }
        }

        let mut mentioned = HashSet::new();
        for token in &features.tokens {
            for target in mentions.lookup(token) {
                if target != id && mentioned.insert(target.clone()) {
                    candidates.push(Candidate::heuristic(id, target.clone(), EdgeType::Mentions));
                }
            }
        }

        if let Some(source) = &self.similarity {
            let neighbors = source.nearest(id).map_err(|e| ExtractError::ExtractionFailure {
                node: id.clone(),
                reason: e.to_string(),
            })?;
            for neighbor in neighbors {
                if &neighbor.id == id {
                    continue;
                }
                if !(0.0..=1.0).contains(&neighbor.score) {
                    debug!(node = %id, neighbor = %neighbor.id, score = neighbor.score, "ignoring out-of-range similarity");
                    continue;
                }
                stats.checked += 1;
                if gate.admit(id, &neighbor.id, neighbor.score) {
                    // Similarity is symmetric: one edge per pair, smaller id first
                    let (source, target) = if id < &neighbor.id {
                        (id.clone(), neighbor.id)
                    } else {
                        (neighbor.id, id.clone())
                    };
                    candidates.push(Candidate {
                        source,
                        target,
                        edge_type: EdgeType::SimilarTo,
                        score: neighbor.score,
                    });
                } else {
                    stats.rejected += 1;
                }
            }
        }

        Ok(candidates)
    }
}

impl std::fmt::Debug for CandidateExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CandidateExtractor")
            .field("citation_patterns", &self.citation_patterns.len())
            .field("min_keyword_len", &self.min_keyword_len)
            .field("similarity", &self.similarity.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GateConfig;
    use crate::graph::{Node, NodeKind};
    use crate::weave::types::InMemorySimilarity;

    fn extractor() -> CandidateExtractor {
        CandidateExtractor::new(&ExtractorConfig::default(), Arc::new(ExtractionCache::new())).unwrap()
    }

    fn record(id: &str, text: &str) -> ContentRecord {
        ContentRecord::new(Node::new(id, NodeKind::Content), text)
    }

    fn titled(id: &str, title: &str, community: Option<u32>) -> Node {
        let mut node = Node::new(id, NodeKind::Document).with_title(title);
        node.community_id = community;
        node
    }

    fn run(extractor: &CandidateExtractor, graph: &Graph, rec: &ContentRecord) -> Vec<Candidate> {
        let index = extractor.mention_index(graph);
        let gate = LouvainGate::from_graph(graph, &GateConfig::default());
        let mut stats = GateStats::default();
        extractor.extract(rec, &index, &gate, &mut stats).unwrap()
    }

    fn summary(candidates: &[Candidate]) -> Vec<(EdgeType, String)> {
        candidates
            .iter()
            .map(|c| (c.edge_type, c.target.to_string()))
            .collect()
    }

    #[test]
    fn citations_match_the_id_pattern_and_skip_self() {
        let ex = extractor();
        let rec = record("OH-002", "Supersedes OH-001 and OH-001 again; see OH-002 and ADR-17.");
        let found = run(&ex, &Graph::new(), &rec);
        assert_eq!(
            summary(&found),
            vec![
                (EdgeType::Cites, "OH-001".to_string()),
                (EdgeType::Cites, "ADR-17".to_string()),
            ]
        );
    }

    #[test]
    fn references_strip_alias_and_extension() {
        assert_eq!(reference_target("notes/intro.md|Intro"), Some("notes/intro.md"));
        assert_eq!(reference_target(" Circular Logic "), Some("Circular Logic"));
        assert_eq!(reference_target("|alias"), None);
        assert_eq!(strip_extension("notes/intro.md"), "notes/intro");
        assert_eq!(strip_extension(".hidden"), ".hidden");

        let ex = extractor();
        let rec = record("a", "See [[b.md]] and [[c|the c page]] and [[b]].");
        let found = run(&ex, &Graph::new(), &rec);
        assert_eq!(
            summary(&found),
            vec![
                (EdgeType::References, "b".to_string()),
                (EdgeType::References, "c".to_string()),
            ]
        );
    }

    #[test]
    fn references_resolve_by_id_then_title_slug() {
        let mut graph = Graph::new();
        graph.add_node(titled("term-circular-logic", "Circular Logic", None));
        graph.add_node(titled("guide.md", "Guide", None));
        graph.add_node(titled("glossary", "", None));
        graph.add_node(titled("file-1", "", None));

        let ex = extractor();
        let rec = record(
            "file-1",
            "See also [[Circular Logic]], [[guide.md|the guide]], [[glossary.md]], \
             [[circular logic]] and [[Missing Page.md]].",
        );
        let found: Vec<Candidate> = run(&ex, &graph, &rec)
            .into_iter()
            .filter(|c| c.edge_type == EdgeType::References)
            .collect();
        assert_eq!(
            summary(&found),
            vec![
                (EdgeType::References, "term-circular-logic".to_string()),
                (EdgeType::References, "guide.md".to_string()),
                (EdgeType::References, "glossary".to_string()),
                (EdgeType::References, "Missing Page".to_string()),
            ]
        );
    }

    #[test]
    fn keywords_drop_short_and_stop_words() {
        let ex = extractor();
        assert_eq!(
            ex.keywords("The Overview of Graph Gardening and Graph DB"),
            vec!["graph".to_string(), "gardening".to_string()]
        );
    }

    #[test]
    fn extra_stop_words_extend_the_curated_set() {
        let config = ExtractorConfig {
            extra_stop_words: vec!["Graph".to_string()],
            ..ExtractorConfig::default()
        };
        let ex = CandidateExtractor::new(&config, Arc::new(ExtractionCache::new())).unwrap();
        assert_eq!(ex.keywords("Graph Gardening"), vec!["gardening".to_string()]);
    }

    #[test]
    fn mentions_are_whole_word_and_one_per_pair() {
        let mut graph = Graph::new();
        graph.add_node(titled("louvain", "Louvain Clustering", None));
        graph.add_node(titled("page", "PageRank Notes", None));
        graph.add_node(titled("self", "Selfish Heuristics", None));

        let ex = extractor();
        let rec = ContentRecord::new(
            titled("self", "Selfish Heuristics", None),
            "Clustering with louvain; more LOUVAIN. pageranking is not pagerank-free.",
        );
        let found = run(&ex, &graph, &rec);
        assert_eq!(
            summary(&found),
            vec![
                (EdgeType::Mentions, "louvain".to_string()),
                (EdgeType::Mentions, "page".to_string()),
            ]
        );
    }

    #[test]
    fn similarity_candidates_are_gated() {
        let mut graph = Graph::new();
        graph.add_node(titled("a", "", Some(0)));
        graph.add_node(titled("b", "", Some(0)));
        graph.add_node(titled("far", "", Some(1)));
        graph.add_node(titled("strong", "", Some(2)));

        let similarity = InMemorySimilarity::new();
        similarity.insert("a", "b", 0.3);
        similarity.insert("a", "far", 0.8);
        similarity.insert("a", "strong", 0.95);
        let ex = extractor().with_similarity(Arc::new(similarity));

        let index = ex.mention_index(&graph);
        let gate = LouvainGate::from_graph(&graph, &GateConfig::default());
        let mut stats = GateStats::default();
        let found = ex.extract(&record("a", ""), &index, &gate, &mut stats).unwrap();

        assert_eq!(
            summary(&found),
            vec![
                (EdgeType::SimilarTo, "strong".to_string()),
                (EdgeType::SimilarTo, "b".to_string()),
            ]
        );
        assert_eq!(found[0].score, 0.95);
        assert_eq!(stats, GateStats { checked: 3, rejected: 1 });
    }

    #[test]
    fn similarity_pairs_are_oriented_smaller_id_first() {
        let mut graph = Graph::new();
        graph.add_node(titled("a", "", Some(0)));
        graph.add_node(titled("z", "", Some(0)));

        let similarity = Arc::new(InMemorySimilarity::new());
        similarity.insert("a", "z", 0.5);
        let ex = extractor().with_similarity(similarity);

        let from_z = run(&ex, &graph, &record("z", ""));
        let from_a = run(&ex, &graph, &record("a", ""));
        assert_eq!(from_z, from_a);
        assert_eq!(from_z[0].source.as_str(), "a");
        assert_eq!(from_z[0].target.as_str(), "z");
    }

    #[test]
    fn failing_similarity_source_is_an_extraction_failure() {
        struct Down;
        impl SimilaritySource for Down {
            fn nearest(
                &self,
                _id: &NodeId,
            ) -> Result<Vec<crate::weave::ScoredNeighbor>, crate::weave::CollaboratorError> {
                Err(crate::weave::CollaboratorError::Unavailable("index offline".into()))
            }
        }
        let ex = extractor().with_similarity(Arc::new(Down));
        let gate = LouvainGate::from_graph(&Graph::new(), &GateConfig::default());
        let err = ex
            .extract(&record("a", "text"), &MentionIndex::default(), &gate, &mut GateStats::default())
            .unwrap_err();
        assert!(matches!(err, ExtractError::ExtractionFailure { .. }));
    }

    #[test]
    fn empty_id_is_an_extraction_failure() {
        let ex = extractor();
        let gate = LouvainGate::from_graph(&Graph::new(), &GateConfig::default());
        let result = ex.extract(&record("", "OH-001"), &MentionIndex::default(), &gate, &mut GateStats::default());
        assert!(result.is_err());
    }

    #[test]
    fn features_are_cached_per_text() {
        let ex = extractor();
        let rec = record("a", "cites OH-001");
        ex.features(&rec);
        ex.features(&rec);
        assert_eq!(ex.cache().counters(), (1, 1));
    }
}
