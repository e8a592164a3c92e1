//! GraphGardener: periodic maintenance pass
//!
//! Four ordered phases staged in one transaction:
//!
//! 1. **Analyze**: Louvain communities and centrality over the current
//!    snapshot, written back onto every node
//! 2. **Sweep orphans**: drop nodes whose backing source is gone
//! 3. **Prune weak edges**: drop SIMILAR_TO edges below the decay threshold
//! 4. **Merge duplicates**: fold nodes sharing a normalized identity into
//!    the oldest one
//!
//! The token is checked between phases. A cancelled pass discards the
//! transaction, so nothing from any phase is committed.

use super::cancel::CancellationToken;
use super::existence::ExistenceCheck;
use super::insights::{self, BridgeSuggestion};
use crate::analysis::{CentralityAnalyzer, CentralityReport, CommunityDetector, Partition};
use crate::config::{GardenerConfig, LouvainConfig, PageRankConfig};
use crate::graph::{
    CentralityScores, Direction, Edge, EdgeKey, EdgeType, GraphResult, GraphStore, Node, NodeId,
    Transaction,
};
use crate::lane::RunStatus;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Analyze,
    SweepOrphans,
    PruneWeakEdges,
    MergeDuplicates,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Analyze => "analyze",
            Self::SweepOrphans => "sweep-orphans",
            Self::PruneWeakEdges => "prune-weak-edges",
            Self::MergeDuplicates => "merge-duplicates",
        };
        f.write_str(name)
    }
}

/// Outcome of one gardening pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GardenReport {
    pub communities: usize,
    pub modularity: f64,
    /// Top nodes by `pagerank + betweenness`
    pub hubs: Vec<(NodeId, f64)>,
    pub orphans_removed: usize,
    /// Nodes kept because the existence check itself failed
    pub existence_failures: usize,
    pub edges_pruned: usize,
    pub duplicates_merged: usize,
    /// Louvain or PageRank stopped at its iteration cap
    pub approximate: bool,
    /// Set when the pass stopped early
    pub cancelled_before: Option<Phase>,
    pub status: RunStatus,
}

impl GardenReport {
    fn cancelled(phase: Phase) -> Self {
        Self {
            cancelled_before: Some(phase),
            status: RunStatus::Cancelled,
            ..Self::default()
        }
    }
}

pub struct GraphGardener {
    store: Arc<GraphStore>,
    existence: Arc<dyn ExistenceCheck>,
    detector: CommunityDetector,
    centrality: CentralityAnalyzer,
    config: GardenerConfig,
}

impl GraphGardener {
    pub fn new(
        store: Arc<GraphStore>,
        existence: Arc<dyn ExistenceCheck>,
        louvain: LouvainConfig,
        pagerank: PageRankConfig,
        config: GardenerConfig,
    ) -> Self {
        Self {
            store,
            existence,
            detector: CommunityDetector::new(louvain),
            centrality: CentralityAnalyzer::new(pagerank),
            config,
        }
    }

    /// Unlinked pairs with the strongest shared neighborhood
    pub fn structural_gaps(&self, limit: usize) -> Vec<BridgeSuggestion> {
        insights::structural_gaps(&self.store.snapshot(), limit)
    }

    /// Highest-PageRank members of a community, as of the last pass
    pub fn cluster_representatives(&self, community: u32, top: usize) -> Vec<NodeId> {
        insights::cluster_representatives(&self.store.snapshot(), community, top)
    }

    pub fn weave_timeline(&self) -> Vec<BridgeSuggestion> {
        insights::weave_timeline(&self.store.snapshot())
    }

    /// Run one pass.
    ///
    /// Returns `Ok` with `RunStatus::Cancelled` if the token fired at a phase
    /// boundary. A persistence failure on commit is returned as an error and
    /// leaves the live graph untouched.
    pub fn run(&self, token: &CancellationToken) -> GraphResult<GardenReport> {
        let started = Instant::now();
        let mut report = GardenReport::default();

        if let Some(cancelled) = Self::checkpoint(token, Phase::Analyze) {
            return Ok(cancelled);
        }
        let (partition, centrality) = {
            let guard = self.store.begin_analysis();
            let snapshot = guard.snapshot();
            (self.detector.detect(&snapshot), self.centrality.analyze(&snapshot))
        };
        let mut tx = self.store.begin();
        self.write_analysis(&mut tx, &partition, &centrality, &mut report);

        if let Some(cancelled) = Self::checkpoint(token, Phase::SweepOrphans) {
            return Ok(cancelled);
        }
        self.sweep_orphans(&mut tx, &mut report);

        if let Some(cancelled) = Self::checkpoint(token, Phase::PruneWeakEdges) {
            return Ok(cancelled);
        }
        self.prune_weak_edges(&mut tx, &mut report);

        if let Some(cancelled) = Self::checkpoint(token, Phase::MergeDuplicates) {
            return Ok(cancelled);
        }
        self.merge_duplicates(&mut tx, &mut report);

        if token.is_cancelled() {
            info!("gardening cancelled before commit; discarding pass");
            return Ok(GardenReport::cancelled(Phase::MergeDuplicates));
        }
        let summary = self.store.commit(tx)?;

        report.status = if report.approximate || report.existence_failures > 0 {
            RunStatus::Degraded
        } else {
            RunStatus::Clean
        };
        info!(
            communities = report.communities,
            modularity = report.modularity,
            orphans = report.orphans_removed,
            pruned = report.edges_pruned,
            merged = report.duplicates_merged,
            approximate = report.approximate,
            deferred = summary.deferred,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "gardening pass complete"
        );
        Ok(report)
    }

    fn checkpoint(token: &CancellationToken, next: Phase) -> Option<GardenReport> {
        if token.is_cancelled() {
            info!(phase = %next, "gardening cancelled; discarding pass");
            Some(GardenReport::cancelled(next))
        } else {
            None
        }
    }

    /// Assign every node in the working copy a community and cached scores.
    ///
    /// Nodes the analyzed snapshot did not contain (inserted directly while
    /// analysis ran) get a fresh singleton community so the assignment still
    /// partitions the node set.
    fn write_analysis(
        &self,
        tx: &mut Transaction,
        partition: &Partition,
        centrality: &CentralityReport,
        report: &mut GardenReport,
    ) {
        let mut next_community = partition
            .assignments
            .values()
            .max()
            .map_or(0, |max| max + 1);
        let mut singletons = 0usize;

        for id in tx.graph().sorted_node_ids() {
            let community = match partition.assignments.get(&id) {
                Some(&community) => community,
                None => {
                    singletons += 1;
                    next_community += 1;
                    next_community - 1
                }
            };
            let scores = CentralityScores {
                pagerank: centrality.pagerank.scores.get(&id).copied().unwrap_or(0.0),
                betweenness: centrality.betweenness.get(&id).copied().unwrap_or(0.0),
            };
            let unchanged = tx.graph().node(&id).is_some_and(|n| {
                n.community_id == Some(community) && n.centrality == Some(scores)
            });
            if !unchanged {
                tx.update_node(&id, |node| {
                    node.community_id = Some(community);
                    node.centrality = Some(scores);
                });
            }
        }
        if singletons > 0 {
            debug!(singletons, "nodes added during analysis given singleton communities");
        }

        report.communities = partition.community_count() + singletons;
        report.modularity = partition.modularity;
        report.hubs = centrality.top_hubs(self.config.hub_count);
        report.approximate = partition.approximate || centrality.approximate();
    }

    fn sweep_orphans(&self, tx: &mut Transaction, report: &mut GardenReport) {
        let candidates: Vec<NodeId> = tx
            .graph()
            .nodes()
            .filter(|n| n.kind.has_backing_source())
            .map(|n| n.id.clone())
            .collect();

        for id in candidates {
            match self.existence.exists(&id) {
                Ok(true) => {}
                Ok(false) => {
                    if let Some((_, edges)) = tx.remove_node(&id) {
                        debug!(node = %id, edges = edges.len(), "orphan removed");
                        report.orphans_removed += 1;
                    }
                }
                Err(e) => {
                    warn!(node = %id, error = %e, "existence check failed; keeping node");
                    report.existence_failures += 1;
                }
            }
        }
    }

    fn prune_weak_edges(&self, tx: &mut Transaction, report: &mut GardenReport) {
        let weak: Vec<EdgeKey> = tx
            .graph()
            .edges()
            .filter(|e| e.edge_type == EdgeType::SimilarTo && e.weight < self.config.prune_threshold)
            .map(Edge::key)
            .collect();
        for key in weak {
            if tx.remove_edge(&key).is_some() {
                report.edges_pruned += 1;
            }
        }
    }

    fn merge_duplicates(&self, tx: &mut Transaction, report: &mut GardenReport) {
        let mut groups: BTreeMap<(String, String), Vec<&Node>> = BTreeMap::new();
        for node in tx.graph().nodes() {
            if let Some(identity) = node.normalized_identity() {
                groups.entry(identity).or_default().push(node);
            }
        }
        let merges: Vec<(NodeId, Vec<NodeId>)> = groups
            .into_values()
            .filter(|group| group.len() > 1)
            .map(|mut group| {
                group.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
                let survivor = group[0].id.clone();
                let duplicates = group[1..].iter().map(|n| n.id.clone()).collect();
                (survivor, duplicates)
            })
            .collect();

        for (survivor, duplicates) in merges {
            for duplicate in duplicates {
                self.merge_into(tx, &survivor, &duplicate);
                report.duplicates_merged += 1;
            }
        }
    }

    /// Repoint the duplicate's edges at the survivor, carry over its external
    /// refs, then remove it. Edges that would become self-loops are dropped.
    fn merge_into(&self, tx: &mut Transaction, survivor: &NodeId, duplicate: &NodeId) {
        let edges = tx.edges_of(duplicate, Direction::Both);
        let Some((removed, _)) = tx.remove_node(duplicate) else {
            return;
        };

        let mut repointed = 0usize;
        for edge in edges {
            let source = if &edge.source == duplicate { survivor.clone() } else { edge.source.clone() };
            let target = if &edge.target == duplicate { survivor.clone() } else { edge.target.clone() };
            if source == target {
                continue;
            }
            match tx.add_edge(Edge { source, target, ..edge }) {
                Ok(true) => repointed += 1,
                Ok(false) => {}
                Err(e) => debug!(error = %e, "edge dropped during merge"),
            }
        }

        tx.update_node(survivor, |node| {
            for reference in &removed.external_refs {
                if !node.external_refs.contains(reference) {
                    node.external_refs.push(reference.clone());
                }
            }
            if node.narrative.is_empty() {
                node.narrative = removed.narrative.clone();
            }
        });
        debug!(%survivor, %duplicate, repointed, "duplicate merged");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NodeKind;
    use crate::storage::{OpenStore, SqliteStore};
    use crate::weave::CollaboratorError;
    use chrono::{Duration, Utc};
    use std::collections::HashSet;

    fn everything_exists() -> Arc<dyn ExistenceCheck> {
        Arc::new(|_: &NodeId| -> Result<bool, CollaboratorError> { Ok(true) })
    }

    fn setup(existence: Arc<dyn ExistenceCheck>) -> (Arc<GraphStore>, GraphGardener) {
        let store = Arc::new(GraphStore::new(Arc::new(SqliteStore::open_in_memory().unwrap())));
        let gardener = GraphGardener::new(
            store.clone(),
            existence,
            LouvainConfig::default(),
            PageRankConfig::default(),
            GardenerConfig::default(),
        );
        (store, gardener)
    }

    fn seed(store: &GraphStore, nodes: Vec<Node>, edges: Vec<Edge>) {
        let mut tx = store.begin();
        for node in nodes {
            tx.add_node(node);
        }
        for edge in edges {
            tx.add_edge(edge).unwrap();
        }
        store.commit(tx).unwrap();
    }

    fn content(id: &str) -> Node {
        Node::new(id, NodeKind::Content)
    }

    #[test]
    fn every_node_gets_exactly_one_community() {
        let (store, gardener) = setup(everything_exists());
        seed(
            &store,
            ["a", "b", "c", "d", "lonely"].into_iter().map(content).collect(),
            vec![
                Edge::new("a", "b", EdgeType::Cites),
                Edge::new("c", "d", EdgeType::Cites),
            ],
        );

        let report = gardener.run(&CancellationToken::new()).unwrap();
        assert_eq!(report.status, RunStatus::Clean);

        let snapshot = store.snapshot();
        let assigned: Vec<_> = snapshot.nodes().filter_map(|n| n.community_id).collect();
        assert_eq!(assigned.len(), snapshot.node_count());

        let mut members: HashSet<NodeId> = HashSet::new();
        for group in store.communities().values() {
            for id in group {
                assert!(members.insert(id.clone()), "{} listed twice", id);
            }
        }
        assert_eq!(members.len(), 5);
        assert_eq!(report.communities, store.communities().len());
        assert!(snapshot.nodes().all(|n| n.centrality.is_some()));
    }

    #[test]
    fn orphan_sweep_cascades_and_spares_derived_nodes() {
        let existence: Arc<dyn ExistenceCheck> =
            Arc::new(|id: &NodeId| -> Result<bool, CollaboratorError> { Ok(id.as_str() != "gone.md") });
        let (store, gardener) = setup(existence);
        seed(
            &store,
            vec![content("kept.md"), content("gone.md"), Node::new("topic", NodeKind::Entity)],
            vec![
                Edge::new("kept.md", "gone.md", EdgeType::References),
                Edge::new("gone.md", "topic", EdgeType::Mentions),
            ],
        );

        let report = gardener.run(&CancellationToken::new()).unwrap();
        assert_eq!(report.orphans_removed, 1);
        assert!(store.node(&NodeId::from("gone.md")).is_none());
        assert!(store.node(&NodeId::from("topic")).is_some(), "entities have no backing source");
        for id in ["kept.md", "topic"] {
            assert!(!store
                .neighbors(&NodeId::from(id), Direction::Both)
                .contains(&NodeId::from("gone.md")));
        }
        assert_eq!(store.stats().edges, 0);
    }

    #[test]
    fn failing_existence_check_keeps_the_node() {
        let existence: Arc<dyn ExistenceCheck> = Arc::new(|_: &NodeId| -> Result<bool, CollaboratorError> {
            Err(CollaboratorError::Unavailable("disk offline".into()))
        });
        let (store, gardener) = setup(existence);
        seed(&store, vec![content("a")], vec![]);

        let report = gardener.run(&CancellationToken::new()).unwrap();
        assert_eq!(report.existence_failures, 1);
        assert_eq!(report.status, RunStatus::Degraded);
        assert!(store.node(&NodeId::from("a")).is_some());
    }

    #[test]
    fn weak_similarity_edges_are_pruned() {
        let (store, gardener) = setup(everything_exists());
        seed(
            &store,
            vec![content("a"), content("b"), content("c")],
            vec![
                Edge::new("a", "b", EdgeType::SimilarTo).with_weight(0.10),
                Edge::new("a", "c", EdgeType::SimilarTo).with_weight(0.20),
                Edge::new("b", "c", EdgeType::Mentions).with_weight(0.01),
            ],
        );

        let report = gardener.run(&CancellationToken::new()).unwrap();
        assert_eq!(report.edges_pruned, 1);
        let snapshot = store.snapshot();
        let key = |a: &str, b: &str, t| EdgeKey::new(NodeId::from(a), NodeId::from(b), t);
        assert!(!snapshot.contains_edge(&key("a", "b", EdgeType::SimilarTo)));
        assert!(snapshot.contains_edge(&key("a", "c", EdgeType::SimilarTo)));
        assert!(snapshot.contains_edge(&key("b", "c", EdgeType::Mentions)));
    }

    #[test]
    fn duplicates_merge_into_the_oldest_node() {
        let (store, gardener) = setup(everything_exists());
        let mut older = Node::new("graph-theory", NodeKind::Entity)
            .with_title("Graph Theory")
            .with_domain("Math")
            .with_external_ref("wiki:1");
        older.created_at = Utc::now() - Duration::days(1);
        let newer = Node::new("graph_theory_2", NodeKind::Entity)
            .with_title("graph  theory")
            .with_domain("math ")
            .with_external_ref("wiki:2")
            .with_narrative("notes");
        seed(
            &store,
            vec![older, newer, content("doc")],
            vec![
                Edge::new("doc", "graph_theory_2", EdgeType::Mentions),
                Edge::new("graph_theory_2", "graph-theory", EdgeType::SimilarTo).with_weight(0.9),
            ],
        );

        let report = gardener.run(&CancellationToken::new()).unwrap();
        assert_eq!(report.duplicates_merged, 1);

        let snapshot = store.snapshot();
        assert!(snapshot.node(&NodeId::from("graph_theory_2")).is_none());
        let survivor = snapshot.node(&NodeId::from("graph-theory")).unwrap();
        assert_eq!(survivor.external_refs, vec!["wiki:1", "wiki:2"]);
        assert_eq!(survivor.narrative, "notes");
        assert!(snapshot.contains_edge(&EdgeKey::new(
            NodeId::from("doc"),
            NodeId::from("graph-theory"),
            EdgeType::Mentions
        )));
        assert_eq!(snapshot.edge_count(), 1, "merge-induced self-loop dropped");
    }

    #[test]
    fn cancellation_discards_the_whole_pass() {
        let (store, gardener) = setup(everything_exists());
        seed(
            &store,
            vec![content("a"), content("b")],
            vec![Edge::new("a", "b", EdgeType::SimilarTo).with_weight(0.05)],
        );
        let token = CancellationToken::new();
        token.cancel();

        let report = gardener.run(&token).unwrap();
        assert_eq!(report.status, RunStatus::Cancelled);
        assert_eq!(report.cancelled_before, Some(Phase::Analyze));
        let snapshot = store.snapshot();
        assert_eq!(snapshot.edge_count(), 1);
        assert!(snapshot.nodes().all(|n| n.community_id.is_none()));
    }

    #[test]
    fn second_pass_on_a_stable_graph_changes_nothing() {
        let (store, gardener) = setup(everything_exists());
        seed(
            &store,
            vec![content("a"), content("b"), content("c")],
            vec![Edge::new("a", "b", EdgeType::Cites), Edge::new("b", "c", EdgeType::Cites)],
        );
        gardener.run(&CancellationToken::new()).unwrap();
        let before = store.snapshot();
        gardener.run(&CancellationToken::new()).unwrap();
        let after = store.snapshot();
        for node in before.nodes() {
            assert_eq!(after.node(&node.id).unwrap().community_id, node.community_id);
        }
    }

    #[test]
    fn insights_read_the_last_pass() {
        let (store, gardener) = setup(everything_exists());
        let dated = |id: &str, d: u32| content(id).with_date(chrono::NaiveDate::from_ymd_opt(2024, 5, d).unwrap());
        seed(
            &store,
            vec![dated("hub", 1), dated("x", 3), dated("y", 2)],
            vec![Edge::new("x", "hub", EdgeType::Cites), Edge::new("y", "hub", EdgeType::Cites)],
        );
        assert!(gardener.weave_timeline().is_empty(), "no communities before a pass");

        gardener.run(&CancellationToken::new()).unwrap();
        let community = store.community_of(&NodeId::from("hub")).unwrap();
        assert_eq!(
            gardener.cluster_representatives(community, 1),
            vec![NodeId::from("hub")]
        );
        let gaps = gardener.structural_gaps(5);
        assert_eq!(gaps.len(), 1);
        assert_eq!((gaps[0].source.as_str(), gaps[0].target.as_str()), ("x", "y"));

        let timeline: Vec<(String, String)> = gardener
            .weave_timeline()
            .into_iter()
            .map(|s| (s.source.to_string(), s.target.to_string()))
            .collect();
        assert_eq!(
            timeline,
            vec![("hub".into(), "y".into()), ("y".into(), "x".into())]
        );
    }
}
