//! Read-only insights over a snapshot: link suggestions and cluster summaries
//!
//! Nothing here mutates the graph. Suggestions are proposals for a caller
//! (or a later weaving run) to accept.

use crate::graph::{Direction, Graph, NodeId};
use chrono::NaiveDate;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuggestionKind {
    /// Non-adjacent pair with a large Adamic-Adar overlap
    StructuralGap,
    /// Consecutive dated nodes in one community
    Timeline,
}

/// A proposed link between two existing nodes
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeSuggestion {
    pub source: NodeId,
    pub target: NodeId,
    pub kind: SuggestionKind,
    pub score: f64,
    pub reason: String,
}

/// Adamic-Adar link prediction over the undirected neighborhood.
///
/// Every non-adjacent pair sharing a neighbor `z` scores
/// `sum(1 / ln |N(z)|)`. Results are best first, ties by `(source, target)`,
/// and each pair appears once with the smaller id as source.
pub fn structural_gaps(graph: &Graph, limit: usize) -> Vec<BridgeSuggestion> {
    let neighborhoods: BTreeMap<NodeId, Vec<NodeId>> = graph
        .sorted_node_ids()
        .into_iter()
        .map(|id| {
            let mut around = graph.neighbors(&id, Direction::Both);
            around.retain(|n| n != &id);
            (id, around)
        })
        .collect();
    let adjacent = |a: &NodeId, b: &NodeId| {
        neighborhoods
            .get(a)
            .is_some_and(|around| around.binary_search(b).is_ok())
    };

    let mut scores: BTreeMap<(NodeId, NodeId), f64> = BTreeMap::new();
    for around in neighborhoods.values() {
        if around.len() < 2 {
            continue;
        }
        let contribution = 1.0 / (around.len() as f64).ln();
        for (i, u) in around.iter().enumerate() {
            for v in &around[i + 1..] {
                if !adjacent(u, v) {
                    *scores.entry((u.clone(), v.clone())).or_insert(0.0) += contribution;
                }
            }
        }
    }

    let mut ranked: Vec<((NodeId, NodeId), f64)> = scores.into_iter().collect();
    ranked.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    ranked.truncate(limit);
    ranked
        .into_iter()
        .map(|((source, target), score)| BridgeSuggestion {
            source,
            target,
            kind: SuggestionKind::StructuralGap,
            score,
            reason: format!("structural Adamic-Adar overlap (score: {score:.2})"),
        })
        .collect()
}

/// Up to `top` members of a community, highest cached PageRank first.
///
/// Nodes never scored rank as zero; ties go to the smaller id.
pub fn cluster_representatives(graph: &Graph, community: u32, top: usize) -> Vec<NodeId> {
    let mut members: Vec<(NodeId, f64)> = graph
        .nodes()
        .filter(|n| n.community_id == Some(community))
        .map(|n| (n.id.clone(), n.centrality.map_or(0.0, |c| c.pagerank)))
        .collect();
    members.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    members.truncate(top);
    members.into_iter().map(|(id, _)| id).collect()
}

/// Chain dated nodes of each community in date order.
///
/// Only nodes carrying both a date and a community take part. Each node
/// is suggested to follow the previous dated member of its community;
/// same-day nodes are ordered by id.
pub fn weave_timeline(graph: &Graph) -> Vec<BridgeSuggestion> {
    let mut dated: Vec<(NaiveDate, NodeId, u32)> = graph
        .nodes()
        .filter_map(|n| Some((n.date?, n.id.clone(), n.community_id?)))
        .collect();
    dated.sort();

    let mut last_in_community: BTreeMap<u32, (NaiveDate, NodeId)> = BTreeMap::new();
    let mut suggestions = Vec::new();
    for (date, id, community) in dated {
        if let Some((previous_date, previous)) =
            last_in_community.insert(community, (date, id.clone()))
        {
            suggestions.push(BridgeSuggestion {
                source: previous,
                target: id,
                kind: SuggestionKind::Timeline,
                score: 1.0,
                reason: format!("temporal sequence ({previous_date} -> {date}) in community {community}"),
            });
        }
    }
    suggestions
}
