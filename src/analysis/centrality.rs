//! Centrality: Brandes betweenness and PageRank
//!
//! Both walk the directed graph. Parallel edges of different types count
//! once for betweenness (paths are unweighted) and once per edge for
//! PageRank's out-degree.

use crate::config::PageRankConfig;
use crate::graph::{Graph, NodeId};
use std::collections::{HashMap, VecDeque};
use tracing::warn;

/// PageRank result for a snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct PageRankResult {
    /// Node scores (NodeId -> score), summing to 1
    pub scores: HashMap<NodeId, f64>,
    /// Iterations performed
    pub iterations: usize,
    /// Final L1 delta between the last two iterations
    pub delta: f64,
    /// True if the iteration cap was reached before convergence
    pub approximate: bool,
}

/// Combined centrality output
#[derive(Debug, Clone, PartialEq)]
pub struct CentralityReport {
    pub pagerank: PageRankResult,
    /// Normalized betweenness (fraction of ordered pairs' shortest paths)
    pub betweenness: HashMap<NodeId, f64>,
}

impl CentralityReport {
    pub fn approximate(&self) -> bool {
        self.pagerank.approximate
    }

    /// Top-k nodes by `pagerank + betweenness`, ties broken by id
    pub fn top_hubs(&self, k: usize) -> Vec<(NodeId, f64)> {
        let mut ranked: Vec<(NodeId, f64)> = self
            .pagerank
            .scores
            .iter()
            .map(|(id, pr)| {
                let bc = self.betweenness.get(id).copied().unwrap_or(0.0);
                (id.clone(), pr + bc)
            })
            .collect();
        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        ranked.truncate(k);
        ranked
    }
}

/// Dense index of a snapshot: node ids in ascending order plus adjacency
struct Indexed {
    ids: Vec<NodeId>,
    /// Outgoing targets per node, one entry per edge
    outgoing: Vec<Vec<usize>>,
    /// Incoming sources per node, one entry per edge
    incoming: Vec<Vec<usize>>,
}

impl Indexed {
    fn build(graph: &Graph) -> Self {
        let ids = graph.sorted_node_ids();
        let n = ids.len();
        let index: HashMap<&NodeId, usize> = ids.iter().enumerate().map(|(i, id)| (id, i)).collect();
        let mut outgoing: Vec<Vec<usize>> = vec![Vec::new(); n];
        let mut incoming: Vec<Vec<usize>> = vec![Vec::new(); n];

        for edge in graph.sorted_edges() {
            if let (Some(&src), Some(&dst)) = (index.get(&edge.source), index.get(&edge.target)) {
                outgoing[src].push(dst);
                incoming[dst].push(src);
            }
        }
        for list in outgoing.iter_mut().chain(incoming.iter_mut()) {
            list.sort_unstable();
        }
        Self { ids, outgoing, incoming }
    }
}

/// Pure centrality computations over a snapshot; never mutates the graph
#[derive(Debug, Clone, Default)]
pub struct CentralityAnalyzer {
    config: PageRankConfig,
}

impl CentralityAnalyzer {
    pub fn new(config: PageRankConfig) -> Self {
        Self { config }
    }

    pub fn analyze(&self, graph: &Graph) -> CentralityReport {
        let indexed = Indexed::build(graph);
        CentralityReport {
            pagerank: self.pagerank_indexed(&indexed),
            betweenness: betweenness_indexed(&indexed),
        }
    }

    /// PageRank by power iteration
    pub fn pagerank(&self, graph: &Graph) -> PageRankResult {
        self.pagerank_indexed(&Indexed::build(graph))
    }

    fn pagerank_indexed(&self, indexed: &Indexed) -> PageRankResult {
        let n = indexed.ids.len();
        if n == 0 {
            return PageRankResult {
                scores: HashMap::new(),
                iterations: 0,
                delta: 0.0,
                approximate: false,
            };
        }

        let damping = self.config.damping;
        let outgoing = &indexed.outgoing;
        let incoming = &indexed.incoming;

        // Initialize scores uniformly
        let initial_score = 1.0 / n as f64;
        let mut scores: Vec<f64> = vec![initial_score; n];
        let mut new_scores: Vec<f64> = vec![0.0; n];

        let base = (1.0 - damping) / n as f64;
        let mut iterations = 0;
        let mut delta = f64::MAX;

        while iterations < self.config.max_iterations && delta > self.config.tolerance {
            // Dangling nodes (no outgoing edges) spread their mass uniformly
            let dangling_sum: f64 = scores
                .iter()
                .enumerate()
                .filter(|(i, _)| outgoing[*i].is_empty())
                .map(|(_, s)| s)
                .sum();

            for i in 0..n {
                let mut sum = 0.0;
                for &j in &incoming[i] {
                    sum += scores[j] / outgoing[j].len() as f64;
                }
                sum += dangling_sum / n as f64;
                new_scores[i] = base + damping * sum;
            }

            delta = scores
                .iter()
                .zip(new_scores.iter())
                .map(|(old, new)| (old - new).abs())
                .sum();

            std::mem::swap(&mut scores, &mut new_scores);
            iterations += 1;
        }

        let approximate = delta > self.config.tolerance;
        if approximate {
            warn!(iterations, delta, "pagerank hit the iteration cap before converging");
        }

        PageRankResult {
            scores: indexed.ids.iter().cloned().zip(scores).collect(),
            iterations,
            delta,
            approximate,
        }
    }

    /// Brandes betweenness, normalized by `(n−1)(n−2)` ordered pairs
    pub fn betweenness(&self, graph: &Graph) -> HashMap<NodeId, f64> {
        betweenness_indexed(&Indexed::build(graph))
    }
}

fn betweenness_indexed(indexed: &Indexed) -> HashMap<NodeId, f64> {
    let n = indexed.ids.len();
    let mut centrality = vec![0.0f64; n];

    // Distinct successors per node; parallel edges do not create extra paths
    let successors: Vec<Vec<usize>> = indexed
        .outgoing
        .iter()
        .map(|targets| {
            let mut distinct = targets.clone();
            distinct.dedup();
            distinct
        })
        .collect();

    let mut stack: Vec<usize> = Vec::with_capacity(n);
    let mut predecessors: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut sigma = vec![0.0f64; n];
    let mut distance = vec![-1i64; n];
    let mut dependency = vec![0.0f64; n];
    let mut queue: VecDeque<usize> = VecDeque::new();

    for source in 0..n {
        stack.clear();
        for p in predecessors.iter_mut() {
            p.clear();
        }
        sigma.iter_mut().for_each(|s| *s = 0.0);
        distance.iter_mut().for_each(|d| *d = -1);
        dependency.iter_mut().for_each(|d| *d = 0.0);

        sigma[source] = 1.0;
        distance[source] = 0;
        queue.push_back(source);

        // Single-source shortest paths (BFS, unweighted)
        while let Some(v) = queue.pop_front() {
            stack.push(v);
            for &w in &successors[v] {
                if w == v {
                    continue;
                }
                if distance[w] < 0 {
                    distance[w] = distance[v] + 1;
                    queue.push_back(w);
                }
                if distance[w] == distance[v] + 1 {
                    sigma[w] += sigma[v];
                    predecessors[w].push(v);
                }
            }
        }

        // Dependency back-propagation
        while let Some(w) = stack.pop() {
            for &v in &predecessors[w] {
                dependency[v] += sigma[v] / sigma[w] * (1.0 + dependency[w]);
            }
            if w != source {
                centrality[w] += dependency[w];
            }
        }
    }

    let scale = if n > 2 {
        1.0 / ((n - 1) * (n - 2)) as f64
    } else {
        1.0
    };
    indexed
        .ids
        .iter()
        .cloned()
        .zip(centrality.into_iter().map(|c| c * scale))
        .collect()
}
