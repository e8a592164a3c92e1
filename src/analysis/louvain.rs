//! Louvain community detection
//!
//! Two-phase modularity maximization over the undirected projection of the
//! graph (edge direction ignored, parallel edges summed by weight):
//!
//! 1. **Local moving**: visit nodes in ascending id order and move each to the
//!    neighboring community with the largest modularity gain. Ties keep the
//!    current community. Repeat until a full pass moves nothing or the pass
//!    cap is reached.
//! 2. **Aggregation**: collapse each community into a super-node and recurse,
//!    until the modularity gain of a level drops below `min_gain` or the node
//!    count stops shrinking.
//!
//! Modularity:
//!
//! Q = (1/2m) · Σc [ Σin(c) − γ · tot(c)² / 2m ]
//!
//! Visiting order and community numbering depend only on node ids and
//! weights, so identical snapshots always yield identical partitions.

use crate::config::LouvainConfig;
use crate::graph::{Graph, NodeId};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

/// Gains closer than this are treated as ties
const GAIN_TOLERANCE: f64 = 1e-12;

/// Output of a detection run
#[derive(Debug, Clone, PartialEq)]
pub struct Partition {
    /// Flattened `nodeId → communityId`; ids are dense, numbered by each
    /// community's smallest member id
    pub assignments: HashMap<NodeId, u32>,
    /// Modularity of the final partition
    pub modularity: f64,
    /// Number of aggregation levels that improved modularity
    pub levels: usize,
    /// True if a local pass hit the iteration cap before settling
    pub approximate: bool,
}

impl Partition {
    pub fn community_count(&self) -> usize {
        let mut ids: Vec<u32> = self.assignments.values().copied().collect();
        ids.sort_unstable();
        ids.dedup();
        ids.len()
    }

    /// Members of each community, sorted by id
    pub fn members(&self) -> BTreeMap<u32, Vec<NodeId>> {
        let mut groups: BTreeMap<u32, Vec<NodeId>> = BTreeMap::new();
        for (id, community) in &self.assignments {
            groups.entry(*community).or_default().push(id.clone());
        }
        for members in groups.values_mut() {
            members.sort();
        }
        groups
    }
}

/// Symmetric weighted adjacency used at every level.
///
/// `adj[i][j]` is A_ij; a self-loop contributes its weight twice so that
/// `degree[i] = Σj A_ij` and `total = Σi degree[i] = 2m`.
#[derive(Debug, Clone)]
struct LevelGraph {
    adj: Vec<BTreeMap<usize, f64>>,
    degree: Vec<f64>,
    total: f64,
}

impl LevelGraph {
    fn with_size(n: usize) -> Self {
        Self {
            adj: vec![BTreeMap::new(); n],
            degree: vec![0.0; n],
            total: 0.0,
        }
    }

    fn len(&self) -> usize {
        self.adj.len()
    }

    fn connect(&mut self, a: usize, b: usize, weight: f64) {
        if a == b {
            *self.adj[a].entry(a).or_insert(0.0) += 2.0 * weight;
            self.degree[a] += 2.0 * weight;
        } else {
            *self.adj[a].entry(b).or_insert(0.0) += weight;
            *self.adj[b].entry(a).or_insert(0.0) += weight;
            self.degree[a] += weight;
            self.degree[b] += weight;
        }
        self.total += 2.0 * weight;
    }

    fn modularity(&self, community: &[usize], resolution: f64) -> f64 {
        if self.total <= 0.0 {
            return 0.0;
        }
        let count = community.iter().copied().max().map_or(0, |c| c + 1);
        let mut internal = vec![0.0; count];
        let mut tot = vec![0.0; count];
        for (i, row) in self.adj.iter().enumerate() {
            tot[community[i]] += self.degree[i];
            for (&j, &w) in row {
                if community[i] == community[j] {
                    internal[community[i]] += w;
                }
            }
        }
        let m2 = self.total;
        internal
            .iter()
            .zip(&tot)
            .map(|(inside, t)| inside / m2 - resolution * (t / m2) * (t / m2))
            .sum()
    }

    /// Collapse communities (dense ids `0..count`) into super-nodes
    fn aggregate(&self, community: &[usize], count: usize) -> Self {
        let mut next = Self::with_size(count);
        for (i, row) in self.adj.iter().enumerate() {
            for (&j, &w) in row {
                *next.adj[community[i]].entry(community[j]).or_insert(0.0) += w;
            }
        }
        for (c, row) in next.adj.iter().enumerate() {
            next.degree[c] = row.values().sum();
        }
        next.total = self.total;
        next
    }
}

/// Renumber community labels densely in order of first appearance
fn renumber(community: &mut [usize]) -> usize {
    let mut mapping: HashMap<usize, usize> = HashMap::new();
    for label in community.iter_mut() {
        let next = mapping.len();
        *label = *mapping.entry(*label).or_insert(next);
    }
    mapping.len()
}

/// Louvain community detector
#[derive(Debug, Clone, Default)]
pub struct CommunityDetector {
    config: LouvainConfig,
}

impl CommunityDetector {
    pub fn new(config: LouvainConfig) -> Self {
        Self { config }
    }

    /// Partition every node of the snapshot into communities
    pub fn detect(&self, graph: &Graph) -> Partition {
        let ids = graph.sorted_node_ids();
        let n = ids.len();
        if n == 0 {
            return Partition {
                assignments: HashMap::new(),
                modularity: 0.0,
                levels: 0,
                approximate: false,
            };
        }

        let index: HashMap<&NodeId, usize> = ids.iter().enumerate().map(|(i, id)| (id, i)).collect();
        let mut level = LevelGraph::with_size(n);
        for edge in graph.sorted_edges() {
            if let (Some(&a), Some(&b)) = (index.get(&edge.source), index.get(&edge.target)) {
                if edge.weight > 0.0 {
                    level.connect(a, b, edge.weight);
                }
            }
        }

        // Membership of each original node in the current level's node space
        let mut membership: Vec<usize> = (0..n).collect();
        let mut approximate = false;
        let mut levels = 0;
        let resolution = self.config.resolution;
        let mut modularity = level.modularity(&membership, resolution);

        if level.total > 0.0 {
            loop {
                let (mut community, moved, capped) = self.local_moving(&level);
                approximate |= capped;
                let count = renumber(&mut community);
                let candidate = level.modularity(&community, resolution);
                let gain = candidate - modularity;

                if moved && gain > 0.0 {
                    for slot in membership.iter_mut() {
                        *slot = community[*slot];
                    }
                    modularity = candidate;
                    levels += 1;
                }
                debug!(level = levels, communities = count, modularity, gain, "louvain level");

                if !moved || gain < self.config.min_gain || count == level.len() {
                    break;
                }
                level = level.aggregate(&community, count);
            }
        }

        if approximate {
            warn!(
                max_passes = self.config.max_passes,
                "louvain local moving hit the pass cap; partition is approximate"
            );
        }

        // Final numbering: by smallest member id (membership is visited in id order)
        let mut final_labels = membership;
        renumber(&mut final_labels);
        let assignments = ids
            .into_iter()
            .zip(final_labels)
            .map(|(id, c)| (id, c as u32))
            .collect();

        Partition {
            assignments,
            modularity,
            levels,
            approximate,
        }
    }

    /// Phase 1 over one level. Returns (community per node, any move made, pass cap hit).
    fn local_moving(&self, level: &LevelGraph) -> (Vec<usize>, bool, bool) {
        let n = level.len();
        let m2 = level.total;
        let resolution = self.config.resolution;
        let mut community: Vec<usize> = (0..n).collect();
        let mut tot: Vec<f64> = level.degree.clone();
        let mut moved_any = false;

        for _pass in 0..self.config.max_passes {
            let mut moved = false;
            for node in 0..n {
                let current = community[node];
                let k = level.degree[node];

                // Weight from this node into each neighboring community
                let mut links: BTreeMap<usize, f64> = BTreeMap::new();
                for (&j, &w) in &level.adj[node] {
                    if j != node {
                        *links.entry(community[j]).or_insert(0.0) += w;
                    }
                }

                tot[current] -= k;
                let gain_of = |c: usize, into: f64| into - resolution * tot[c] * k / m2;

                let mut best = current;
                let mut best_gain = gain_of(current, links.get(&current).copied().unwrap_or(0.0));
                for (&c, &into) in &links {
                    if c == current {
                        continue;
                    }
                    let gain = gain_of(c, into);
                    if gain > best_gain + GAIN_TOLERANCE {
                        best = c;
                        best_gain = gain;
                    }
                }

                tot[best] += k;
                if best != current {
                    community[node] = best;
                    moved = true;
                    moved_any = true;
                }
            }
            if !moved {
                return (community, moved_any, false);
            }
        }
        (community, moved_any, true)
    }
}
