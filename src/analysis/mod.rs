//! Graph analytics over immutable snapshots
//!
//! - **CommunityDetector**: Louvain modularity clustering
//! - **CentralityAnalyzer**: Brandes betweenness and PageRank
//!
//! Both are pure functions of a [`Graph`](crate::graph::Graph). Writing their
//! output back onto nodes is the gardener's job.

mod centrality;
mod louvain;

pub use centrality::{CentralityAnalyzer, CentralityReport, PageRankResult};
pub use louvain::{CommunityDetector, Partition};
