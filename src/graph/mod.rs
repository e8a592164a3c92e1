//! Core graph data structures

mod adjacency;
mod edge;
mod node;
mod store;
mod transaction;

pub use adjacency::{Direction, Graph};
pub use edge::{Edge, EdgeKey, EdgeType};
pub use node::{slugify, CentralityScores, Node, NodeId, NodeKind};
pub use store::{
    AnalysisGuard, Applied, CommitSummary, GraphError, GraphResult, GraphStats, GraphStore,
};
pub use transaction::{ChangeSet, Transaction};
