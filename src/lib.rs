//! graphweave: graph synthesis engine for a typed content graph
//!
//! Ingested content is woven into typed edges (citations, references,
//! mentions, gated similarity) and periodically gardened: re-clustered with
//! Louvain, re-scored with PageRank and betweenness, and cleaned of orphans,
//! weak similarity edges and duplicate nodes.
//!
//! # Core Concepts
//!
//! - **GraphStore**: copy-on-write in-memory multigraph over a persistence
//!   collaborator
//! - **EdgeWeaver**: per-batch ingestion through the LouvainGate
//! - **GraphGardener**: four-phase maintenance pass
//! - **SynthesisEngine**: runs both as mutually exclusive writer lanes
//!
//! # Example
//!
//! ```no_run
//! use graphweave::{ContentRecord, Node, NodeKind, OpenStore, SqliteStore, SynthesisEngine};
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = SynthesisEngine::builder(Arc::new(SqliteStore::open_in_memory()?)).build()?;
//! let record = ContentRecord::new(Node::new("notes/a.md", NodeKind::Document), "See OH-001.");
//! engine.ingest(vec![record]).await?;
//! # Ok(())
//! # }
//! ```

pub mod analysis;
pub mod config;
pub mod engine;
pub mod garden;
pub mod graph;
pub mod lane;
pub mod storage;
pub mod weave;

pub use config::{ConfigError, EngineConfig};
pub use engine::{EngineBuilder, EngineError, Outcome, SynthesisEngine};
pub use garden::{
    BridgeSuggestion, CancellationToken, ExistenceCheck, FsExistence, GardenReport, GraphGardener,
    SuggestionKind,
};
pub use graph::{
    Direction, Edge, EdgeKey, EdgeType, GraphError, GraphResult, GraphStore, Node, NodeId, NodeKind,
};
pub use lane::RunStatus;
pub use storage::{OpenStore, PersistentStore, SqliteStore, StorageError, StorageResult};
pub use weave::{BatchReport, ContentRecord, EdgeWeaver, LouvainGate, SimilaritySource};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
