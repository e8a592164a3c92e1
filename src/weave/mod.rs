//! Edge weaving: turning ingested content into typed edges
//!
//! - **LouvainGate**: admits similarity pairs using the last community view
//! - **ExtractionCache**: content-hash keyed cache of per-node heuristics
//! - **CandidateExtractor**: CITES, REFERENCES, MENTIONS and gated SIMILAR_TO
//! - **EdgeWeaver**: per-batch orchestration over a single transaction

mod cache;
mod extractor;
mod gate;
mod types;
mod weaver;

pub use cache::{content_hash, ContentFeatures, ExtractionCache};
pub use extractor::{Candidate, CandidateExtractor, ExtractError, MentionIndex, STOP_WORDS};
pub use gate::{GateStats, LouvainGate};
pub use types::{CollaboratorError, ContentRecord, InMemorySimilarity, ScoredNeighbor, SimilaritySource};
pub use weaver::{merge_records, BatchReport, EdgeWeaver};
