//! Graph maintenance: re-clustering, re-scoring and cleanup

mod cancel;
mod existence;
mod gardener;
pub mod insights;

pub use cancel::CancellationToken;
pub use existence::{ExistenceCheck, FsExistence};
pub use gardener::{GardenReport, GraphGardener, Phase};
pub use insights::{BridgeSuggestion, SuggestionKind};
