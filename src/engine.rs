//! SynthesisEngine: the two writer lanes over one shared store
//!
//! Weaving batches and gardening passes never overlap: each run holds the
//! writer lease for its duration and runs on the blocking pool. Bursts of
//! either kind coalesce into one follow-up run (see [`crate::lane`]).
//! Readers use [`SynthesisEngine::store`] and never wait on a writer.

use crate::config::{ConfigError, EngineConfig};
use crate::garden::{CancellationToken, ExistenceCheck, GardenReport, GraphGardener};
use crate::graph::{GraphError, GraphStore, NodeId};
use crate::lane::{Admission, Coalescer};
use crate::storage::{PersistentStore, StorageError};
use crate::weave::{
    merge_records, BatchReport, CandidateExtractor, CollaboratorError, ContentRecord, EdgeWeaver,
    ExtractionCache, SimilaritySource,
};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl EngineError {
    /// Whether the run aborted because persistence was unreachable; callers
    /// retry these with backoff
    pub fn is_store_unavailable(&self) -> bool {
        matches!(
            self,
            Self::Graph(GraphError::StoreUnavailable(_)) | Self::Storage(_)
        )
    }
}

/// Result of triggering a writer lane
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<R> {
    /// This caller ran the lane; the report covers its work and any
    /// follow-ups folded in while it ran
    Completed(R),
    /// Folded into the follow-up of a run already in flight
    Coalesced,
}

impl<R> Outcome<R> {
    pub fn report(&self) -> Option<&R> {
        match self {
            Self::Completed(report) => Some(report),
            Self::Coalesced => None,
        }
    }

    pub fn into_report(self) -> Option<R> {
        match self {
            Self::Completed(report) => Some(report),
            Self::Coalesced => None,
        }
    }
}

/// Assembles a [`SynthesisEngine`] from its collaborators
pub struct EngineBuilder {
    config: EngineConfig,
    persistence: Arc<dyn PersistentStore>,
    existence: Option<Arc<dyn ExistenceCheck>>,
    similarity: Option<Arc<dyn SimilaritySource>>,
    cache: Option<Arc<ExtractionCache>>,
}

impl EngineBuilder {
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Existence check for the orphan sweep; without one every backing
    /// source is assumed present
    pub fn existence(mut self, check: Arc<dyn ExistenceCheck>) -> Self {
        self.existence = Some(check);
        self
    }

    pub fn similarity(mut self, source: Arc<dyn SimilaritySource>) -> Self {
        self.similarity = Some(source);
        self
    }

    /// Share an extraction cache across engines
    pub fn cache(mut self, cache: Arc<ExtractionCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Validate the config and hydrate the graph from persistence
    pub fn build(self) -> Result<SynthesisEngine, EngineError> {
        self.config.validate()?;
        let store = Arc::new(GraphStore::load(self.persistence)?);

        let cache = self.cache.unwrap_or_default();
        let mut extractor = CandidateExtractor::new(&self.config.extractor, cache)?;
        if let Some(source) = self.similarity {
            extractor = extractor.with_similarity(source);
        }
        let weaver = EdgeWeaver::new(store.clone(), extractor, self.config.gate.clone());

        let existence: Arc<dyn ExistenceCheck> = match self.existence {
            Some(check) => check,
            None => Arc::new(|_: &NodeId| -> Result<bool, CollaboratorError> { Ok(true) }),
        };
        let gardener = GraphGardener::new(
            store.clone(),
            existence,
            self.config.louvain.clone(),
            self.config.pagerank.clone(),
            self.config.gardener.clone(),
        );

        Ok(SynthesisEngine {
            lanes: Arc::new(Lanes {
                store,
                weaver: Arc::new(weaver),
                gardener: Arc::new(gardener),
                writer: Mutex::new(()),
                weave: Coalescer::new("weave"),
                garden: Coalescer::new("garden"),
            }),
            config: self.config,
        })
    }
}

pub struct SynthesisEngine {
    lanes: Arc<Lanes>,
    config: EngineConfig,
}

/// Shared state the spawned lane runners work on
struct Lanes {
    store: Arc<GraphStore>,
    weaver: Arc<EdgeWeaver>,
    gardener: Arc<GraphGardener>,
    /// Writer lease shared by both lanes
    writer: Mutex<()>,
    weave: Coalescer<Vec<ContentRecord>>,
    garden: Coalescer<CancellationToken>,
}

impl SynthesisEngine {
    pub fn builder(persistence: Arc<dyn PersistentStore>) -> EngineBuilder {
        EngineBuilder {
            config: EngineConfig::default(),
            persistence,
            existence: None,
            similarity: None,
            cache: None,
        }
    }

    /// Read API for query collaborators
    pub fn store(&self) -> &Arc<GraphStore> {
        &self.lanes.store
    }

    pub fn gardener(&self) -> &Arc<GraphGardener> {
        &self.lanes.gardener
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Whether either lane has a run in flight
    pub fn is_busy(&self) -> bool {
        self.lanes.weave.is_running() || self.lanes.garden.is_running()
    }

    /// Whether work is queued behind a run or carried over from a failed
    /// follow-up; carried work runs with the next trigger of its lane
    pub fn has_pending_work(&self) -> bool {
        self.lanes.weave.has_pending() || self.lanes.garden.has_pending()
    }

    /// Weave a batch of records.
    ///
    /// If a batch is already running, the records are folded into its
    /// follow-up and `Outcome::Coalesced` is returned at once. The run itself
    /// happens on a spawned task, so dropping this future does not abandon
    /// the lane or any work folded into it.
    pub async fn ingest(
        &self,
        records: Vec<ContentRecord>,
    ) -> Result<Outcome<BatchReport>, EngineError> {
        let batch = match self.lanes.weave.submit(records, merge_records) {
            Admission::Run(batch) => batch,
            Admission::Queued => return Ok(Outcome::Coalesced),
        };
        let lanes = self.lanes.clone();
        let report = tokio::spawn(async move { lanes.weave_until_idle(batch).await }).await??;
        Ok(Outcome::Completed(report))
    }

    /// Run a gardening pass.
    ///
    /// A trigger arriving mid-pass schedules exactly one follow-up pass,
    /// which runs under the most recently supplied token. The returned
    /// report is that of the last pass run. Like [`ingest`](Self::ingest),
    /// the passes run on a spawned task.
    pub async fn garden(
        &self,
        token: CancellationToken,
    ) -> Result<Outcome<GardenReport>, EngineError> {
        let token = match self.lanes.garden.submit(token, |current, newer| *current = newer) {
            Admission::Run(token) => token,
            Admission::Queued => return Ok(Outcome::Coalesced),
        };
        let lanes = self.lanes.clone();
        let report = tokio::spawn(async move { lanes.garden_until_idle(token).await }).await??;
        Ok(Outcome::Completed(report))
    }
}

impl Lanes {
    /// Run `batch` and every follow-up folded in meanwhile, until the lane
    /// goes idle.
    ///
    /// A failed batch does not stop the loop: pending follow-ups belong to
    /// callers that were already told `Coalesced`, so they still run. The
    /// first error is returned once the lane is idle. A failed follow-up is
    /// carried into the next submission.
    async fn weave_until_idle(&self, batch: Vec<ContentRecord>) -> Result<BatchReport, EngineError> {
        let mut total = BatchReport::default();
        let mut first_error = None;
        let mut next = Some(batch);
        let mut follow_up = false;

        while let Some(batch) = next.take() {
            match self.weave_once(batch.clone()).await {
                Ok(report) => total.absorb(report),
                Err(e) => {
                    warn!(error = %e, records = batch.len(), follow_up, "weaving batch failed");
                    if follow_up {
                        self.weave.carry(batch, merge_records);
                    }
                    first_error.get_or_insert(e);
                }
            }
            next = self.weave.complete();
            if next.is_some() {
                debug!("running coalesced batch");
            }
            follow_up = true;
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(total),
        }
    }

    async fn weave_once(&self, batch: Vec<ContentRecord>) -> Result<BatchReport, EngineError> {
        let _lease = self.writer.lock().await;
        let weaver = self.weaver.clone();
        Ok(tokio::task::spawn_blocking(move || weaver.weave(&batch)).await??)
    }

    /// Gardening counterpart of [`weave_until_idle`](Self::weave_until_idle);
    /// the report is that of the last successful pass.
    async fn garden_until_idle(&self, token: CancellationToken) -> Result<GardenReport, EngineError> {
        let mut last = None;
        let mut first_error = None;
        let mut next = Some(token);
        let mut follow_up = false;

        while let Some(token) = next.take() {
            match self.garden_once(token.clone()).await {
                Ok(report) => last = Some(report),
                Err(e) => {
                    warn!(error = %e, follow_up, "gardening pass failed");
                    if follow_up {
                        self.garden.carry(token, |current, newer| *current = newer);
                    }
                    first_error.get_or_insert(e);
                }
            }
            next = self.garden.complete();
            if next.is_some() {
                debug!("running coalesced gardening pass");
            }
            follow_up = true;
        }

        match (first_error, last) {
            (Some(e), _) => Err(e),
            (None, Some(report)) => Ok(report),
            (None, None) => Ok(GardenReport::default()),
        }
    }

    async fn garden_once(&self, token: CancellationToken) -> Result<GardenReport, EngineError> {
        let _lease = self.writer.lock().await;
        let gardener = self.gardener.clone();
        Ok(tokio::task::spawn_blocking(move || gardener.run(&token)).await??)
    }
}
