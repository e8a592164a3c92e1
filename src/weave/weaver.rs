//! EdgeWeaver: per-batch ingestion
//!
//! Upserts a batch of records, extracts candidates for each and materializes
//! them through the store's idempotent edge insert. The community view used
//! for gating is frozen at batch start and not refreshed mid-batch.

use super::extractor::CandidateExtractor;
use super::gate::{GateStats, LouvainGate};
use super::types::ContentRecord;
use crate::config::GateConfig;
use crate::graph::{GraphError, GraphResult, GraphStore, NodeId};
use crate::lane::RunStatus;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Outcome of one ingestion batch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReport {
    /// Records whose candidates were extracted
    pub nodes_processed: usize,
    pub edges_added: usize,
    /// Candidates that already existed
    pub edges_skipped: usize,
    /// Candidates refused by the store (missing endpoint, similarity self-loop)
    pub edges_rejected: usize,
    /// Records whose extraction failed
    pub failures: Vec<NodeId>,
    pub gate: GateStats,
    pub status: RunStatus,
}

impl BatchReport {
    /// Fold a follow-up batch's counts into this report
    pub fn absorb(&mut self, other: BatchReport) {
        self.nodes_processed += other.nodes_processed;
        self.edges_added += other.edges_added;
        self.edges_skipped += other.edges_skipped;
        self.edges_rejected += other.edges_rejected;
        self.failures.extend(other.failures);
        self.gate.checked += other.gate.checked;
        self.gate.rejected += other.gate.rejected;
        if other.status != RunStatus::Clean {
            self.status = other.status;
        }
    }
}

/// Fold `incoming` into `batch`; a record with an id already present
/// replaces the earlier one in place
pub fn merge_records(batch: &mut Vec<ContentRecord>, incoming: Vec<ContentRecord>) {
    let mut positions: HashMap<NodeId, usize> = batch
        .iter()
        .enumerate()
        .map(|(i, r)| (r.id().clone(), i))
        .collect();
    for record in incoming {
        match positions.get(record.id()) {
            Some(&i) => batch[i] = record,
            None => {
                positions.insert(record.id().clone(), batch.len());
                batch.push(record);
            }
        }
    }
}

pub struct EdgeWeaver {
    store: Arc<GraphStore>,
    extractor: CandidateExtractor,
    gate: GateConfig,
}

impl EdgeWeaver {
    pub fn new(store: Arc<GraphStore>, extractor: CandidateExtractor, gate: GateConfig) -> Self {
        Self {
            store,
            extractor,
            gate,
        }
    }

    pub fn extractor(&self) -> &CandidateExtractor {
        &self.extractor
    }

    /// Weave one batch.
    ///
    /// Item-level problems are counted in the report. If the persistence
    /// collaborator fails, nothing from the batch is published and the error
    /// is returned.
    pub fn weave(&self, batch: &[ContentRecord]) -> GraphResult<BatchReport> {
        let started = Instant::now();
        let mut deduped = Vec::with_capacity(batch.len());
        merge_records(&mut deduped, batch.to_vec());

        let gate = LouvainGate::from_graph(&self.store.snapshot(), &self.gate);
        let mut tx = self.store.begin();
        let mut report = BatchReport::default();

        for record in deduped.iter().filter(|r| !r.id().as_str().trim().is_empty()) {
            tx.add_node(record.node.clone());
        }
        let mentions = self.extractor.mention_index(tx.graph());

        for record in &deduped {
            let candidates = match self.extractor.extract(record, &mentions, &gate, &mut report.gate) {
                Ok(candidates) => candidates,
                Err(e) => {
                    warn!(error = %e, "skipping record");
                    report.failures.push(record.id().clone());
                    continue;
                }
            };
            report.nodes_processed += 1;

            for candidate in candidates {
                match tx.add_edge(candidate.into_edge()) {
                    Ok(true) => report.edges_added += 1,
                    Ok(false) => report.edges_skipped += 1,
                    Err(e @ (GraphError::NodeNotFound(_) | GraphError::SelfLoop(_))) => {
                        debug!(node = %record.id(), error = %e, "candidate rejected");
                        report.edges_rejected += 1;
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        let summary = self.store.commit(tx)?;

        report.status = if report.failures.is_empty() && report.edges_rejected == 0 {
            RunStatus::Clean
        } else {
            RunStatus::Degraded
        };
        info!(
            nodes = report.nodes_processed,
            added = report.edges_added,
            skipped = report.edges_skipped,
            rejected = report.edges_rejected,
            failures = report.failures.len(),
            gate_checked = report.gate.checked,
            gate_rejected = report.gate.rejected,
            deferred = summary.deferred,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "batch woven"
        );
        Ok(report)
    }
}
