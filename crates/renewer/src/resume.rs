//! Resuming failed work items.
//!
//! First-pass failures are grouped by the stage they failed at. Each item
//! then gets exactly one more attempt, re-entering the pipeline at that
//! stage with the artifacts it already holds.

use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use autossl_common::{FailureRecord, Stage, WorkItem};

use crate::pipeline::{Pipeline, PipelineOutcome, StageFailure};

/// A work item together with the failure that stopped it.
#[derive(Debug)]
pub struct FailedItem {
    pub item: WorkItem,
    pub failure: StageFailure,
}

/// First-pass failures grouped by failing stage, in stage order.
#[derive(Debug, Default)]
pub struct FailureBuckets {
    buckets: BTreeMap<Stage, Vec<FailedItem>>,
}

impl FailureBuckets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, item: WorkItem, failure: StageFailure) {
        self.buckets
            .entry(failure.stage)
            .or_default()
            .push(FailedItem { item, failure });
    }

    /// Total number of failed items across all stages.
    pub fn len(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Number of items that failed at `stage`.
    pub fn count(&self, stage: Stage) -> usize {
        self.buckets.get(&stage).map_or(0, Vec::len)
    }

    /// Domains that failed at `stage`, in failure order.
    pub fn domains(&self, stage: Stage) -> Vec<&str> {
        self.buckets
            .get(&stage)
            .map(|items| items.iter().map(|f| f.item.name.as_str()).collect())
            .unwrap_or_default()
    }

    /// Report rows for the failures as they stand.
    pub fn to_records(&self) -> Vec<FailureRecord> {
        self.buckets
            .values()
            .flatten()
            .map(|f| f.failure.to_record())
            .collect()
    }
}

impl IntoIterator for FailureBuckets {
    type Item = (Stage, Vec<FailedItem>);
    type IntoIter = std::collections::btree_map::IntoIter<Stage, Vec<FailedItem>>;

    fn into_iter(self) -> Self::IntoIter {
        self.buckets.into_iter()
    }
}

/// Outcome of the resume pass.
#[derive(Debug, Default)]
pub struct ResumeOutcome {
    /// Items that completed on their second attempt
    pub recovered: Vec<WorkItem>,
    /// Failures of the second attempt
    pub residual: Vec<FailureRecord>,
}

/// Re-runs each failed item once from its failing stage.
#[derive(Debug)]
pub struct ResumeScheduler<'a> {
    pipeline: &'a Pipeline,
    workers: usize,
}

impl<'a> ResumeScheduler<'a> {
    pub fn new(pipeline: &'a Pipeline, workers: usize) -> Self {
        Self { pipeline, workers }
    }

    pub async fn resume(&self, buckets: FailureBuckets) -> ResumeOutcome {
        let mut outcome = ResumeOutcome::default();
        if buckets.is_empty() {
            return outcome;
        }

        info!(failed = buckets.len(), "Resuming failed domains");

        for (stage, failed) in buckets {
            debug!(stage = %stage, count = failed.len(), "Resuming bucket");

            let entries = failed.into_iter().map(|f| (f.item, f.failure.stage));
            for result in self.pipeline.run_batch(entries, self.workers).await {
                match result {
                    PipelineOutcome::Done(item) => {
                        info!(domain = %item.name, resumed_from = %stage, "Domain recovered");
                        outcome.recovered.push(item);
                    }
                    PipelineOutcome::Failed { failure, .. } => {
                        warn!(
                            domain = %failure.domain,
                            stage = %failure.stage,
                            error = %failure.cause,
                            "Domain failed again after resume"
                        );
                        outcome.residual.push(failure.to_record());
                    }
                }
            }
        }

        outcome
    }
}
