//! Renewal cycle orchestration.
//!
//! One cycle reconciles capabilities with the current configuration,
//! selects the domains that need work, runs them through the pipeline,
//! resumes failures once, and alerts operators about whatever is left.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use autossl_common::{CycleId, FailureRecord, Stage, WorkItem};
use autossl_config::{ConfigSnapshot, ConfigStore};

use crate::call::CallGuard;
use crate::capabilities::{CapabilityFactory, CapabilityRegistry, CapabilitySet};
use crate::pipeline::{Pipeline, PipelineOutcome};
use crate::report::FailureReport;
use crate::resume::{FailureBuckets, ResumeScheduler};
use crate::selector::{DomainSelector, InventoryError};

/// What happened to the failure alert of a cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationOutcome {
    /// No residual failures
    NotNeeded,
    Sent,
    /// The cycle was cancelled before the alert could be sent
    Skipped,
    /// No notifier is configured
    NoNotifier,
    /// The notifier section lists no recipients
    NoRecipients,
    /// Delivery failed with the given cause
    Failed(String),
}

/// Summary of one renewal cycle.
#[derive(Debug)]
pub struct CycleReport {
    pub cycle_id: CycleId,
    /// Domains in the working set
    pub selected: usize,
    /// Domains that completed every stage on the first pass
    pub first_pass_succeeded: usize,
    /// Domains that completed after resuming
    pub recovered: usize,
    /// Failures left after the resume pass
    pub residual: Vec<FailureRecord>,
    /// Why the working set could not be built, if it could not
    pub inventory_error: Option<String>,
    /// Capabilities that could not be rebuilt from changed configuration
    pub capability_errors: Vec<String>,
    pub notification: NotificationOutcome,
    pub cancelled: bool,
    pub elapsed: Duration,
}

impl CycleReport {
    fn new(cycle_id: CycleId) -> Self {
        Self {
            cycle_id,
            selected: 0,
            first_pass_succeeded: 0,
            recovered: 0,
            residual: Vec::new(),
            inventory_error: None,
            capability_errors: Vec::new(),
            notification: NotificationOutcome::NotNeeded,
            cancelled: false,
            elapsed: Duration::ZERO,
        }
    }

    /// Whether any domain is still left unrenewed.
    pub fn has_residual_failures(&self) -> bool {
        !self.residual.is_empty()
    }
}

/// Drives renewal cycles.
pub struct CycleOrchestrator {
    store: Arc<ConfigStore>,
    registry: CapabilityRegistry,
}

impl CycleOrchestrator {
    /// Create an orchestrator reading configuration from `store` and
    /// building capabilities with `factory`.
    pub fn new(store: Arc<ConfigStore>, factory: Arc<dyn CapabilityFactory>) -> Self {
        Self {
            store,
            registry: CapabilityRegistry::new(factory),
        }
    }

    pub fn store(&self) -> &Arc<ConfigStore> {
        &self.store
    }

    /// Run cycles until `cancel` fires.
    ///
    /// Consecutive cycles start at least the configured minimum interval
    /// apart; the interval is re-read after every cycle so reloads apply.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(
            min_interval_secs = self.store.current().renewal.min_interval().as_secs(),
            "Starting certificate renewal loop"
        );

        loop {
            let started = Instant::now();
            let report = self.run_cycle(&cancel).await;

            if report.cancelled || cancel.is_cancelled() {
                break;
            }

            let interval = self.store.current().renewal.min_interval();
            let wait = interval.saturating_sub(started.elapsed());
            info!(next_cycle_in_secs = wait.as_secs(), "Waiting for next renewal cycle");

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(wait) => {}
            }
        }

        info!("Certificate renewal loop stopped");
    }

    /// Run a single cycle.
    pub async fn run_cycle(&self, cancel: &CancellationToken) -> CycleReport {
        let cycle_id = CycleId::new();
        let span = info_span!("cycle", cycle_id = %cycle_id);
        self.execute(cycle_id, cancel).instrument(span).await
    }

    async fn execute(&self, cycle_id: CycleId, cancel: &CancellationToken) -> CycleReport {
        let started = Instant::now();
        let mut report = CycleReport::new(cycle_id);

        let config = self.store.current();
        let reconciliation = self.registry.reconcile(&config);
        report.capability_errors = reconciliation
            .errors
            .iter()
            .map(ToString::to_string)
            .collect();
        let capabilities = reconciliation.capabilities;
        let snapshot = reconciliation.snapshot;
        let renewal = &snapshot.renewal;

        let guard = CallGuard::new(renewal.call_timeout(), cancel.clone());
        let selector = DomainSelector::from_config(renewal);
        let now = Utc::now().timestamp();

        let collected = match &capabilities.inventory {
            Some(inventory) => selector.collect(inventory.as_ref(), &guard, now).await,
            None => Err(InventoryError::Unavailable),
        };
        let items = match collected {
            Ok(items) => items,
            Err(e) => {
                error!(error = %e, "Failed to build the working set");
                report.cancelled = e.is_cancelled();
                report.inventory_error = Some(e.to_string());
                Vec::new()
            }
        };

        report.selected = items.len();
        info!(selected = report.selected, "Starting renewal cycle");

        if !items.is_empty() {
            self.process(items, &capabilities, &snapshot, guard, &mut report)
                .await;
        }

        report.elapsed = started.elapsed();
        info!(
            selected = report.selected,
            first_pass_succeeded = report.first_pass_succeeded,
            recovered = report.recovered,
            residual = report.residual.len(),
            cancelled = report.cancelled,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Renewal cycle completed"
        );
        report
    }

    /// First pass, resume pass and alerting for a non-empty working set.
    async fn process(
        &self,
        items: Vec<WorkItem>,
        capabilities: &Arc<CapabilitySet>,
        snapshot: &ConfigSnapshot,
        guard: CallGuard,
        report: &mut CycleReport,
    ) {
        let workers = snapshot.renewal.workers;
        let pipeline = Pipeline::new(capabilities.clone(), guard.clone());

        let entries = items.into_iter().map(|item| (item, Stage::Obtain));
        let mut buckets = FailureBuckets::new();
        for outcome in pipeline.run_batch(entries, workers).await {
            match outcome {
                PipelineOutcome::Done(item) => {
                    info!(domain = %item.name, "Certificate renewed");
                    report.first_pass_succeeded += 1;
                }
                PipelineOutcome::Failed { item, failure } => buckets.insert(item, failure),
            }
        }

        for stage in Stage::ALL {
            let count = buckets.count(stage);
            if count > 0 {
                warn!(
                    stage = %stage,
                    count,
                    domains = ?buckets.domains(stage),
                    "First-pass failures"
                );
            }
        }

        if pipeline.is_cancelled() {
            warn!("Cycle cancelled, skipping resume and notification");
            report.cancelled = true;
            report.residual = buckets.to_records();
            report.notification = NotificationOutcome::Skipped;
            return;
        }

        let resumed = ResumeScheduler::new(&pipeline, workers).resume(buckets).await;
        report.recovered = resumed.recovered.len();
        report.residual = resumed.residual;

        if pipeline.is_cancelled() {
            warn!("Cycle cancelled during resume, skipping notification");
            report.cancelled = true;
            report.notification = NotificationOutcome::Skipped;
        } else if report.has_residual_failures() {
            report.notification = self
                .notify(&report.cycle_id, &report.residual, capabilities, snapshot, &guard)
                .await;
        }
    }

    async fn notify(
        &self,
        cycle_id: &CycleId,
        residual: &[FailureRecord],
        capabilities: &CapabilitySet,
        snapshot: &ConfigSnapshot,
        guard: &CallGuard,
    ) -> NotificationOutcome {
        let Some(notifier) = &capabilities.notifier else {
            warn!(
                failed = residual.len(),
                "No notifier configured, renewal failures are only logged"
            );
            return NotificationOutcome::NoNotifier;
        };

        let recipients = snapshot.recipients();
        if recipients.is_empty() {
            warn!(failed = residual.len(), "Notifier has no recipients");
            return NotificationOutcome::NoRecipients;
        }

        let notification = FailureReport::new(cycle_id, residual).to_notification(recipients);
        debug!(subject = %notification.subject, "Sending failure report");

        match guard.run(notifier.send(&notification)).await {
            Ok(()) => {
                info!(
                    recipients = recipients.len(),
                    failed = residual.len(),
                    "Failure report sent"
                );
                NotificationOutcome::Sent
            }
            Err(e) => {
                error!(error = %e, "Failed to send failure report");
                NotificationOutcome::Failed(e.to_string())
            }
        }
    }
}

impl std::fmt::Debug for CycleOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CycleOrchestrator")
            .field("config_path", &self.store.path())
            .field("registry", &self.registry)
            .finish()
    }
}
