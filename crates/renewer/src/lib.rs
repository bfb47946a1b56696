//! autossl renewer library
//!
//! Keeps TLS certificates of CDN-hosted domains renewed.
//!
//! Each cycle:
//!
//! - **Reconciles** capabilities with the configuration, rebuilding only
//!   the ones whose section changed
//! - **Selects** domains without a certificate or with one expiring inside
//!   the lookahead window
//! - **Runs** each selected domain through Obtain, Publish, EnforceTLS and
//!   RetireOld, stopping at the first failing stage
//! - **Resumes** every failure once, starting at the stage that failed
//! - **Reports** what is still failing to operators
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use autossl_config::ConfigStore;
//! use autossl_renewer::{CycleOrchestrator, DefaultCapabilityFactory};
//! use tokio_util::sync::CancellationToken;
//!
//! let store = Arc::new(ConfigStore::load("autossl.kdl")?);
//! let orchestrator = CycleOrchestrator::new(store, Arc::new(DefaultCapabilityFactory));
//! orchestrator.run(CancellationToken::new()).await;
//! ```

// ============================================================================
// Module Declarations
// ============================================================================

pub mod adapters;
pub mod call;
pub mod capabilities;
pub mod orchestrator;
pub mod pipeline;
pub mod ports;
pub mod reload;
pub mod report;
pub mod resume;
pub mod selector;

// ============================================================================
// Public API Re-exports
// ============================================================================

// Capability ports
pub use ports::{
    Attachment, CertificateIssuer, CertificatePublisher, DomainInventory, IssuedCertificate,
    Notification, Notifier,
};

// Capability management
pub use capabilities::{
    CapabilityFactory, CapabilityRegistry, CapabilitySet, CdnCapabilities, ReconcileError,
};

// Pipeline
pub use call::CallGuard;
pub use pipeline::{Pipeline, PipelineOutcome, StageError, StageFailure};
pub use resume::{FailedItem, FailureBuckets, ResumeOutcome, ResumeScheduler};
pub use selector::{DomainSelector, InventoryError};

// Cycles
pub use orchestrator::{CycleOrchestrator, CycleReport, NotificationOutcome};
pub use report::FailureReport;

// Adapters
pub use adapters::DefaultCapabilityFactory;

// Reload
pub use reload::{SignalManager, SignalType};
