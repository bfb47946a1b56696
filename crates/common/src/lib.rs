//! Shared types and utilities for the autossl certificate renewer.
//!
//! - [`types`]: the renewal data model (domains, certificates, work items,
//!   stages, failure records)
//! - [`errors`]: the error type every external capability returns
//! - [`ids`]: identifier newtypes
//! - [`observability`]: tracing subscriber setup

pub mod errors;
pub mod ids;
pub mod observability;
pub mod types;

pub use errors::CapabilityError;
pub use ids::CycleId;
pub use observability::{init_logging, LogFormat};
pub use types::{CertificateRecord, Domain, FailureRecord, Stage, WorkItem};
