//! Renewal data model shared by the config, adapter and pipeline layers.
//!
//! These types describe the CDN-side inventory ([`Domain`],
//! [`CertificateRecord`]), the per-cycle record that flows through the
//! renewal pipeline ([`WorkItem`]), the fixed set of pipeline [`Stage`]s,
//! and the [`FailureRecord`] rows that end up in an operator alert.

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Inventory
// ============================================================================

/// A domain served by the CDN.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Domain {
    /// Fully-qualified domain name
    pub name: String,
}

impl Domain {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// A certificate currently stored on the CDN.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateRecord {
    /// Domain the certificate was uploaded for
    pub domain_name: String,
    /// Vendor-assigned certificate ID
    pub cert_id: String,
    /// Expiry as unix seconds
    pub not_after: i64,
}

impl CertificateRecord {
    pub fn new(domain_name: impl Into<String>, cert_id: impl Into<String>, not_after: i64) -> Self {
        Self {
            domain_name: domain_name.into(),
            cert_id: cert_id.into(),
            not_after,
        }
    }
}

// ============================================================================
// Pipeline Stages
// ============================================================================

/// One step of the renewal pipeline.
///
/// The derived ordering is the only valid forward order: a certificate
/// must be obtained before it can be published, and published before
/// HTTPS can be enforced against its ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    /// Issue a new certificate and private key
    Obtain,
    /// Upload the certificate to the CDN
    Publish,
    /// Point the domain at the uploaded certificate and force HTTPS
    EnforceTls,
    /// Delete the previous certificate from the CDN
    RetireOld,
}

impl Stage {
    /// All stages in execution order.
    pub const ALL: [Stage; 4] = [
        Stage::Obtain,
        Stage::Publish,
        Stage::EnforceTls,
        Stage::RetireOld,
    ];

    /// Position of this stage in [`Stage::ALL`].
    pub const fn index(self) -> usize {
        match self {
            Stage::Obtain => 0,
            Stage::Publish => 1,
            Stage::EnforceTls => 2,
            Stage::RetireOld => 3,
        }
    }

    /// Stages to execute when (re-)entering the pipeline at `self`.
    ///
    /// A failure at stage S is resumed by running exactly this slice, so
    /// stages before S are never repeated.
    pub fn remaining_from(self) -> &'static [Stage] {
        &Self::ALL[self.index()..]
    }

    /// Stable lowercase name used in logs and reports.
    pub const fn as_str(self) -> &'static str {
        match self {
            Stage::Obtain => "obtain",
            Stage::Publish => "publish",
            Stage::EnforceTls => "enforce-tls",
            Stage::RetireOld => "retire-old",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Work Items
// ============================================================================

/// Mutable per-domain record carried through the pipeline for one cycle.
///
/// Created by the domain selector at the start of a cycle and discarded at
/// its end. Fields are filled in as stages complete: `key_pem`/`cert_pem`
/// by Obtain, `cert_id` by Publish.
#[derive(Clone, PartialEq, Eq)]
pub struct WorkItem {
    /// Domain being renewed
    pub name: String,
    /// Certificate to retire once the new one is live
    pub old_cert_id: Option<String>,
    /// CDN ID of the newly uploaded certificate
    pub cert_id: Option<String>,
    /// PEM private key of the new certificate
    pub key_pem: Option<String>,
    /// PEM certificate chain
    pub cert_pem: Option<String>,
}

impl WorkItem {
    /// Create a work item for `name`.
    ///
    /// An empty `old_cert_id` is treated the same as none.
    pub fn new(name: impl Into<String>, old_cert_id: Option<String>) -> Self {
        Self {
            name: name.into(),
            old_cert_id: old_cert_id.filter(|id| !id.is_empty()),
            cert_id: None,
            key_pem: None,
            cert_pem: None,
        }
    }

    /// The certificate to retire, if any.
    pub fn retirable_cert_id(&self) -> Option<&str> {
        self.old_cert_id.as_deref().filter(|id| !id.is_empty())
    }
}

// Key material stays out of logs.
impl fmt::Debug for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkItem")
            .field("name", &self.name)
            .field("old_cert_id", &self.old_cert_id)
            .field("cert_id", &self.cert_id)
            .field("has_key", &self.key_pem.is_some())
            .field("has_cert", &self.cert_pem.is_some())
            .finish()
    }
}

// ============================================================================
// Failures
// ============================================================================

/// A failure that remained unresolved after its resume attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    /// Domain that failed
    pub domain_name: String,
    /// Stage at which the last attempt failed
    pub stage: Stage,
    /// Human-readable cause
    pub cause: String,
}

impl FailureRecord {
    /// Cause text as shown to operators, prefixed with the failing stage.
    pub fn describe(&self) -> String {
        format!("{} failed: {}", self.stage, self.cause)
    }
}
