//! Domain selection.
//!
//! Turns the CDN inventory into the working set of one cycle: every domain
//! without a certificate, plus every domain whose certificate expires
//! inside the lookahead window.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, trace};

use autossl_common::{CapabilityError, CertificateRecord, Domain, WorkItem};
use autossl_config::RenewalConfig;

use crate::call::CallGuard;
use crate::ports::DomainInventory;

/// Failure to build the working set.
#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("no domain inventory is configured")]
    Unavailable,

    #[error("failed to list domains: {0}")]
    Domains(#[source] CapabilityError),

    #[error("failed to list certificates: {0}")]
    Certificates(#[source] CapabilityError),
}

impl InventoryError {
    pub fn is_cancelled(&self) -> bool {
        match self {
            InventoryError::Unavailable => false,
            InventoryError::Domains(e) | InventoryError::Certificates(e) => e.is_cancelled(),
        }
    }
}

/// Selects the domains that need a new certificate.
#[derive(Debug, Clone)]
pub struct DomainSelector {
    lookahead: Duration,
    exclude: HashSet<String>,
    max_issuances: Option<usize>,
}

impl DomainSelector {
    pub fn new(lookahead: Duration) -> Self {
        Self {
            lookahead,
            exclude: HashSet::new(),
            max_issuances: None,
        }
    }

    pub fn from_config(renewal: &RenewalConfig) -> Self {
        Self::new(renewal.lookahead())
            .with_exclusions(renewal.exclude.iter().cloned())
            .with_max_issuances(renewal.max_issuances)
    }

    /// Domains that are never selected.
    pub fn with_exclusions(mut self, names: impl IntoIterator<Item = String>) -> Self {
        self.exclude.extend(names);
        self
    }

    /// Cap the number of items selected per cycle.
    pub fn with_max_issuances(mut self, cap: Option<usize>) -> Self {
        self.max_issuances = cap;
        self
    }

    /// Build the working set from an inventory snapshot.
    ///
    /// `now` is unix seconds. Output follows the order of `domains`, with
    /// repeated names collapsed to their first occurrence.
    pub fn select(
        &self,
        domains: &[Domain],
        certificates: &[CertificateRecord],
        now: i64,
    ) -> Vec<WorkItem> {
        // The latest-expiring record wins when a domain has several.
        let mut current: HashMap<&str, &CertificateRecord> = HashMap::new();
        for record in certificates {
            current
                .entry(record.domain_name.as_str())
                .and_modify(|existing| {
                    if record.not_after > existing.not_after {
                        *existing = record;
                    }
                })
                .or_insert(record);
        }

        let lookahead = i64::try_from(self.lookahead.as_secs()).unwrap_or(i64::MAX);
        let deadline = now.saturating_add(lookahead);

        let mut seen = HashSet::new();
        let mut candidates: Vec<(WorkItem, Option<i64>)> = Vec::new();

        for domain in domains {
            let name = domain.name.as_str();
            if !seen.insert(name) {
                trace!(domain = %name, "Skipping duplicate domain");
                continue;
            }
            if self.exclude.contains(name) {
                debug!(domain = %name, "Domain is excluded from renewal");
                continue;
            }

            match current.get(name) {
                None => {
                    debug!(domain = %name, "Domain has no certificate");
                    candidates.push((WorkItem::new(name, None), None));
                }
                Some(record) if record.not_after <= deadline => {
                    debug!(
                        domain = %name,
                        cert_id = %record.cert_id,
                        not_after = record.not_after,
                        "Certificate expires within the renewal window"
                    );
                    candidates.push((
                        WorkItem::new(name, Some(record.cert_id.clone())),
                        Some(record.not_after),
                    ));
                }
                Some(record) => {
                    trace!(
                        domain = %name,
                        not_after = record.not_after,
                        "Certificate is still valid"
                    );
                }
            }
        }

        if let Some(cap) = self.max_issuances {
            if candidates.len() > cap {
                candidates = self.apply_cap(candidates, cap);
            }
        }

        candidates.into_iter().map(|(item, _)| item).collect()
    }

    /// Keep the `cap` most urgent candidates, preserving their input order.
    fn apply_cap(
        &self,
        candidates: Vec<(WorkItem, Option<i64>)>,
        cap: usize,
    ) -> Vec<(WorkItem, Option<i64>)> {
        // Missing certificates first, then soonest expiry; stable for ties.
        let mut ranked: Vec<usize> = (0..candidates.len()).collect();
        ranked.sort_by_key(|&i| match candidates[i].1 {
            None => (0, i64::MIN),
            Some(not_after) => (1, not_after),
        });
        let keep: HashSet<usize> = ranked.into_iter().take(cap).collect();

        let mut kept = Vec::with_capacity(cap);
        let mut deferred = Vec::new();
        for (i, candidate) in candidates.into_iter().enumerate() {
            if keep.contains(&i) {
                kept.push(candidate);
            } else {
                deferred.push(candidate.0.name);
            }
        }

        info!(
            cap,
            deferred = deferred.len(),
            domains = ?deferred,
            "Issuance cap reached, deferring domains to the next cycle"
        );
        kept
    }

    /// Fetch the inventory and select from it.
    ///
    /// Either listing failing fails the whole selection; the cycle then
    /// runs with an empty working set.
    pub async fn collect(
        &self,
        inventory: &dyn DomainInventory,
        guard: &CallGuard,
        now: i64,
    ) -> Result<Vec<WorkItem>, InventoryError> {
        let domains = guard
            .run(inventory.list_domains())
            .await
            .map_err(InventoryError::Domains)?;
        let certificates = guard
            .run(inventory.list_certificates())
            .await
            .map_err(InventoryError::Certificates)?;

        debug!(
            domains = domains.len(),
            certificates = certificates.len(),
            "Fetched CDN inventory"
        );

        Ok(self.select(&domains, &certificates, now))
    }
}
