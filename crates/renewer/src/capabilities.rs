//! The live capability set and its reconciliation against configuration.

use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, info, warn};

use autossl_common::CapabilityError;
use autossl_config::{
    ChangeDetector, Config, ConfigSnapshot, IssuerConfig, NotifierConfig, PublisherConfig,
    Section,
};

use crate::ports::{CertificateIssuer, CertificatePublisher, DomainInventory, Notifier};

/// Capability instances used by one cycle.
///
/// A set is never mutated once published; reconciliation builds a new set
/// and swaps it in.
#[derive(Clone, Default)]
pub struct CapabilitySet {
    pub inventory: Option<Arc<dyn DomainInventory>>,
    pub issuer: Option<Arc<dyn CertificateIssuer>>,
    pub publisher: Option<Arc<dyn CertificatePublisher>>,
    pub notifier: Option<Arc<dyn Notifier>>,
}

impl fmt::Debug for CapabilitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilitySet")
            .field("inventory", &self.inventory.is_some())
            .field("issuer", &self.issuer.is_some())
            .field("publisher", &self.publisher.is_some())
            .field("notifier", &self.notifier.is_some())
            .finish()
    }
}

/// The CDN client backs both the inventory and the publisher.
#[derive(Clone)]
pub struct CdnCapabilities {
    pub inventory: Arc<dyn DomainInventory>,
    pub publisher: Arc<dyn CertificatePublisher>,
}

/// Builds capability instances from configuration sections.
pub trait CapabilityFactory: Send + Sync {
    fn issuer(&self, config: &IssuerConfig) -> Result<Arc<dyn CertificateIssuer>, CapabilityError>;

    fn cdn(&self, config: &PublisherConfig) -> Result<CdnCapabilities, CapabilityError>;

    fn notifier(&self, config: &NotifierConfig) -> Result<Arc<dyn Notifier>, CapabilityError>;
}

/// A capability that could not be rebuilt.
#[derive(Debug, Error)]
#[error("failed to build {section} capability: {source}")]
pub struct ReconcileError {
    pub section: Section,
    #[source]
    pub source: CapabilityError,
}

/// Result of reconciling the capability set with a configuration.
#[derive(Debug)]
pub struct Reconciliation {
    /// The set the cycle must use
    pub capabilities: Arc<CapabilitySet>,
    /// Configuration as seen by this reconciliation
    pub snapshot: ConfigSnapshot,
    /// Sections whose capability was rebuilt or dropped
    pub rebuilt: Vec<Section>,
    /// Sections whose rebuild failed; the previous instance stays in use
    pub errors: Vec<ReconcileError>,
}

/// Owns the current [`CapabilitySet`].
pub struct CapabilityRegistry {
    current: ArcSwap<CapabilitySet>,
    detector: Mutex<ChangeDetector>,
    factory: Arc<dyn CapabilityFactory>,
}

impl CapabilityRegistry {
    pub fn new(factory: Arc<dyn CapabilityFactory>) -> Self {
        Self {
            current: ArcSwap::from_pointee(CapabilitySet::default()),
            detector: Mutex::new(ChangeDetector::new()),
            factory,
        }
    }

    pub fn current(&self) -> Arc<CapabilitySet> {
        self.current.load_full()
    }

    /// Rebuild the capabilities whose configuration section changed.
    ///
    /// Unchanged sections keep their instance. A section that was removed
    /// drops its capability. A failed build keeps the previous instance and
    /// is retried on the next call.
    pub fn reconcile(&self, config: &Config) -> Reconciliation {
        let mut detector = self.detector.lock();
        let snapshot = detector.snapshot(config);
        let mut next = (*self.current.load_full()).clone();
        let mut rebuilt = Vec::new();
        let mut errors = Vec::new();

        for section in snapshot.changed_sections() {
            let result = match section {
                Section::Issuer => self.rebuild_issuer(&snapshot, &mut next),
                Section::Publisher => self.rebuild_cdn(&snapshot, &mut next),
                Section::Notifier => self.rebuild_notifier(&snapshot, &mut next),
            };

            match result {
                Ok(()) => {
                    detector.acknowledge(section, &snapshot);
                    rebuilt.push(section);
                }
                Err(source) => {
                    let error = ReconcileError { section, source };
                    warn!(
                        section = section.as_str(),
                        error = %error,
                        "Keeping previous capability"
                    );
                    errors.push(error);
                }
            }
        }

        let capabilities = if rebuilt.is_empty() {
            self.current.load_full()
        } else {
            let next = Arc::new(next);
            self.current.store(next.clone());
            info!(sections = ?rebuilt, capabilities = ?next, "Capability set updated");
            next
        };

        Reconciliation {
            capabilities,
            snapshot,
            rebuilt,
            errors,
        }
    }

    fn rebuild_issuer(
        &self,
        snapshot: &ConfigSnapshot,
        next: &mut CapabilitySet,
    ) -> Result<(), CapabilityError> {
        next.issuer = match &snapshot.issuer.value {
            Some(config) => {
                debug!("Building certificate issuer");
                Some(self.factory.issuer(config)?)
            }
            None => None,
        };
        Ok(())
    }

    fn rebuild_cdn(
        &self,
        snapshot: &ConfigSnapshot,
        next: &mut CapabilitySet,
    ) -> Result<(), CapabilityError> {
        match &snapshot.publisher.value {
            Some(config) => {
                debug!("Building CDN client");
                let cdn = self.factory.cdn(config)?;
                next.inventory = Some(cdn.inventory);
                next.publisher = Some(cdn.publisher);
            }
            None => {
                next.inventory = None;
                next.publisher = None;
            }
        }
        Ok(())
    }

    fn rebuild_notifier(
        &self,
        snapshot: &ConfigSnapshot,
        next: &mut CapabilitySet,
    ) -> Result<(), CapabilityError> {
        next.notifier = match &snapshot.notifier.value {
            Some(config) => {
                debug!("Building notifier");
                Some(self.factory.notifier(config)?)
            }
            None => None,
        };
        Ok(())
    }
}

impl fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilityRegistry")
            .field("current", &self.current.load_full())
            .finish()
    }
}
