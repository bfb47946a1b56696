//! Per-section change detection.
//!
//! The renewer rebuilds a capability only when its configuration section
//! differs from the value it last built from. Sections are compared by
//! value; whether a section "changed" is computed here against the last
//! acknowledged value rather than stored inside the section, so repeated
//! reloads between two cycles can never hide a change.

use std::fmt;

use tracing::trace;

use crate::sections::{IssuerConfig, NotifierConfig, PublisherConfig, RenewalConfig};
use crate::Config;

/// A capability-backing configuration section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Section {
    Issuer,
    Publisher,
    Notifier,
}

impl Section {
    pub const fn as_str(self) -> &'static str {
        match self {
            Section::Issuer => "issuer",
            Section::Publisher => "publisher",
            Section::Notifier => "notifier",
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A section value together with its change marker.
#[derive(Debug, Clone)]
pub struct Tracked<T> {
    pub value: T,
    pub changed: bool,
}

/// Configuration as seen by one renewal cycle.
#[derive(Debug, Clone)]
pub struct ConfigSnapshot {
    pub issuer: Tracked<Option<IssuerConfig>>,
    pub publisher: Tracked<Option<PublisherConfig>>,
    pub notifier: Tracked<Option<NotifierConfig>>,
    pub renewal: RenewalConfig,
}

impl ConfigSnapshot {
    /// Alert recipients, empty when no notifier is configured.
    pub fn recipients(&self) -> &[String] {
        self.notifier
            .value
            .as_ref()
            .map(|n| n.recipients.as_slice())
            .unwrap_or_default()
    }

    /// Sections whose `changed` flag is set.
    pub fn changed_sections(&self) -> Vec<Section> {
        let mut sections = Vec::new();
        if self.issuer.changed {
            sections.push(Section::Issuer);
        }
        if self.publisher.changed {
            sections.push(Section::Publisher);
        }
        if self.notifier.changed {
            sections.push(Section::Notifier);
        }
        sections
    }
}

/// Last acknowledged value of one section.
#[derive(Debug)]
struct ChangeTracker<T> {
    acknowledged: Option<T>,
}

impl<T> Default for ChangeTracker<T> {
    fn default() -> Self {
        Self { acknowledged: None }
    }
}

impl<T: PartialEq + Clone> ChangeTracker<T> {
    /// A never-acknowledged section always counts as changed.
    fn track(&self, current: &T) -> Tracked<T> {
        let changed = match &self.acknowledged {
            None => true,
            Some(previous) => previous != current,
        };
        Tracked {
            value: current.clone(),
            changed,
        }
    }

    fn acknowledge(&mut self, value: &T) {
        self.acknowledged = Some(value.clone());
    }
}

/// Computes [`ConfigSnapshot`]s and remembers what has been acted upon.
#[derive(Debug, Default)]
pub struct ChangeDetector {
    issuer: ChangeTracker<Option<IssuerConfig>>,
    publisher: ChangeTracker<Option<PublisherConfig>>,
    notifier: ChangeTracker<Option<NotifierConfig>>,
}

impl ChangeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compare `config` against the acknowledged sections.
    pub fn snapshot(&self, config: &Config) -> ConfigSnapshot {
        let snapshot = ConfigSnapshot {
            issuer: self.issuer.track(&config.issuer),
            publisher: self.publisher.track(&config.publisher),
            notifier: self.notifier.track(&config.notifier),
            renewal: config.renewal.clone(),
        };

        trace!(
            issuer_changed = snapshot.issuer.changed,
            publisher_changed = snapshot.publisher.changed,
            notifier_changed = snapshot.notifier.changed,
            "Computed configuration snapshot"
        );

        snapshot
    }

    /// Mark a section of `snapshot` as acted upon.
    ///
    /// Only acknowledge after the corresponding capability was rebuilt
    /// successfully; an unacknowledged section is reported as changed
    /// again on the next snapshot.
    pub fn acknowledge(&mut self, section: Section, snapshot: &ConfigSnapshot) {
        match section {
            Section::Issuer => self.issuer.acknowledge(&snapshot.issuer.value),
            Section::Publisher => self.publisher.acknowledge(&snapshot.publisher.value),
            Section::Notifier => self.notifier.acknowledge(&snapshot.notifier.value),
        }
        trace!(section = section.as_str(), "Acknowledged configuration section");
    }
}
