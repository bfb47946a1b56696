//! Configuration for the autossl certificate renewer.
//!
//! Configuration is written in KDL:
//!
//! ```kdl
//! issuer {
//!     command "lego" "--dns" "alidns" "--domains" "{domain}" "run"
//!     certificate-path "/var/lib/autossl/certificates/{domain}.crt"
//!     key-path "/var/lib/autossl/certificates/{domain}.key"
//! }
//! publisher {
//!     access-key "..."
//!     secret-key "..."
//! }
//! notifier {
//!     smtp-host "smtp.example.com"
//!     username "alerts@example.com"
//!     password "..."
//!     sender "alerts@example.com"
//!     recipients "ops@example.com"
//! }
//! renewal {
//!     lookahead-days 30
//!     max-issuances 40
//! }
//! ```
//!
//! [`ConfigStore`] holds the live configuration and reloads it on demand,
//! [`ConfigWatcher`] triggers reloads when the file changes, and
//! [`ChangeDetector`] turns successive configurations into per-section
//! change markers for the renewer.

use std::path::Path;

use tracing::{debug, warn};

mod change;
mod error;
pub mod kdl;
mod sections;
mod store;
pub mod validate;
mod watch;

pub use change::{ChangeDetector, ConfigSnapshot, Section, Tracked};
pub use error::ConfigError;
pub use sections::{
    IssuerConfig, NotifierConfig, PublisherConfig, RenewalConfig, DEFAULT_LOOKAHEAD_DAYS,
    DEFAULT_MIN_INTERVAL_SECS, DOMAIN_PLACEHOLDER, MIN_INTERVAL_FLOOR_SECS,
};
pub use store::ConfigStore;
pub use validate::{ErrorCategory, ValidationError, ValidationResult, ValidationWarning};
pub use watch::ConfigWatcher;

/// Complete renewer configuration.
///
/// Capability sections are optional at parse time so that partial files
/// still load for `autossl test`; [`Config::validate`] decides whether the
/// combination is usable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    pub issuer: Option<IssuerConfig>,
    pub publisher: Option<PublisherConfig>,
    pub notifier: Option<NotifierConfig>,
    pub renewal: RenewalConfig,
}

impl Config {
    /// Load, parse and validate a configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        debug!(path = %path.display(), "Loading configuration file");

        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let config = Self::parse_kdl(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse KDL text without validating it.
    pub fn parse_kdl(text: &str) -> Result<Self, ConfigError> {
        kdl::parse_document(text)
    }

    /// Validate the configuration, logging any warnings.
    pub fn validate(&self) -> Result<ValidationResult, ConfigError> {
        let result = validate::validate_config(self);

        for warning in &result.warnings {
            warn!(warning = %warning.message, "Configuration warning");
        }

        if result.is_ok() {
            Ok(result)
        } else {
            Err(ConfigError::Validation {
                issues: result.errors.iter().map(ToString::to_string).collect(),
            })
        }
    }
}
