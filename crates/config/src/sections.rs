//! Configuration section types.
//!
//! Each capability the renewer rebuilds on change has its own section so
//! that a change to, say, notifier credentials never reconnects the CDN
//! client. Sections compare by value; the "changed" marker lives outside
//! them (see [`crate::change`]).

use std::fmt;
use std::time::Duration;

// ============================================================================
// Issuer
// ============================================================================

/// Certificate issuer configuration.
///
/// The issuer runs an external ACME client (e.g. `lego`) and then reads the
/// issued key and certificate from disk. `{domain}` in any argument or path
/// is replaced with the domain being renewed.
#[derive(Clone, PartialEq, Eq)]
pub struct IssuerConfig {
    /// Command and arguments to run
    pub command: Vec<String>,
    /// Where the command writes the certificate chain
    pub certificate_path: String,
    /// Where the command writes the private key
    pub key_path: String,
    /// Upper bound for one command run
    pub timeout_secs: u64,
    /// Extra environment for the command (DNS provider credentials etc.)
    pub env: Vec<(String, String)>,
}

/// Placeholder substituted with the domain name in issuer settings
pub const DOMAIN_PLACEHOLDER: &str = "{domain}";

pub(crate) fn default_issuer_timeout() -> u64 {
    300
}

impl IssuerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl fmt::Debug for IssuerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let env_keys: Vec<&str> = self.env.iter().map(|(k, _)| k.as_str()).collect();
        f.debug_struct("IssuerConfig")
            .field("command", &self.command)
            .field("certificate_path", &self.certificate_path)
            .field("key_path", &self.key_path)
            .field("timeout_secs", &self.timeout_secs)
            .field("env_keys", &env_keys)
            .finish()
    }
}

// ============================================================================
// Publisher
// ============================================================================

/// CDN publisher configuration (Qiniu).
#[derive(Clone, PartialEq, Eq)]
pub struct PublisherConfig {
    pub access_key: String,
    pub secret_key: String,
    /// API base URL
    pub endpoint: String,
}

pub(crate) fn default_publisher_endpoint() -> String {
    "https://api.qiniu.com".to_string()
}

impl fmt::Debug for PublisherConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublisherConfig")
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

// ============================================================================
// Notifier
// ============================================================================

/// SMTP notifier configuration.
#[derive(Clone, PartialEq, Eq)]
pub struct NotifierConfig {
    pub smtp_host: String,
    /// 465 uses implicit TLS, anything else STARTTLS
    pub smtp_port: u16,
    pub username: String,
    pub password: String,
    /// From address
    pub sender: String,
    /// Alert recipients
    pub recipients: Vec<String>,
}

pub(crate) fn default_smtp_port() -> u16 {
    465
}

impl fmt::Debug for NotifierConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotifierConfig")
            .field("smtp_host", &self.smtp_host)
            .field("smtp_port", &self.smtp_port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("sender", &self.sender)
            .field("recipients", &self.recipients)
            .finish()
    }
}

// ============================================================================
// Renewal
// ============================================================================

/// Default renewal window (30 days)
pub const DEFAULT_LOOKAHEAD_DAYS: u32 = 30;

/// Default minimum time between cycle starts (12 hours)
pub const DEFAULT_MIN_INTERVAL_SECS: u64 = 12 * 3600;

/// Floor for the inter-cycle interval
pub const MIN_INTERVAL_FLOOR_SECS: u64 = 60;

/// Scheduling and selection policy for renewal cycles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenewalConfig {
    /// Renew certificates expiring within this many days
    pub lookahead_days: u32,
    /// Minimum time between the starts of two cycles
    pub min_interval_secs: u64,
    /// Deadline for each individual capability call
    pub call_timeout_secs: u64,
    /// Maximum number of certificates to issue per cycle
    pub max_issuances: Option<usize>,
    /// Number of domains processed concurrently
    pub workers: usize,
    /// Domains that are never renewed automatically
    pub exclude: Vec<String>,
}

impl Default for RenewalConfig {
    fn default() -> Self {
        Self {
            lookahead_days: DEFAULT_LOOKAHEAD_DAYS,
            min_interval_secs: DEFAULT_MIN_INTERVAL_SECS,
            call_timeout_secs: 300,
            max_issuances: None,
            workers: 1,
            exclude: Vec::new(),
        }
    }
}

impl RenewalConfig {
    /// Renewal window as a duration.
    pub fn lookahead(&self) -> Duration {
        Duration::from_secs(u64::from(self.lookahead_days) * 86400)
    }

    /// Inter-cycle interval, clamped to the floor.
    pub fn min_interval(&self) -> Duration {
        Duration::from_secs(self.min_interval_secs.max(MIN_INTERVAL_FLOOR_SECS))
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}
