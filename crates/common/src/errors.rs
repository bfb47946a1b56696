//! Capability error types.

use std::time::Duration;
use thiserror::Error;

/// Errors returned by external capabilities (CDN, issuer, notifier).
///
/// Capabilities own their own network retries; anything that reaches the
/// pipeline as a `CapabilityError` is final for that call.
#[derive(Error, Debug)]
pub enum CapabilityError {
    #[error("{0} capability is not configured")]
    Unavailable(&'static str),

    #[error("request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("cancelled")]
    Cancelled,

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl CapabilityError {
    /// Whether the error was produced by local cancellation rather than the
    /// remote side.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, CapabilityError::Cancelled)
    }
}

impl From<serde_json::Error> for CapabilityError {
    fn from(err: serde_json::Error) -> Self {
        CapabilityError::InvalidResponse(err.to_string())
    }
}
