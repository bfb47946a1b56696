//! Configuration error types.

use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read configuration file {path}")]
    #[diagnostic(code(autossl::config::io))]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Syntax(#[from] kdl::KdlError),

    #[error("{message}")]
    #[diagnostic(code(autossl::config::invalid), help("{help}"))]
    Invalid { message: String, help: String },

    #[error("configuration validation failed: {}", .issues.join("; "))]
    #[diagnostic(code(autossl::config::validation))]
    Validation { issues: Vec<String> },

    #[error("failed to watch configuration file: {0}")]
    #[diagnostic(code(autossl::config::watch))]
    Watch(#[from] notify::Error),
}

impl ConfigError {
    pub(crate) fn invalid(message: impl Into<String>, help: impl Into<String>) -> Self {
        ConfigError::Invalid {
            message: message.into(),
            help: help.into(),
        }
    }
}
