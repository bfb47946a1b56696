//! Configuration validation.
//!
//! Parsing only checks shape; validation checks that the parsed values make
//! sense together. Errors make a configuration unusable, warnings are
//! logged and otherwise ignored.

mod lint;

use std::fmt;

use crate::Config;

pub use lint::{lint_config, validate_sections};

/// Which part of the configuration an error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Issuer,
    Publisher,
    Notifier,
    Renewal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCategory::Issuer => "issuer",
            ErrorCategory::Publisher => "publisher",
            ErrorCategory::Notifier => "notifier",
            ErrorCategory::Renewal => "renewal",
        };
        f.write_str(name)
    }
}

/// A problem that makes the configuration unusable.
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub category: ErrorCategory,
    pub message: String,
}

impl ValidationError {
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.category, self.message)
    }
}

/// A suspicious but workable setting.
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub message: String,
}

impl ValidationWarning {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Collected validation outcome.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }

    pub fn merge(&mut self, other: ValidationResult) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }

    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Run all validation passes.
pub fn validate_config(config: &Config) -> ValidationResult {
    let mut result = validate_sections(config);
    result.merge(lint_config(config));
    result
}
