//! Section checks and best-practice linting.

use super::{ErrorCategory, ValidationError, ValidationResult, ValidationWarning};
use crate::sections::DOMAIN_PLACEHOLDER;
use crate::Config;

/// Check each section for values the renewer cannot work with.
pub fn validate_sections(config: &Config) -> ValidationResult {
    let mut result = ValidationResult::new();

    match &config.issuer {
        None => result.add_error(ValidationError::new(
            ErrorCategory::Issuer,
            "no 'issuer' section; certificates cannot be obtained",
        )),
        Some(issuer) => {
            if issuer.command.is_empty() {
                result.add_error(ValidationError::new(
                    ErrorCategory::Issuer,
                    "command must name the program to run",
                ));
            }
            if issuer.timeout_secs == 0 {
                result.add_error(ValidationError::new(
                    ErrorCategory::Issuer,
                    "timeout-secs must be greater than zero",
                ));
            }
            for (name, path) in [
                ("certificate-path", &issuer.certificate_path),
                ("key-path", &issuer.key_path),
            ] {
                if !path.contains(DOMAIN_PLACEHOLDER) {
                    result.add_error(ValidationError::new(
                        ErrorCategory::Issuer,
                        format!("{} must contain {}", name, DOMAIN_PLACEHOLDER),
                    ));
                }
            }
        }
    }

    match &config.publisher {
        None => result.add_error(ValidationError::new(
            ErrorCategory::Publisher,
            "no 'publisher' section; domains cannot be listed or updated",
        )),
        Some(publisher) => {
            if publisher.access_key.is_empty() || publisher.secret_key.is_empty() {
                result.add_error(ValidationError::new(
                    ErrorCategory::Publisher,
                    "access-key and secret-key must not be empty",
                ));
            }
            if !publisher.endpoint.starts_with("http://")
                && !publisher.endpoint.starts_with("https://")
            {
                result.add_error(ValidationError::new(
                    ErrorCategory::Publisher,
                    format!("endpoint '{}' is not an http(s) URL", publisher.endpoint),
                ));
            }
        }
    }

    if let Some(notifier) = &config.notifier {
        if notifier.recipients.is_empty() {
            result.add_error(ValidationError::new(
                ErrorCategory::Notifier,
                "recipients must list at least one address",
            ));
        }
        if notifier.smtp_host.is_empty() {
            result.add_error(ValidationError::new(
                ErrorCategory::Notifier,
                "smtp-host must not be empty",
            ));
        }
    }

    let renewal = &config.renewal;
    if renewal.lookahead_days == 0 {
        result.add_error(ValidationError::new(
            ErrorCategory::Renewal,
            "lookahead-days must be greater than zero",
        ));
    }
    if renewal.call_timeout_secs == 0 {
        result.add_error(ValidationError::new(
            ErrorCategory::Renewal,
            "call-timeout-secs must be greater than zero",
        ));
    }
    if renewal.workers == 0 {
        result.add_error(ValidationError::new(
            ErrorCategory::Renewal,
            "workers must be at least 1",
        ));
    }
    if renewal.max_issuances == Some(0) {
        result.add_error(ValidationError::new(
            ErrorCategory::Renewal,
            "max-issuances of 0 would never renew anything; remove it instead",
        ));
    }

    result
}

/// Warn about settings that work but are likely mistakes.
pub fn lint_config(config: &Config) -> ValidationResult {
    let mut result = ValidationResult::new();

    if config.notifier.is_none() {
        result.add_warning(ValidationWarning::new(
            "No 'notifier' section; unresolved renewal failures will only be logged",
        ));
    }

    if let Some(issuer) = &config.issuer {
        if !issuer.command.iter().any(|arg| arg.contains(DOMAIN_PLACEHOLDER)) {
            result.add_warning(ValidationWarning::new(format!(
                "Issuer command never mentions {}; every domain gets the same command",
                DOMAIN_PLACEHOLDER
            )));
        }
        if issuer.timeout_secs > config.renewal.call_timeout_secs {
            result.add_warning(ValidationWarning::new(format!(
                "Issuer timeout-secs ({}) exceeds call-timeout-secs ({}); issuance is cut off at {}s",
                issuer.timeout_secs,
                config.renewal.call_timeout_secs,
                config.renewal.call_timeout_secs
            )));
        }
    }

    // Let's Encrypt allows 50 new orders per account per 3 hours.
    let renewal = &config.renewal;
    if renewal.max_issuances.is_none() {
        result.add_warning(ValidationWarning::new(
            "No max-issuances set; large inventories can exhaust issuer rate limits",
        ));
    }
    if renewal.min_interval_secs < 3600 {
        result.add_warning(ValidationWarning::new(format!(
            "min-interval-secs is {}; cycles more often than hourly risk issuer rate limits",
            renewal.min_interval_secs
        )));
    }
    if renewal.lookahead_days > 60 {
        result.add_warning(ValidationWarning::new(format!(
            "lookahead-days is {}; 90-day certificates would be renewed almost immediately",
            renewal.lookahead_days
        )));
    }

    result
}
