//! Section-level KDL parsing.

use tracing::trace;

use crate::error::ConfigError;
use crate::sections::*;

use super::helpers::{args, get_children, get_int_entry, get_string_entry, get_string_list_entry};

/// Parse an integer setting into the target type, rejecting out-of-range values.
fn parse_number<T: TryFrom<i128>>(
    node: &kdl::KdlNode,
    section: &str,
    name: &str,
) -> Result<Option<T>, ConfigError> {
    match get_int_entry(node, name) {
        None => Ok(None),
        Some(raw) => T::try_from(raw).map(Some).map_err(|_| {
            ConfigError::invalid(
                format!("'{}' in section '{}' is out of range: {}", name, section, raw),
                format!("use a non-negative integer, e.g., {} 30", name),
            )
        }),
    }
}

fn require_string(node: &kdl::KdlNode, section: &str, name: &str) -> Result<String, ConfigError> {
    get_string_entry(node, name).ok_or_else(|| {
        ConfigError::invalid(
            format!("Section '{}' requires a '{}' field", section, name),
            format!("add it inside the block, e.g., {} \"...\"", name),
        )
    })
}

/// Parse the `issuer` block
pub fn parse_issuer(node: &kdl::KdlNode) -> Result<IssuerConfig, ConfigError> {
    trace!("Parsing issuer configuration block");

    let command = get_string_list_entry(node, "command");
    if command.is_empty() {
        return Err(ConfigError::invalid(
            "Section 'issuer' requires a 'command' field",
            "e.g., command \"lego\" \"--domains\" \"{domain}\" \"run\"",
        ));
    }

    let mut env = Vec::new();
    for child in get_children(node, "env") {
        let mut values = args(child).filter_map(|v| v.as_string());
        match (values.next(), values.next()) {
            (Some(key), Some(value)) => env.push((key.to_string(), value.to_string())),
            _ => {
                return Err(ConfigError::invalid(
                    "'env' in section 'issuer' needs a name and a value",
                    "e.g., env \"ALICLOUD_ACCESS_KEY\" \"...\"",
                ));
            }
        }
    }

    let config = IssuerConfig {
        command,
        certificate_path: require_string(node, "issuer", "certificate-path")?,
        key_path: require_string(node, "issuer", "key-path")?,
        timeout_secs: parse_number(node, "issuer", "timeout-secs")?
            .unwrap_or_else(default_issuer_timeout),
        env,
    };

    trace!(
        program = %config.command[0],
        timeout_secs = config.timeout_secs,
        env_count = config.env.len(),
        "Parsed issuer configuration"
    );

    Ok(config)
}

/// Parse the `publisher` block
pub fn parse_publisher(node: &kdl::KdlNode) -> Result<PublisherConfig, ConfigError> {
    trace!("Parsing publisher configuration block");

    let config = PublisherConfig {
        access_key: require_string(node, "publisher", "access-key")?,
        secret_key: require_string(node, "publisher", "secret-key")?,
        endpoint: get_string_entry(node, "endpoint")
            .map(|e| e.trim_end_matches('/').to_string())
            .unwrap_or_else(default_publisher_endpoint),
    };

    trace!(endpoint = %config.endpoint, "Parsed publisher configuration");
    Ok(config)
}

/// Parse the `notifier` block
pub fn parse_notifier(node: &kdl::KdlNode) -> Result<NotifierConfig, ConfigError> {
    trace!("Parsing notifier configuration block");

    let config = NotifierConfig {
        smtp_host: require_string(node, "notifier", "smtp-host")?,
        smtp_port: parse_number(node, "notifier", "smtp-port")?.unwrap_or_else(default_smtp_port),
        username: require_string(node, "notifier", "username")?,
        password: require_string(node, "notifier", "password")?,
        sender: require_string(node, "notifier", "sender")?,
        recipients: get_string_list_entry(node, "recipients"),
    };

    trace!(
        smtp_host = %config.smtp_host,
        smtp_port = config.smtp_port,
        recipient_count = config.recipients.len(),
        "Parsed notifier configuration"
    );

    Ok(config)
}

/// Parse the `renewal` block
pub fn parse_renewal(node: &kdl::KdlNode) -> Result<RenewalConfig, ConfigError> {
    trace!("Parsing renewal configuration block");
    let defaults = RenewalConfig::default();

    let config = RenewalConfig {
        lookahead_days: parse_number(node, "renewal", "lookahead-days")?
            .unwrap_or(defaults.lookahead_days),
        min_interval_secs: parse_number(node, "renewal", "min-interval-secs")?
            .unwrap_or(defaults.min_interval_secs),
        call_timeout_secs: parse_number(node, "renewal", "call-timeout-secs")?
            .unwrap_or(defaults.call_timeout_secs),
        max_issuances: parse_number(node, "renewal", "max-issuances")?,
        workers: parse_number(node, "renewal", "workers")?.unwrap_or(defaults.workers),
        exclude: get_string_list_entry(node, "exclude"),
    };

    trace!(
        lookahead_days = config.lookahead_days,
        min_interval_secs = config.min_interval_secs,
        workers = config.workers,
        excluded = config.exclude.len(),
        "Parsed renewal configuration"
    );

    Ok(config)
}
