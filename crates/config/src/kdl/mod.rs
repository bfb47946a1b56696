//! KDL configuration parsing.

mod helpers;
mod sections;

use kdl::KdlDocument;
use tracing::{debug, warn};

use crate::error::ConfigError;
use crate::Config;

pub use sections::{parse_issuer, parse_notifier, parse_publisher, parse_renewal};

/// Parse a full configuration document.
///
/// Unknown top-level nodes are ignored with a warning so that newer config
/// files still load on older binaries.
pub fn parse_document(text: &str) -> Result<Config, ConfigError> {
    let doc: KdlDocument = text.parse()?;
    let mut config = Config::default();

    for node in doc.nodes() {
        match node.name().value() {
            "issuer" => config.issuer = Some(parse_issuer(node)?),
            "publisher" => config.publisher = Some(parse_publisher(node)?),
            "notifier" => config.notifier = Some(parse_notifier(node)?),
            "renewal" => config.renewal = parse_renewal(node)?,
            _ => {
                warn!(
                    section = %node.name().value(),
                    "Ignoring unknown configuration section"
                );
            }
        }
    }

    debug!(
        has_issuer = config.issuer.is_some(),
        has_publisher = config.publisher.is_some(),
        has_notifier = config.notifier.is_some(),
        "Parsed configuration document"
    );

    Ok(config)
}
