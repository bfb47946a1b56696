//! Capability implementations for production use.
//!
//! - [`qiniu`]: Qiniu CDN inventory and certificate publishing
//! - [`command`]: certificate issuance through an external ACME client
//! - [`smtp`]: alert delivery by email

pub mod command;
pub mod qiniu;
pub mod smtp;

use std::sync::Arc;

use autossl_common::CapabilityError;
use autossl_config::{IssuerConfig, NotifierConfig, PublisherConfig};

use crate::capabilities::{CapabilityFactory, CdnCapabilities};
use crate::ports::{CertificateIssuer, Notifier};

pub use command::CommandIssuer;
pub use qiniu::QiniuClient;
pub use smtp::SmtpNotifier;

/// Builds the production adapters from configuration sections.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultCapabilityFactory;

impl CapabilityFactory for DefaultCapabilityFactory {
    fn issuer(&self, config: &IssuerConfig) -> Result<Arc<dyn CertificateIssuer>, CapabilityError> {
        Ok(Arc::new(CommandIssuer::new(config)?))
    }

    fn cdn(&self, config: &PublisherConfig) -> Result<CdnCapabilities, CapabilityError> {
        let client = Arc::new(QiniuClient::new(config)?);
        Ok(CdnCapabilities {
            inventory: client.clone(),
            publisher: client,
        })
    }

    fn notifier(&self, config: &NotifierConfig) -> Result<Arc<dyn Notifier>, CapabilityError> {
        Ok(Arc::new(SmtpNotifier::new(config)?))
    }
}
