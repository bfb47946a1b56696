//! Capability ports.
//!
//! The pipeline talks to the outside world only through these traits.
//! Implementations own their transport concerns (auth, pagination,
//! network retries); the pipeline only sees success or a
//! [`CapabilityError`].

use async_trait::async_trait;

use autossl_common::{CapabilityError, CertificateRecord, Domain};

/// Source of the CDN domain and certificate inventory.
#[async_trait]
pub trait DomainInventory: Send + Sync {
    /// Every domain hosted on the CDN.
    async fn list_domains(&self) -> Result<Vec<Domain>, CapabilityError>;

    /// Every certificate currently stored on the CDN.
    async fn list_certificates(&self) -> Result<Vec<CertificateRecord>, CapabilityError>;
}

/// Freshly issued key material.
#[derive(Clone, PartialEq, Eq)]
pub struct IssuedCertificate {
    pub key_pem: String,
    pub cert_pem: String,
}

impl std::fmt::Debug for IssuedCertificate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuedCertificate")
            .field("key_pem", &"<redacted>")
            .field("cert_pem_len", &self.cert_pem.len())
            .finish()
    }
}

/// Obtains new certificates (ACME or otherwise).
#[async_trait]
pub trait CertificateIssuer: Send + Sync {
    async fn obtain(&self, domain: &str) -> Result<IssuedCertificate, CapabilityError>;
}

/// Manages certificates on the CDN.
#[async_trait]
pub trait CertificatePublisher: Send + Sync {
    /// Upload a certificate and return its CDN-assigned ID.
    async fn upload(
        &self,
        key_pem: &str,
        cert_pem: &str,
        domain: &str,
    ) -> Result<String, CapabilityError>;

    /// Serve `domain` with certificate `cert_id` and redirect HTTP to HTTPS.
    async fn force_https(&self, domain: &str, cert_id: &str) -> Result<(), CapabilityError>;

    /// Delete a certificate from the CDN.
    async fn remove(&self, cert_id: &str) -> Result<(), CapabilityError>;
}

/// A file attached to a notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub body: Vec<u8>,
}

/// An operator alert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub recipients: Vec<String>,
    pub subject: String,
    pub text_body: String,
    pub html_body: String,
    pub attachments: Vec<Attachment>,
}

/// Delivers operator alerts.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<(), CapabilityError>;
}
