//! Qiniu CDN client.
//!
//! Serves as both the domain inventory and the certificate publisher.
//! Requests are authenticated with QBox tokens: an HMAC-SHA1 over the
//! request path and query, keyed with the account secret key.

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use reqwest::{Method, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use tracing::{debug, trace};

use autossl_common::{CapabilityError, CertificateRecord, Domain};
use autossl_config::PublisherConfig;

use crate::ports::{CertificatePublisher, DomainInventory};

type HmacSha1 = Hmac<Sha1>;

/// Page size for domain listing
const DOMAIN_PAGE_SIZE: u32 = 1000;

/// Page size for certificate listing
const CERT_PAGE_SIZE: u32 = 100;

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Deserialize)]
struct DomainPage {
    #[serde(default)]
    marker: String,
    #[serde(default)]
    domains: Vec<DomainEntry>,
}

#[derive(Debug, Deserialize)]
struct DomainEntry {
    name: String,
}

#[derive(Debug, Deserialize)]
struct CertPage {
    #[serde(default)]
    marker: String,
    #[serde(default)]
    certs: Vec<CertEntry>,
}

#[derive(Debug, Deserialize)]
struct CertEntry {
    certid: String,
    name: String,
    not_after: i64,
}

#[derive(Debug, Serialize)]
struct UploadRequest<'a> {
    name: &'a str,
    common_name: &'a str,
    pri: &'a str,
    ca: &'a str,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    #[serde(rename = "certID")]
    cert_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HttpsConfRequest<'a> {
    cert_id: &'a str,
    force_https: bool,
    http2_enable: bool,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

// ============================================================================
// Client
// ============================================================================

/// Qiniu CDN API client.
pub struct QiniuClient {
    http: reqwest::Client,
    endpoint: String,
    access_key: String,
    secret_key: String,
}

impl QiniuClient {
    pub fn new(config: &PublisherConfig) -> Result<Self, CapabilityError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("autossl/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| CapabilityError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            access_key: config.access_key.clone(),
            secret_key: config.secret_key.clone(),
        })
    }

    /// QBox token for a request to `url` without a form body.
    fn sign(&self, url: &Url) -> Result<String, CapabilityError> {
        let mut signing = url.path().to_string();
        if let Some(query) = url.query() {
            signing.push('?');
            signing.push_str(query);
        }
        signing.push('\n');

        let mut mac = HmacSha1::new_from_slice(self.secret_key.as_bytes())
            .map_err(|e| CapabilityError::Other(format!("invalid secret key: {e}")))?;
        mac.update(signing.as_bytes());
        let digest = mac.finalize().into_bytes();

        Ok(format!("{}:{}", self.access_key, URL_SAFE.encode(digest)))
    }

    fn url(&self, path: &str, query: &[(&str, &str)]) -> Result<Url, CapabilityError> {
        let mut url = Url::parse(&format!("{}{}", self.endpoint, path))
            .map_err(|e| CapabilityError::Other(format!("invalid endpoint: {e}")))?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    /// Send a request and return the raw body of a successful response.
    async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        url: Url,
        body: Option<&B>,
    ) -> Result<Vec<u8>, CapabilityError> {
        let token = self.sign(&url)?;
        trace!(method = %method, path = %url.path(), "Qiniu request");

        let mut request = self
            .http
            .request(method, url)
            .header(reqwest::header::AUTHORIZATION, format!("QBox {token}"));
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| CapabilityError::Transport(e.to_string()))?;
        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| CapabilityError::Transport(e.to_string()))?;

        if !status.is_success() {
            let message = serde_json::from_slice::<ErrorBody>(&bytes)
                .ok()
                .and_then(|b| b.error)
                .unwrap_or_else(|| String::from_utf8_lossy(&bytes).trim().to_string());
            return Err(CapabilityError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        Ok(bytes.to_vec())
    }

    async fn get<T: DeserializeOwned>(&self, url: Url) -> Result<T, CapabilityError> {
        let body = self.send::<()>(Method::GET, url, None).await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

#[async_trait]
impl DomainInventory for QiniuClient {
    async fn list_domains(&self) -> Result<Vec<Domain>, CapabilityError> {
        let limit = DOMAIN_PAGE_SIZE.to_string();
        let mut marker = String::new();
        let mut domains = Vec::new();

        loop {
            let url = self.url("/domain", &[("limit", limit.as_str()), ("marker", marker.as_str())])?;
            let page: DomainPage = self.get(url).await?;
            domains.extend(page.domains.into_iter().map(|d| Domain::new(d.name)));

            if page.marker.is_empty() {
                break;
            }
            marker = page.marker;
        }

        debug!(count = domains.len(), "Listed Qiniu domains");
        Ok(domains)
    }

    async fn list_certificates(&self) -> Result<Vec<CertificateRecord>, CapabilityError> {
        let limit = CERT_PAGE_SIZE.to_string();
        let mut marker = String::new();
        let mut certificates = Vec::new();

        loop {
            let url = self.url("/sslcert", &[("limit", limit.as_str()), ("marker", marker.as_str())])?;
            let page: CertPage = self.get(url).await?;
            certificates.extend(
                page.certs
                    .into_iter()
                    .map(|c| CertificateRecord::new(c.name, c.certid, c.not_after)),
            );

            if page.marker.is_empty() {
                break;
            }
            marker = page.marker;
        }

        debug!(count = certificates.len(), "Listed Qiniu certificates");
        Ok(certificates)
    }
}

#[async_trait]
impl CertificatePublisher for QiniuClient {
    async fn upload(
        &self,
        key_pem: &str,
        cert_pem: &str,
        domain: &str,
    ) -> Result<String, CapabilityError> {
        let request = UploadRequest {
            name: domain,
            common_name: domain,
            pri: key_pem,
            ca: cert_pem,
        };
        let body = self
            .send(Method::POST, self.url("/sslcert", &[])?, Some(&request))
            .await?;
        let response: UploadResponse = serde_json::from_slice(&body)?;
        Ok(response.cert_id)
    }

    async fn force_https(&self, domain: &str, cert_id: &str) -> Result<(), CapabilityError> {
        let request = HttpsConfRequest {
            cert_id,
            force_https: true,
            http2_enable: true,
        };
        let path = format!("/domain/{domain}/httpsconf");
        self.send(Method::PUT, self.url(&path, &[])?, Some(&request))
            .await?;
        Ok(())
    }

    async fn remove(&self, cert_id: &str) -> Result<(), CapabilityError> {
        let path = format!("/sslcert/{cert_id}");
        self.send::<()>(Method::DELETE, self.url(&path, &[])?, None)
            .await?;
        Ok(())
    }
}

impl std::fmt::Debug for QiniuClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QiniuClient")
            .field("endpoint", &self.endpoint)
            .field("access_key", &self.access_key)
            .finish()
    }
}
