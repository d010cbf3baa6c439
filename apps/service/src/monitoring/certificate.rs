//! Peer certificate inspection for HTTPS monitors.
//!
//! The inspection runs on its own connection with verification disabled, so
//! expired or self-signed certificates can still be read. Any failure along
//! the way yields no certificate rather than an error.

use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::{debug, warn};
use x509_parser::prelude::{FromDer, X509Certificate};

use super::probe::error_chain;

/// What the check engine needs to know about a leaf certificate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateInfo {
    pub subject: String,
    pub issuer: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
}

impl CertificateInfo {
    /// Parse a DER encoded X.509 certificate
    pub fn from_der(der: &[u8]) -> Option<Self> {
        let (_, certificate) = X509Certificate::from_der(der).ok()?;
        let validity = certificate.validity();

        Some(Self {
            subject: certificate.subject().to_string(),
            issuer: certificate.issuer().to_string(),
            not_before: DateTime::from_timestamp(validity.not_before.timestamp(), 0)?,
            not_after: DateTime::from_timestamp(validity.not_after.timestamp(), 0)?,
        })
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.not_after <= now
    }

    /// Whether the certificate expires within `days` of `now`
    pub fn expires_within(&self, now: DateTime<Utc>, days: i64) -> bool {
        self.not_after - now < chrono::Duration::days(days)
    }
}

/// Source of certificate metadata for a URL
#[async_trait::async_trait]
pub trait CertificateInspector: Send + Sync {
    /// Leaf certificate presented by the URL's host, `None` when unavailable
    async fn inspect(&self, url: &str) -> Option<CertificateInfo>;
}

/// Reads the peer certificate through a dedicated, non-verifying TLS request
pub struct TlsCertificateInspector {
    client: Option<reqwest::Client>,
}

impl TlsCertificateInspector {
    pub fn new(timeout_seconds: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .danger_accept_invalid_certs(true)
            .danger_accept_invalid_hostnames(true)
            .tls_info(true)
            .redirect(reqwest::redirect::Policy::none())
            .build();

        match client {
            Ok(client) => Self { client: Some(client) },
            Err(e) => {
                warn!("Certificate inspection disabled, TLS client unavailable: {}", e);
                Self { client: None }
            }
        }
    }
}

#[async_trait::async_trait]
impl CertificateInspector for TlsCertificateInspector {
    async fn inspect(&self, url: &str) -> Option<CertificateInfo> {
        let client = self.client.as_ref()?;
        let parsed = url::Url::parse(url).ok()?;
        let host = parsed.host_str()?;
        let port = parsed.port_or_known_default().unwrap_or(443);
        let origin = format!("https://{}:{}/", host, port);

        let response = match client.head(&origin).send().await {
            Ok(response) => response,
            Err(e) => {
                debug!("certificate lookup for {} failed: {}", origin, error_chain(&e));
                return None;
            }
        };

        let der = response.extensions().get::<reqwest::tls::TlsInfo>()?.peer_certificate()?;
        let info = CertificateInfo::from_der(der);
        if info.is_none() {
            debug!("certificate from {} could not be parsed", origin);
        }
        info
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn info_expiring_in(days: i64) -> CertificateInfo {
        let now = Utc::now();
        CertificateInfo {
            subject: "CN=example.com".to_string(),
            issuer: "CN=Example CA".to_string(),
            not_before: now - ChronoDuration::days(90),
            not_after: now + ChronoDuration::days(days),
        }
    }

    #[test]
    fn test_expiry_window() {
        let now = Utc::now();
        assert!(info_expiring_in(3).expires_within(now, 7));
        assert!(!info_expiring_in(10).expires_within(now, 7));
        assert!(info_expiring_in(-1).is_expired_at(now));
        assert!(!info_expiring_in(1).is_expired_at(now));
    }

    #[test]
    fn test_garbage_der() {
        assert!(CertificateInfo::from_der(b"not a certificate").is_none());
    }

    #[tokio::test]
    async fn test_unreachable_host_yields_nothing() {
        let port = {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };

        let inspector = TlsCertificateInspector::new(2);
        assert!(inspector.inspect(&format!("https://127.0.0.1:{port}/")).await.is_none());
        assert!(inspector.inspect("not a url").await.is_none());
    }
}
