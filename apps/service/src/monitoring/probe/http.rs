use anyhow::{Result, bail};
use std::time::{Duration, Instant};
use tracing::debug;

use super::{Probe, error_chain};
use crate::monitoring::target::ResolvedTarget;
use crate::monitoring::types::{ProbeOutcome, round_ms};

/// HTTP/HTTPS probe
///
/// Issues a GET with certificate verification on and redirects followed.
/// Any response counts as transport success; the status code is reported so
/// the classifier can decide between `up` and `down`.
pub struct HttpProbe {
    client: reqwest::Client,
    timeout_duration: Duration,
}

impl HttpProbe {
    pub fn new(timeout_seconds: u64) -> Result<Self> {
        let timeout_duration = Duration::from_secs(timeout_seconds);
        let client = reqwest::Client::builder()
            .timeout(timeout_duration)
            .redirect(reqwest::redirect::Policy::limited(10))
            .user_agent(concat!("vigil/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client, timeout_duration })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout_duration
    }
}

#[async_trait::async_trait]
impl Probe for HttpProbe {
    async fn execute(&self, target: &ResolvedTarget) -> Result<ProbeOutcome> {
        let Some(url) = target.url() else {
            bail!("http probe cannot check {} target {}", target.protocol(), target);
        };

        let start = Instant::now();

        match self.client.get(url).send().await {
            Ok(response) => {
                let latency = round_ms(start.elapsed().as_secs_f64() * 1000.0);
                let status_code = response.status().as_u16();
                debug!("GET {} -> {} in {}ms", url, status_code, latency);

                Ok(ProbeOutcome::reachable(Some(latency)).with_status_code(status_code))
            }
            Err(e) => {
                let error = error_chain(&e);
                debug!("GET {} failed: {}", url, error);
                Ok(ProbeOutcome::unreachable(error))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_success_response() {
        let mut server = mockito::Server::new_async().await;
        let mock = server.mock("GET", "/health").with_status(200).create_async().await;

        let probe = HttpProbe::new(10).unwrap();
        let target = ResolvedTarget::Http { url: format!("{}/health", server.url()) };
        let outcome = probe.execute(&target).await.unwrap();

        mock.assert_async().await;
        assert!(outcome.success);
        assert_eq!(outcome.status_code, Some(200));
        assert!(outcome.latency_ms.is_some());
        assert!(outcome.error.is_none());
    }

    #[tokio::test]
    async fn test_error_status_is_not_a_transport_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server.mock("GET", "/").with_status(503).create_async().await;

        let probe = HttpProbe::new(10).unwrap();
        let target = ResolvedTarget::Https { url: server.url() };
        let outcome = probe.execute(&target).await.unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.status_code, Some(503));
    }

    #[tokio::test]
    async fn test_redirects_are_followed() {
        let mut server = mockito::Server::new_async().await;
        let _moved = server
            .mock("GET", "/old")
            .with_status(301)
            .with_header("location", "/new")
            .create_async()
            .await;
        let _new = server.mock("GET", "/new").with_status(204).create_async().await;

        let probe = HttpProbe::new(10).unwrap();
        let target = ResolvedTarget::Http { url: format!("{}/old", server.url()) };
        let outcome = probe.execute(&target).await.unwrap();

        assert_eq!(outcome.status_code, Some(204));
    }

    #[tokio::test]
    async fn test_invalid_url_is_unreachable() {
        let probe = HttpProbe::new(10).unwrap();
        let target = ResolvedTarget::Https { url: "example.com".to_string() };
        let outcome = probe.execute(&target).await.unwrap();

        assert!(!outcome.success);
        assert!(outcome.latency_ms.is_none());
        assert!(outcome.error.is_some());
    }
}
