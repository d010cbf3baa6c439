use anyhow::{Result, bail};
use std::io;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use super::Probe;
use crate::monitoring::target::ResolvedTarget;
use crate::monitoring::types::{ProbeOutcome, round_ms};

/// TCP port probe: connect, measure, close
#[derive(Debug, Clone)]
pub struct TcpProbe {
    timeout_duration: Duration,
}

impl TcpProbe {
    pub fn new(timeout_seconds: u64) -> Self {
        Self { timeout_duration: Duration::from_secs(timeout_seconds) }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout_duration
    }
}

#[async_trait::async_trait]
impl Probe for TcpProbe {
    async fn execute(&self, target: &ResolvedTarget) -> Result<ProbeOutcome> {
        let ResolvedTarget::Tcp { host, port } = target else {
            bail!("tcp probe cannot check {} target {}", target.protocol(), target);
        };

        let start = Instant::now();
        let connect = TcpStream::connect((host.as_str(), *port));

        let outcome = match timeout(self.timeout_duration, connect).await {
            Ok(Ok(stream)) => {
                let latency = round_ms(start.elapsed().as_secs_f64() * 1000.0);
                drop(stream);
                ProbeOutcome::reachable(Some(latency))
            }
            Ok(Err(e)) => ProbeOutcome::unreachable(describe_connect_error(&e)),
            Err(_) => ProbeOutcome::unreachable(format!(
                "Connection timed out after {}s",
                self.timeout_duration.as_secs()
            )),
        };

        debug!("tcp {} -> success={} {:?}", target, outcome.success, outcome.error);
        Ok(outcome)
    }
}

/// Socket error text, or a synthesized refusal message carrying the OS code
fn describe_connect_error(error: &io::Error) -> String {
    let text = error.to_string();
    if text.trim().is_empty() {
        format!("Connection refused (Error: {})", error.raw_os_error().unwrap_or(0))
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_open_port() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let probe = TcpProbe::new(3);
        let target = ResolvedTarget::Tcp { host: "127.0.0.1".to_string(), port };
        let outcome = probe.execute(&target).await.unwrap();

        assert!(outcome.success);
        let latency = outcome.latency_ms.expect("latency measured");
        assert!(latency >= 0.0);
        assert_eq!(latency, round_ms(latency));
    }

    #[tokio::test]
    async fn test_closed_port() {
        // Bind then release to get a port nothing listens on
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };

        let probe = TcpProbe::new(3);
        let target = ResolvedTarget::Tcp { host: "127.0.0.1".to_string(), port };
        let outcome = probe.execute(&target).await.unwrap();

        assert!(!outcome.success);
        assert!(outcome.latency_ms.is_none());
        assert!(outcome.error.is_some());
    }

    #[test]
    fn test_empty_error_text_is_synthesized() {
        let error = io::Error::new(io::ErrorKind::ConnectionRefused, "");
        assert_eq!(describe_connect_error(&error), "Connection refused (Error: 0)");

        let error = io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused");
        assert_eq!(describe_connect_error(&error), "connection refused");
    }
}
