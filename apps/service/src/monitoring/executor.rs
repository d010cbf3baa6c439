use anyhow::Result;
use chrono::Utc;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

use super::certificate::{CertificateInfo, CertificateInspector, TlsCertificateInspector};
use super::classifier::{classify, is_accepted_status};
use super::probe::{HttpProbe, PingProbe, Probe, TcpProbe};
use super::target::{ResolvedTarget, resolve};
use super::types::{CheckResult, ProbeOutcome, Protocol, Status};
use crate::config::CheckConfig;
use crate::database::models::Monitor;

/// Append-only destination for check results
#[async_trait::async_trait]
pub trait LogSink: Send + Sync {
    /// Persist one result as a single write
    async fn append(&self, result: &CheckResult) -> Result<()>;
}

/// Check orchestrator: resolve, probe, classify, record
pub struct MonitorChecker {
    config: CheckConfig,
    ping_probe: Arc<dyn Probe>,
    tcp_probe: Arc<dyn Probe>,
    http_probe: Arc<dyn Probe>,
    certificates: Arc<dyn CertificateInspector>,
    sink: Arc<dyn LogSink>,
}

impl MonitorChecker {
    /// Create a checker with the production probes
    pub fn new(config: CheckConfig, sink: Arc<dyn LogSink>) -> Result<Self> {
        let ping_probe =
            PingProbe::new(config.ping_timeout, config.ping_count, config.ping_interval);
        let tcp_probe = TcpProbe::new(config.tcp_timeout);
        let http_probe = HttpProbe::new(config.http_timeout)?;
        let certificates = TlsCertificateInspector::new(config.certificate_timeout);

        Ok(Self {
            config,
            ping_probe: Arc::new(ping_probe),
            tcp_probe: Arc::new(tcp_probe),
            http_probe: Arc::new(http_probe),
            certificates: Arc::new(certificates),
            sink,
        })
    }

    pub fn with_ping_probe(mut self, probe: Arc<dyn Probe>) -> Self {
        self.ping_probe = probe;
        self
    }

    pub fn with_tcp_probe(mut self, probe: Arc<dyn Probe>) -> Self {
        self.tcp_probe = probe;
        self
    }

    pub fn with_http_probe(mut self, probe: Arc<dyn Probe>) -> Self {
        self.http_probe = probe;
        self
    }

    pub fn with_certificate_inspector(mut self, inspector: Arc<dyn CertificateInspector>) -> Self {
        self.certificates = inspector;
        self
    }

    pub fn config(&self) -> &CheckConfig {
        &self.config
    }

    /// Hard wall-time limit for a single [`check`](Self::check)
    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.config.check_deadline_seconds())
    }

    /// Check one monitor.
    ///
    /// Inactive monitors are `skipped` without probing or logging. Every other
    /// outcome, including resolution failures and errors raised while probing,
    /// is written to the log sink exactly once.
    pub async fn check(&self, monitor: &Monitor) -> CheckResult {
        let monitor_id = monitor.log_id();

        if !monitor.is_active {
            debug!(monitor_id, "monitor inactive, skipping");
            return CheckResult::skipped(monitor_id);
        }

        let result = match resolve(monitor) {
            Ok(target) => {
                let evaluated =
                    AssertUnwindSafe(self.evaluate(monitor_id, &target)).catch_unwind().await;
                let result = match evaluated {
                    Ok(Ok(result)) => result,
                    Ok(Err(e)) => {
                        error!(monitor_id, target = %target, "check failed: {:#}", e);
                        CheckResult::failure(monitor_id, format!("{e:#}"))
                    }
                    Err(panic) => {
                        let reason = panic_message(panic.as_ref());
                        error!(monitor_id, target = %target, "check panicked: {}", reason);
                        CheckResult::failure(monitor_id, format!("Check panicked: {reason}"))
                    }
                };
                result
                    .with_metadata("protocol", target.protocol().as_str())
                    .with_metadata("target", target.to_string())
            }
            Err(e) => {
                debug!(monitor_id, url = %monitor.url, "resolution failed: {}", e);
                CheckResult::failure(monitor_id, e.to_string())
                    .with_metadata("protocol", e.protocol().as_str())
            }
        };

        self.record(&result).await;
        result
    }

    /// Record a `down` result for a monitor whose check never completed, e.g.
    /// one that overran its deadline.
    pub async fn fail(&self, monitor: &Monitor, reason: impl Into<String>) -> CheckResult {
        let result = CheckResult::failure(monitor.log_id(), reason);
        self.record(&result).await;
        result
    }

    async fn record(&self, result: &CheckResult) {
        if let Err(e) = self.sink.append(result).await {
            error!(monitor_id = result.monitor_id, "failed to write check log: {:#}", e);
        }
    }

    fn probe_for(&self, protocol: Protocol) -> &dyn Probe {
        match protocol {
            Protocol::Ping => self.ping_probe.as_ref(),
            Protocol::Tcp => self.tcp_probe.as_ref(),
            Protocol::Http | Protocol::Https => self.http_probe.as_ref(),
        }
    }

    async fn evaluate(&self, monitor_id: i64, target: &ResolvedTarget) -> Result<CheckResult> {
        let protocol = target.protocol();
        let outcome = self.probe_for(protocol).execute(target).await?;

        let certificate = match target {
            ResolvedTarget::Https { url }
                if outcome.success && outcome.status_code.is_none_or(is_accepted_status) =>
            {
                let certificate = self.certificates.inspect(url).await;
                if certificate.is_none() {
                    warn!(monitor_id, url = %url, "no certificate information, skipping expiry check");
                }
                certificate
            }
            _ => None,
        };

        let status = classify(
            protocol,
            &outcome,
            certificate.as_ref(),
            Utc::now(),
            self.config.ssl_warning_days,
        );
        debug!(monitor_id, target = %target, "classified as {}", status);

        Ok(build_result(monitor_id, target, status, outcome, certificate.as_ref()))
    }
}

fn build_result(
    monitor_id: i64,
    target: &ResolvedTarget,
    status: Status,
    outcome: ProbeOutcome,
    certificate: Option<&CertificateInfo>,
) -> CheckResult {
    let (message, error) = match (target, &outcome) {
        (_, ProbeOutcome { success: false, error, .. }) => {
            let error = error.clone().unwrap_or_else(|| "Check failed".to_string());
            (error.clone(), Some(error))
        }
        (ResolvedTarget::Ping { .. }, _) => ("Ping successful".to_string(), None),
        (ResolvedTarget::Tcp { port, .. }, _) => (format!("Port {port} is open"), None),
        (_, ProbeOutcome { status_code: Some(code), .. }) if !is_accepted_status(*code) => {
            (format!("HTTP check failed (Status: {code})"), Some(format!("HTTP {code}")))
        }
        _ => match (status, certificate) {
            (Status::SslIssue, Some(cert)) => {
                let text = format!("SSL certificate expired on {}", cert.not_after.format("%Y-%m-%d"));
                (text.clone(), Some(text))
            }
            (Status::SslExpiring, Some(cert)) => (
                format!("SSL certificate expires on {}", cert.not_after.format("%Y-%m-%d")),
                None,
            ),
            _ => ("HTTP check successful".to_string(), None),
        },
    };

    let mut result = CheckResult::new(monitor_id, status, message)
        .with_latency(outcome.latency_ms)
        .with_error(error);

    if let Some(code) = outcome.status_code {
        result = result.with_metadata("status_code", code);
    }
    if let Some(cert) = certificate {
        result = result.with_metadata("certificate_expires_at", cert.not_after.to_rfc3339());
    }
    result
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(text) = panic.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = panic.downcast_ref::<String>() {
        text.clone()
    } else {
        "unknown panic".to_string()
    }
}
