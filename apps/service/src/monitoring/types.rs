use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Outcome classification of a single check.
///
/// `SslIssue` was persisted as `ssl_expired` by older schema revisions; both
/// spellings parse to the same variant, only `ssl_issue` is ever written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Up,
    Down,
    #[serde(alias = "ssl_expired")]
    SslIssue,
    SslExpiring,
    Skipped,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Up => "up",
            Status::Down => "down",
            Status::SslIssue => "ssl_issue",
            Status::SslExpiring => "ssl_expiring",
            Status::Skipped => "skipped",
        }
    }

    /// Whether this status makes a batch run report failure.
    pub fn is_failure(&self) -> bool {
        matches!(self, Status::Down | Status::SslIssue)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown status value: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for Status {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "up" => Ok(Status::Up),
            "down" => Ok(Status::Down),
            "ssl_issue" | "ssl_expired" => Ok(Status::SslIssue),
            "ssl_expiring" => Ok(Status::SslExpiring),
            "skipped" => Ok(Status::Skipped),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// Protocol a monitor is checked with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Ping,
    Tcp,
    Http,
    Https,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Ping => "ping",
            Protocol::Tcp => "tcp",
            Protocol::Http => "http",
            Protocol::Https => "https",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ping" => Ok(Protocol::Ping),
            "tcp" => Ok(Protocol::Tcp),
            "http" => Ok(Protocol::Http),
            "https" => Ok(Protocol::Https),
            other => Err(format!("unsupported monitor type: {other}")),
        }
    }
}

/// Raw result of one probe execution, before classification.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProbeOutcome {
    /// Transport-level success (host answered / connected / got a response)
    pub success: bool,
    pub latency_ms: Option<f64>,
    /// Diagnostic text on failure
    pub error: Option<String>,
    /// HTTP status code, HTTP(S) only
    pub status_code: Option<u16>,
}

impl ProbeOutcome {
    pub fn reachable(latency_ms: Option<f64>) -> Self {
        Self { success: true, latency_ms, ..Self::default() }
    }

    pub fn unreachable(error: impl Into<String>) -> Self {
        Self { success: false, error: Some(error.into()), ..Self::default() }
    }

    pub fn with_status_code(mut self, status_code: u16) -> Self {
        self.status_code = Some(status_code);
        self
    }
}

/// Result of checking one monitor. Immutable once handed to the log sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResult {
    /// Database id of the monitor that was checked
    pub monitor_id: i64,

    pub status: Status,

    /// Round-trip or response time in milliseconds
    pub latency_ms: Option<f64>,

    /// Diagnostic text persisted with the log row
    pub error_message: Option<String>,

    /// Operator-facing summary, not persisted
    #[serde(skip)]
    pub message: String,

    /// Protocol, normalized target and protocol specific extras
    pub metadata: Map<String, Value>,

    pub checked_at: DateTime<Utc>,
}

impl CheckResult {
    pub fn new(monitor_id: i64, status: Status, message: impl Into<String>) -> Self {
        Self {
            monitor_id,
            status,
            latency_ms: None,
            error_message: None,
            message: message.into(),
            metadata: Map::new(),
            checked_at: Utc::now(),
        }
    }

    /// Result for an inactive monitor
    pub fn skipped(monitor_id: i64) -> Self {
        Self::new(monitor_id, Status::Skipped, "Monitor is inactive")
    }

    /// `down` result carrying `error` both as diagnostic and as message
    pub fn failure(monitor_id: i64, error: impl Into<String>) -> Self {
        let error = error.into();
        Self::new(monitor_id, Status::Down, error.clone()).with_error(Some(error))
    }

    pub fn with_latency(mut self, latency_ms: Option<f64>) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    pub fn with_error(mut self, error: Option<String>) -> Self {
        self.error_message = error;
        self
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    pub fn is_failure(&self) -> bool {
        self.status.is_failure()
    }
}

/// Round a millisecond measurement to two decimals
pub fn round_ms(ms: f64) -> f64 {
    (ms * 100.0).round() / 100.0
}
