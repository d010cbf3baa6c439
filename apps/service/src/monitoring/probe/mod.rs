//! Protocol probes: one connectivity test per call.
//!
//! Ordinary network failures are reported as an unsuccessful
//! [`ProbeOutcome`]; `Err` is reserved for failures of the probe itself
//! (resource exhaustion, being handed a target of the wrong protocol).

pub mod http;
pub mod ping;
pub mod tcp;

pub use http::HttpProbe;
pub use ping::PingProbe;
pub use tcp::TcpProbe;

use anyhow::Result;

use super::target::ResolvedTarget;
use super::types::ProbeOutcome;

/// Probe trait implemented by the ping, TCP and HTTP executors
#[async_trait::async_trait]
pub trait Probe: Send + Sync {
    /// Perform one check against `target` and report what happened
    async fn execute(&self, target: &ResolvedTarget) -> Result<ProbeOutcome>;
}

/// Render an error and all of its sources as `outer: inner: root`
pub(crate) fn error_chain(error: &(dyn std::error::Error + 'static)) -> String {
    let mut text = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        let cause_text = cause.to_string();
        if !text.contains(&cause_text) {
            text.push_str(": ");
            text.push_str(&cause_text);
        }
        source = cause.source();
    }
    text
}
