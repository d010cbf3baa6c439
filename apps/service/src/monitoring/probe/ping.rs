//! ICMP reachability through the system `ping` tool.
//!
//! Raw ICMP sockets need elevated privileges, the `ping` binary does not.

use anyhow::{Context, Result, bail};
use std::io::ErrorKind;
use std::net::IpAddr;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

use super::Probe;
use crate::monitoring::target::ResolvedTarget;
use crate::monitoring::types::ProbeOutcome;

/// Extra time granted to the ping process beyond its network timeout
const PROCESS_GRACE: Duration = Duration::from_secs(2);

/// Command-line dialect of the local ping tool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PingFlavor {
    /// `ping -n <count> -w <timeout ms>`
    Windows,
    /// `ping -c <count> -W <timeout s> -i <interval s>`
    Posix,
}

impl PingFlavor {
    /// Dialect of the platform we were built for
    pub fn host() -> Self {
        if cfg!(windows) { PingFlavor::Windows } else { PingFlavor::Posix }
    }
}

/// Ping probe
#[derive(Debug, Clone)]
pub struct PingProbe {
    program: String,
    flavor: PingFlavor,
    timeout_seconds: u64,
    count: u32,
    interval_seconds: f64,
}

impl PingProbe {
    pub fn new(timeout_seconds: u64, count: u32, interval_seconds: f64) -> Self {
        Self {
            program: "ping".to_string(),
            flavor: PingFlavor::host(),
            timeout_seconds,
            count: count.max(1),
            interval_seconds,
        }
    }

    /// Use a different executable, keeping the argument dialect
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn with_flavor(mut self, flavor: PingFlavor) -> Self {
        self.flavor = flavor;
        self
    }

    /// Arguments passed to the ping tool for `ip`
    pub fn args(&self, ip: IpAddr) -> Vec<String> {
        match self.flavor {
            PingFlavor::Windows => vec![
                "-n".to_string(),
                self.count.to_string(),
                "-w".to_string(),
                (self.timeout_seconds * 1000).to_string(),
                ip.to_string(),
            ],
            PingFlavor::Posix => vec![
                "-c".to_string(),
                self.count.to_string(),
                "-W".to_string(),
                self.timeout_seconds.to_string(),
                "-i".to_string(),
                self.interval_seconds.to_string(),
                ip.to_string(),
            ],
        }
    }

    /// Wall-clock limit for the whole ping process
    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds) + PROCESS_GRACE
    }
}

#[async_trait::async_trait]
impl Probe for PingProbe {
    async fn execute(&self, target: &ResolvedTarget) -> Result<ProbeOutcome> {
        let ResolvedTarget::Ping { ip } = target else {
            bail!("ping probe cannot check {} target {}", target.protocol(), target);
        };

        let mut command = Command::new(&self.program);
        command
            .args(self.args(*ip))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = match command.spawn() {
            Ok(child) => child,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Ok(ProbeOutcome::unreachable(format!(
                    "{} command not found",
                    self.program
                )));
            }
            Err(e) => return Err(e).with_context(|| format!("failed to spawn {}", self.program)),
        };

        let deadline = self.deadline();
        let output = match timeout(deadline, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Ok(ProbeOutcome::unreachable(format!("Ping failed: {e}"))),
            Err(_) => {
                debug!("ping {} exceeded {:?}", ip, deadline);
                return Ok(ProbeOutcome::unreachable(format!(
                    "Ping timed out after {}s",
                    deadline.as_secs()
                )));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stderr = stderr.trim();
            let error = if stderr.is_empty() { "Ping failed" } else { stderr };
            return Ok(ProbeOutcome::unreachable(error));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let latency_ms = parse_round_trip(&stdout, self.flavor);
        debug!("ping {} answered, rtt {:?}ms", ip, latency_ms);

        Ok(ProbeOutcome::reachable(latency_ms))
    }
}

/// Round-trip time from ping output.
///
/// Looks for a per-reply `time=<N> ms` token first (`time<N ms` on Windows),
/// then for the POSIX `min/avg/max/mdev = a/b/c/d ms` summary, taking `avg`.
pub fn parse_round_trip(output: &str, flavor: PingFlavor) -> Option<f64> {
    let lower = output.to_ascii_lowercase();

    if let Some(ms) = reply_time(&lower, flavor) {
        return Some(ms);
    }

    match flavor {
        PingFlavor::Posix => summary_average(&lower),
        PingFlavor::Windows => None,
    }
}

fn reply_time(output: &str, flavor: PingFlavor) -> Option<f64> {
    for (index, _) in output.match_indices("time") {
        let rest = &output[index + "time".len()..];
        let rest = match flavor {
            PingFlavor::Posix => rest.strip_prefix('='),
            PingFlavor::Windows => rest.strip_prefix('=').or_else(|| rest.strip_prefix('<')),
        };
        let Some(rest) = rest else { continue };

        if let Some((value, tail)) = leading_number(rest) {
            if tail.trim_start().starts_with("ms") {
                return Some(value);
            }
        }
    }
    None
}

fn summary_average(output: &str) -> Option<f64> {
    let start = output.find("min/avg/max/")?;
    let rest = &output[start + "min/avg/max/".len()..];
    let rest = rest.strip_prefix("mdev").or_else(|| rest.strip_prefix("stddev"))?;
    let rest = rest.trim_start().strip_prefix('=')?.trim_start();

    let values = rest.split_whitespace().next()?;
    let fields: Vec<&str> = values.split('/').collect();
    if fields.len() != 4 {
        return None;
    }
    fields[1].parse().ok()
}

/// Parse a leading `123` or `123.45`, returning it and the remaining text
fn leading_number(text: &str) -> Option<(f64, &str)> {
    let end = text.find(|c: char| !(c.is_ascii_digit() || c == '.')).unwrap_or(text.len());
    if end == 0 {
        return None;
    }
    let value = text[..end].parse().ok()?;
    Some((value, &text[end..]))
}
