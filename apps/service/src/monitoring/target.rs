//! Turning a monitor's configured address into a protocol and a normalized
//! target.
//!
//! Addresses are free-form: `https://example.com/health`, `203.0.113.5`,
//! `db.internal:5432`, `[2001:db8::1]:443`. An explicit monitor type wins;
//! otherwise the protocol is inferred from the shape of the address.

use std::fmt;
use std::net::IpAddr;

use thiserror::Error;

use super::types::Protocol;
use crate::database::models::Monitor;

/// Protocol plus normalized address, produced and consumed within one check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedTarget {
    Ping { ip: IpAddr },
    Tcp { host: String, port: u16 },
    Http { url: String },
    Https { url: String },
}

impl ResolvedTarget {
    pub fn protocol(&self) -> Protocol {
        match self {
            ResolvedTarget::Ping { .. } => Protocol::Ping,
            ResolvedTarget::Tcp { .. } => Protocol::Tcp,
            ResolvedTarget::Http { .. } => Protocol::Http,
            ResolvedTarget::Https { .. } => Protocol::Https,
        }
    }

    /// URL for HTTP(S) targets
    pub fn url(&self) -> Option<&str> {
        match self {
            ResolvedTarget::Http { url } | ResolvedTarget::Https { url } => Some(url),
            _ => None,
        }
    }
}

impl fmt::Display for ResolvedTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolvedTarget::Ping { ip } => write!(f, "{ip}"),
            ResolvedTarget::Tcp { host, port } if host.contains(':') => {
                write!(f, "[{host}]:{port}")
            }
            ResolvedTarget::Tcp { host, port } => write!(f, "{host}:{port}"),
            ResolvedTarget::Http { url } | ResolvedTarget::Https { url } => f.write_str(url),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
    #[error("Invalid IP address")]
    InvalidIp { address: String },

    #[error("Invalid host:port format (e.g., 192.168.1.1:22 or example.com:3306). Got: {address}")]
    InvalidHostPort { address: String },
}

impl ResolutionError {
    /// Protocol the address was being resolved for
    pub fn protocol(&self) -> Protocol {
        match self {
            ResolutionError::InvalidIp { .. } => Protocol::Ping,
            ResolutionError::InvalidHostPort { .. } => Protocol::Tcp,
        }
    }
}

/// Resolve a monitor using its declared type, or by inference when unset
pub fn resolve(monitor: &Monitor) -> Result<ResolvedTarget, ResolutionError> {
    let protocol = declared_protocol(monitor).unwrap_or_else(|| infer_protocol(&monitor.url));
    resolve_as(protocol, &monitor.url)
}

/// Resolve `address` for a known protocol
pub fn resolve_as(protocol: Protocol, address: &str) -> Result<ResolvedTarget, ResolutionError> {
    match protocol {
        Protocol::Ping => extract_ip(address)
            .map(|ip| ResolvedTarget::Ping { ip })
            .ok_or_else(|| ResolutionError::InvalidIp { address: address.to_string() }),
        Protocol::Tcp => extract_host_port(address)
            .map(|(host, port)| ResolvedTarget::Tcp { host, port })
            .ok_or_else(|| ResolutionError::InvalidHostPort { address: address.to_string() }),
        Protocol::Http => Ok(ResolvedTarget::Http { url: address.to_string() }),
        Protocol::Https => Ok(ResolvedTarget::Https { url: address.to_string() }),
    }
}

fn declared_protocol(monitor: &Monitor) -> Option<Protocol> {
    let declared = monitor.monitor_type.as_deref().map(str::trim).filter(|t| !t.is_empty())?;

    match declared.parse() {
        Ok(protocol) => Some(protocol),
        Err(e) => {
            tracing::warn!(
                monitor_id = monitor.log_id(),
                "{}, inferring protocol from address",
                e
            );
            None
        }
    }
}

/// Infer a protocol from the address alone.
///
/// Priority: `host:port` with an in-range port, bare IP literal, `https://`,
/// `http://`, and finally `https` as the default.
pub fn infer_protocol(address: &str) -> Protocol {
    if extract_host_port(address).is_some() {
        Protocol::Tcp
    } else if address.parse::<IpAddr>().is_ok() {
        Protocol::Ping
    } else if address.starts_with("https://") {
        Protocol::Https
    } else if address.starts_with("http://") {
        Protocol::Http
    } else {
        Protocol::Https
    }
}

/// Drop `http://`, `https://` and any leading slashes
fn strip_scheme(address: &str) -> &str {
    let rest = address
        .strip_prefix("http://")
        .or_else(|| address.strip_prefix("https://"))
        .unwrap_or(address);
    rest.trim_start_matches('/')
}

/// Drop everything from the first `/`
fn strip_path(address: &str) -> &str {
    address.split_once('/').map_or(address, |(head, _)| head)
}

/// IP literal from an address, tolerating a scheme, a trailing port and a path.
///
/// The port is only stripped when it ends the address, before the path is
/// removed, so `10.0.0.1:8080/health` is not an IP.
pub fn extract_ip(address: &str) -> Option<IpAddr> {
    let address = strip_scheme(address.trim());

    if let Ok(ip) = address.parse() {
        return Some(ip);
    }

    let host = strip_path(strip_port(address));
    if let Some(bracketed) = host.strip_prefix('[') {
        return bracketed.strip_suffix(']')?.parse().ok();
    }
    host.parse().ok()
}

/// Drop a trailing `:<digits>`
fn strip_port(address: &str) -> &str {
    match address.rsplit_once(':') {
        Some((head, port)) if !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) => head,
        _ => address,
    }
}

/// `(host, port)` from an address of the form `host:port`, port in `[1, 65535]`.
///
/// IPv6 hosts must be bracketed (`[::1]:22`); a bare IPv6 literal is not a
/// host:port pair.
pub fn extract_host_port(address: &str) -> Option<(String, u16)> {
    let authority = strip_path(strip_scheme(address.trim()));
    let (host, port) = authority.rsplit_once(':')?;

    if port.is_empty() || !port.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let port: u32 = port.parse().ok()?;
    if !(1..=65535).contains(&port) {
        return None;
    }

    let host = match host.strip_prefix('[') {
        Some(bracketed) => bracketed.strip_suffix(']')?,
        None if host.contains(':') => return None,
        None => host,
    };
    if host.is_empty() {
        return None;
    }

    Some((host.to_string(), port as u16))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor(url: &str, monitor_type: Option<&str>) -> Monitor {
        Monitor::new(url, monitor_type)
    }

    #[test]
    fn test_inference_priority() {
        assert_eq!(infer_protocol("db.internal:5432"), Protocol::Tcp);
        assert_eq!(infer_protocol("192.168.1.1:22"), Protocol::Tcp);
        assert_eq!(infer_protocol("203.0.113.5"), Protocol::Ping);
        assert_eq!(infer_protocol("2001:db8::1"), Protocol::Ping);
        assert_eq!(infer_protocol("https://example.com"), Protocol::Https);
        assert_eq!(infer_protocol("http://example.com"), Protocol::Http);
        assert_eq!(infer_protocol("example.com"), Protocol::Https);
        // host:port wins over the scheme
        assert_eq!(infer_protocol("http://example.com:8080/status"), Protocol::Tcp);
        // out-of-range port falls through to the default
        assert_eq!(infer_protocol("example.com:70000"), Protocol::Https);
    }

    #[test]
    fn test_port_range() {
        assert!(extract_host_port("host:0").is_none());
        assert_eq!(extract_host_port("host:1"), Some(("host".to_string(), 1)));
        assert_eq!(extract_host_port("host:65535"), Some(("host".to_string(), 65535)));
        assert!(extract_host_port("host:65536").is_none());
        assert!(extract_host_port("host:99999999999999999999").is_none());
        assert!(extract_host_port("host:").is_none());
        assert!(extract_host_port(":80").is_none());
        assert!(extract_host_port("host").is_none());
    }

    #[test]
    fn test_host_port_normalization() {
        assert_eq!(
            extract_host_port("https://example.com:8443/health"),
            Some(("example.com".to_string(), 8443))
        );
        assert_eq!(extract_host_port("//10.0.0.2:3306"), Some(("10.0.0.2".to_string(), 3306)));
        assert_eq!(extract_host_port("[::1]:22"), Some(("::1".to_string(), 22)));
        assert!(extract_host_port("::1").is_none());
    }

    #[test]
    fn test_extract_ip() {
        assert_eq!(extract_ip("203.0.113.5"), "203.0.113.5".parse().ok());
        assert_eq!(extract_ip("203.0.113.5:8080"), "203.0.113.5".parse().ok());
        assert_eq!(extract_ip("http://203.0.113.5/status"), "203.0.113.5".parse().ok());
        // the port only counts when it ends the address
        assert_eq!(extract_ip("http://203.0.113.5:8080/path"), None);
        assert_eq!(extract_ip("//10.1.1.1"), "10.1.1.1".parse().ok());
        assert_eq!(extract_ip("::1"), "::1".parse().ok());
        assert_eq!(extract_ip("[2001:db8::1]:443"), "2001:db8::1".parse().ok());
        assert_eq!(extract_ip("example.com"), None);
        assert_eq!(extract_ip("https://example.com/status"), None);
        assert_eq!(extract_ip("300.1.1.1"), None);
    }

    #[test]
    fn test_declared_type_wins() {
        let target = resolve(&monitor("203.0.113.5:80", Some("ping"))).unwrap();
        assert_eq!(target, ResolvedTarget::Ping { ip: "203.0.113.5".parse().unwrap() });

        let target = resolve(&monitor("https://expired.example", Some("https"))).unwrap();
        assert_eq!(target, ResolvedTarget::Https { url: "https://expired.example".to_string() });

        let target = resolve(&monitor("example.com", Some("HTTP"))).unwrap();
        assert_eq!(target.protocol(), Protocol::Http);
    }

    #[test]
    fn test_unknown_declared_type_falls_back_to_inference() {
        let target = resolve(&monitor("db.internal:5432", Some("icmp"))).unwrap();
        assert_eq!(target, ResolvedTarget::Tcp { host: "db.internal".to_string(), port: 5432 });
    }

    #[test]
    fn test_resolution_failures() {
        let err = resolve(&monitor("not-an-ip.example", Some("ping"))).unwrap_err();
        assert_eq!(err.to_string(), "Invalid IP address");

        let err = resolve(&monitor("http://203.0.113.5:8080/path", Some("ping"))).unwrap_err();
        assert_eq!(err.to_string(), "Invalid IP address");

        let err = resolve(&monitor("example.com:70000", Some("tcp"))).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid host:port format (e.g., 192.168.1.1:22 or example.com:3306). Got: example.com:70000"
        );
    }

    #[test]
    fn test_http_url_used_verbatim() {
        let target = resolve_as(Protocol::Https, "https://example.com/a?b=c").unwrap();
        assert_eq!(target.url(), Some("https://example.com/a?b=c"));
        assert_eq!(target.to_string(), "https://example.com/a?b=c");
    }

    #[test]
    fn test_display_brackets_ipv6_tcp() {
        let target = ResolvedTarget::Tcp { host: "::1".to_string(), port: 22 };
        assert_eq!(target.to_string(), "[::1]:22");
    }
}
