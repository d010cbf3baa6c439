//! Mapping raw probe outcomes onto [`Status`].
//!
//! Everything here is a pure function of its inputs; the current time and the
//! warning window are passed in rather than read.

use chrono::{DateTime, Utc};

use super::certificate::CertificateInfo;
use super::types::{ProbeOutcome, Protocol, Status};

/// Ordered rules matched against lower-cased HTTPS transport errors.
///
/// A rule matches when every one of its needles occurs in the text. This is a
/// heuristic over client error wording, not a parsed TLS alert: error text
/// outside this vocabulary falls through to `down`.
pub const SSL_ERROR_RULES: &[(&[&str], Status)] = &[
    (&["certificate", "expired"], Status::SslIssue),
    (&["certificate", "revoked"], Status::SslIssue),
    (&["self signed"], Status::SslIssue),
    (&["self-signed"], Status::SslIssue),
    (&["untrusted"], Status::SslIssue),
    (&["unable to verify"], Status::SslIssue),
];

/// Accepted HTTP status range, `[200, 400)`
pub fn is_accepted_status(code: u16) -> bool {
    (200..400).contains(&code)
}

/// Classify a probe outcome.
///
/// `certificate` only matters for HTTPS; a missing certificate is "no signal"
/// and leaves an otherwise healthy check `up`.
pub fn classify(
    protocol: Protocol,
    outcome: &ProbeOutcome,
    certificate: Option<&CertificateInfo>,
    now: DateTime<Utc>,
    ssl_warning_days: i64,
) -> Status {
    match protocol {
        Protocol::Ping | Protocol::Tcp => {
            if outcome.success {
                Status::Up
            } else {
                Status::Down
            }
        }
        Protocol::Http => {
            if outcome.success && outcome.status_code.is_none_or(is_accepted_status) {
                Status::Up
            } else {
                Status::Down
            }
        }
        Protocol::Https => {
            if !outcome.success {
                return classify_transport_error(outcome.error.as_deref().unwrap_or_default());
            }
            if !outcome.status_code.is_none_or(is_accepted_status) {
                return Status::Down;
            }
            match certificate {
                Some(cert) => certificate_status(cert, now, ssl_warning_days),
                None => Status::Up,
            }
        }
    }
}

/// Certificate policy for an otherwise healthy HTTPS check
pub fn certificate_status(cert: &CertificateInfo, now: DateTime<Utc>, warning_days: i64) -> Status {
    if cert.is_expired_at(now) {
        Status::SslIssue
    } else if cert.expires_within(now, warning_days) {
        Status::SslExpiring
    } else {
        Status::Up
    }
}

/// Status for a failed HTTPS request, from its error text
pub fn classify_transport_error(error: &str) -> Status {
    let text = error.to_lowercase();

    SSL_ERROR_RULES
        .iter()
        .find(|(needles, _)| needles.iter().all(|needle| text.contains(needle)))
        .map_or(Status::Down, |(_, status)| *status)
}
