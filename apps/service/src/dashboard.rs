//! Read model over the check log for the dashboard API.
//!
//! The "current status" of a monitor is its most recent log row. Queries load
//! rows through [`Database`]; the aggregation itself is done by the pure
//! functions below.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::database::{Database, Monitor, MonitorLog};
use crate::monitoring::types::Status;

pub const DEFAULT_DEVICES_DOWN_LIMIT: usize = 10;
pub const DEFAULT_HISTORY_HOURS: i64 = 24;
pub const DEFAULT_HISTORY_INTERVAL_MINUTES: i64 = 60;

/// Tally of current statuses over active monitors
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpDownStats {
    pub total: u64,
    pub up: u64,
    pub down: u64,
    pub ssl_issue: u64,
    pub ssl_expiring: u64,
    pub percentage_up: f64,
}

/// An active monitor whose current status is a failure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceDown {
    pub id: i64,
    pub url: String,
    #[serde(rename = "type")]
    pub monitor_type: Option<String>,
    pub status: Status,
    pub error_message: Option<String>,
    pub last_checked: DateTime<Utc>,
    pub notes: Option<String>,
}

/// Status counts for one history bucket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UptimeBucket {
    pub time: DateTime<Utc>,
    pub up: u64,
    pub down: u64,
    pub ssl_issue: u64,
    pub ssl_expiring: u64,
}

impl UptimeBucket {
    fn empty(time: DateTime<Utc>) -> Self {
        Self { time, up: 0, down: 0, ssl_issue: 0, ssl_expiring: 0 }
    }

    fn count(&mut self, status: Status) {
        match status {
            Status::Up => self.up += 1,
            Status::Down => self.down += 1,
            Status::SslIssue => self.ssl_issue += 1,
            Status::SslExpiring => self.ssl_expiring += 1,
            Status::Skipped => {}
        }
    }
}

/// Current status tally from the active monitors and the latest log rows
pub fn tally_statuses(active: &[Monitor], latest: &[MonitorLog]) -> UpDownStats {
    let current = current_statuses(latest);
    let mut stats = UpDownStats { total: active.len() as u64, ..UpDownStats::default() };

    for monitor in active {
        match monitor.id.and_then(|id| current.get(&id)).map(|log| log.status) {
            Some(Status::Up) => stats.up += 1,
            Some(Status::Down) => stats.down += 1,
            Some(Status::SslIssue) => stats.ssl_issue += 1,
            Some(Status::SslExpiring) => stats.ssl_expiring += 1,
            Some(Status::Skipped) | None => {}
        }
    }

    stats.percentage_up = if stats.total == 0 {
        0.0
    } else {
        (stats.up as f64 / stats.total as f64 * 10_000.0).round() / 100.0
    };
    stats
}

/// Active monitors currently `down` or `ssl_issue`, most recently checked first
pub fn failing_monitors(active: &[Monitor], latest: &[MonitorLog], limit: usize) -> Vec<DeviceDown> {
    let current = current_statuses(latest);

    let mut failing: Vec<DeviceDown> = active
        .iter()
        .filter_map(|monitor| {
            let id = monitor.id?;
            let log = current.get(&id)?;
            log.status.is_failure().then(|| DeviceDown {
                id,
                url: monitor.url.clone(),
                monitor_type: monitor.monitor_type.clone(),
                status: log.status,
                error_message: log.error_message.clone(),
                last_checked: log.checked_at,
                notes: monitor.notes.clone(),
            })
        })
        .collect();

    failing.sort_by(|a, b| b.last_checked.cmp(&a.last_checked).then(a.id.cmp(&b.id)));
    failing.truncate(limit);
    failing
}

/// Start of the bucket of width `interval_minutes` containing `time`.
///
/// A width too large to represent puts everything in one bucket starting at
/// the epoch.
pub fn bucket_start(time: DateTime<Utc>, interval_minutes: i64) -> DateTime<Utc> {
    let Some(width) = interval_minutes.max(1).checked_mul(60) else {
        return DateTime::UNIX_EPOCH;
    };
    let start = time.timestamp().div_euclid(width) * width;
    DateTime::from_timestamp(start, 0).unwrap_or(time)
}

/// Bucketed status history over `[now - hours, now]`.
///
/// Buckets are contiguous, from the one containing `now - hours` through the
/// one containing `now`. Within a bucket each monitor counts once, with the
/// status of its latest row in that bucket.
pub fn bucket_history(
    logs: &[MonitorLog],
    now: DateTime<Utc>,
    hours: i64,
    interval_minutes: i64,
) -> Vec<UptimeBucket> {
    let interval_minutes = interval_minutes.max(1);
    let first = bucket_start(window_start(now, hours), interval_minutes);
    let last = bucket_start(now, interval_minutes);

    let mut latest_per_bucket: HashMap<(DateTime<Utc>, i64), &MonitorLog> = HashMap::new();
    for log in logs {
        let bucket = bucket_start(log.checked_at, interval_minutes);
        if bucket < first || bucket > last {
            continue;
        }
        latest_per_bucket
            .entry((bucket, log.monitor_id))
            .and_modify(|current| {
                if (log.checked_at, log.id) > (current.checked_at, current.id) {
                    *current = log;
                }
            })
            .or_insert(log);
    }

    let mut buckets = BTreeMap::new();
    let mut time = Some(first);
    while let Some(current) = time.filter(|time| *time <= last) {
        buckets.insert(current, UptimeBucket::empty(current));
        time = Duration::try_minutes(interval_minutes)
            .and_then(|width| current.checked_add_signed(width));
    }

    for ((bucket, _), log) in latest_per_bucket {
        if let Some(entry) = buckets.get_mut(&bucket) {
            entry.count(log.status);
        }
    }

    buckets.into_values().collect()
}

/// `now - hours`, clamped to the earliest representable time
fn window_start(now: DateTime<Utc>, hours: i64) -> DateTime<Utc> {
    Duration::try_hours(hours.max(0))
        .and_then(|span| now.checked_sub_signed(span))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Most recent row per monitor id
fn current_statuses(latest: &[MonitorLog]) -> HashMap<i64, &MonitorLog> {
    let mut current: HashMap<i64, &MonitorLog> = HashMap::new();
    for log in latest {
        current
            .entry(log.monitor_id)
            .and_modify(|existing| {
                if log.id > existing.id {
                    *existing = log;
                }
            })
            .or_insert(log);
    }
    current
}

/// Dashboard queries
pub struct Dashboard {
    database: Arc<dyn Database>,
}

impl Dashboard {
    pub fn new(database: Arc<dyn Database>) -> Self {
        Self { database }
    }

    async fn active_monitors(&self) -> Result<Vec<Monitor>> {
        let monitors = self.database.get_monitors().await?;
        Ok(monitors.into_iter().filter(|monitor| monitor.is_active).collect())
    }

    pub async fn up_down_stats(&self) -> Result<UpDownStats> {
        let active = self.active_monitors().await?;
        let latest = self.database.latest_logs().await?;
        Ok(tally_statuses(&active, &latest))
    }

    pub async fn devices_down(&self, limit: usize) -> Result<Vec<DeviceDown>> {
        let active = self.active_monitors().await?;
        let latest = self.database.latest_logs().await?;
        Ok(failing_monitors(&active, &latest, limit))
    }

    pub async fn uptime_history(&self, hours: i64, interval_minutes: i64) -> Result<Vec<UptimeBucket>> {
        let now = Utc::now();
        let start = bucket_start(window_start(now, hours), interval_minutes);
        let logs = self.database.logs_between(start, now).await?;
        Ok(bucket_history(&logs, now, hours, interval_minutes))
    }
}
