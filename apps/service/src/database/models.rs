use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::monitoring::types::Status;

/// Monitor model - a configured target to be health-checked
///
/// Everything except `last_check_at` is owned by whoever administers monitors;
/// the check engine only reads it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Monitor {
    pub id: Option<i64>,
    pub uuid: Uuid,
    pub name: Option<String>,
    /// Configured address: URL, IP literal or host:port
    pub url: String,
    /// Declared protocol (`http`, `https`, `ping`, `tcp`); inferred when unset
    pub monitor_type: Option<String>,
    /// Per-monitor check frequency override in minutes
    pub frequency_minutes: Option<u32>,
    pub is_active: bool,
    pub last_check_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Monitor {
    /// Create a new, unsaved, active monitor
    pub fn new(url: impl Into<String>, monitor_type: Option<&str>) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            uuid: Uuid::new_v4(),
            name: None,
            url: url.into(),
            monitor_type: monitor_type.map(str::to_string),
            frequency_minutes: None,
            is_active: true,
            last_check_at: None,
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Id used for log rows; unsaved monitors log under 0
    pub fn log_id(&self) -> i64 {
        self.id.unwrap_or_default()
    }

    /// Convert a timestamp to Unix seconds
    pub fn timestamp_to_i64(time: DateTime<Utc>) -> i64 {
        time.timestamp()
    }

    /// Convert Unix seconds to a timestamp
    pub fn i64_to_timestamp(timestamp: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(timestamp, 0).unwrap_or_default()
    }
}

/// One persisted row of the check log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorLog {
    pub id: i64,
    pub monitor_id: i64,
    pub status: Status,
    pub response_time_ms: Option<f64>,
    pub error_message: Option<String>,
    pub metadata: Map<String, Value>,
    pub checked_at: DateTime<Utc>,
}
