use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Row, params};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::models::{Monitor, MonitorLog};
use crate::monitoring::executor::LogSink;
use crate::monitoring::types::CheckResult;
use crate::pool::LibsqlPool;

const MONITOR_COLUMNS: &str = "id, uuid, name, url, monitor_type, frequency_minutes, is_active, last_check_at, notes, created_at, updated_at";
const LOG_COLUMNS: &str =
    "id, monitor_id, status, response_time_ms, error_message, metadata, checked_at";

/// Database trait for abstracting storage of monitors and the check log
#[async_trait]
pub trait Database: Send + Sync {
    /// Get every monitor, active or not
    async fn get_monitors(&self) -> Result<Vec<Monitor>>;

    /// Get a monitor by its numeric id
    async fn get_monitor(&self, id: i64) -> Result<Option<Monitor>>;

    /// Get a monitor by UUID
    async fn get_monitor_by_uuid(&self, uuid: Uuid) -> Result<Option<Monitor>>;

    /// Insert or update a monitor, returning its id
    async fn save_monitor(&self, monitor: &Monitor) -> Result<i64>;

    /// Record when a monitor was last checked
    async fn update_last_check(&self, id: i64, at: DateTime<Utc>) -> Result<()>;

    /// Append a check result to the log
    async fn save_log(&self, result: &CheckResult) -> Result<i64>;

    /// Most recent log row of every monitor that has one
    async fn latest_logs(&self) -> Result<Vec<MonitorLog>>;

    /// Log rows checked within `[start, end]`, oldest first
    async fn logs_between(&self, start: DateTime<Utc>, end: DateTime<Utc>)
    -> Result<Vec<MonitorLog>>;

    /// Number of active monitors
    async fn count_active_monitors(&self) -> Result<u64>;

    /// Delete log rows checked before `cutoff`, returning how many were removed
    async fn delete_logs_before(&self, cutoff: DateTime<Utc>) -> Result<u64>;
}

/// LibSQL database implementation
pub struct DatabaseImpl {
    pool: LibsqlPool,
}

impl DatabaseImpl {
    /// Create a new database instance from a pool
    pub fn new_from_pool(pool: LibsqlPool) -> Self {
        Self { pool }
    }

    /// Get a connection from the pool
    async fn get_conn(&self) -> Result<deadpool::managed::Object<crate::pool::LibsqlManager>> {
        Ok(self.pool.get().await?)
    }

    async fn query_monitors(&self, filter: &str, params: Vec<libsql::Value>) -> Result<Vec<Monitor>> {
        let conn = self.get_conn().await?;
        let sql = format!("SELECT {MONITOR_COLUMNS} FROM monitors {filter} ORDER BY id");
        let mut rows = conn.query(&sql, params).await?;

        let mut monitors = Vec::new();
        while let Some(row) = rows.next().await? {
            monitors.push(monitor_from_row(&row)?);
        }
        Ok(monitors)
    }

    async fn query_logs(&self, filter: &str, params: Vec<libsql::Value>) -> Result<Vec<MonitorLog>> {
        let conn = self.get_conn().await?;
        let sql = format!("SELECT {LOG_COLUMNS} FROM monitors_logs {filter} ORDER BY id");
        let mut rows = conn.query(&sql, params).await?;

        let mut logs = Vec::new();
        while let Some(row) = rows.next().await? {
            match log_from_row(&row) {
                Ok(log) => logs.push(log),
                Err(e) => tracing::warn!("Skipping unreadable log row: {:#}", e),
            }
        }
        Ok(logs)
    }
}

fn monitor_from_row(row: &Row) -> Result<Monitor> {
    let uuid_str: String = row.get(1)?;
    let last_check_at: Option<i64> = row.get(7)?;

    Ok(Monitor {
        id: Some(row.get(0)?),
        uuid: Uuid::parse_str(&uuid_str).with_context(|| format!("bad monitor uuid {uuid_str}"))?,
        name: row.get(2)?,
        url: row.get(3)?,
        monitor_type: row.get(4)?,
        frequency_minutes: row.get::<Option<i64>>(5)?.map(|v| v.clamp(0, u32::MAX as i64) as u32),
        is_active: row.get::<i64>(6)? != 0,
        last_check_at: last_check_at.map(Monitor::i64_to_timestamp),
        notes: row.get(8)?,
        created_at: Monitor::i64_to_timestamp(row.get(9)?),
        updated_at: Monitor::i64_to_timestamp(row.get(10)?),
    })
}

fn log_from_row(row: &Row) -> Result<MonitorLog> {
    let status_str: String = row.get(2)?;
    let metadata = match row.get::<Option<String>>(5)? {
        Some(raw) => serde_json::from_str::<Map<String, Value>>(&raw).unwrap_or_default(),
        None => Map::new(),
    };

    Ok(MonitorLog {
        id: row.get(0)?,
        monitor_id: row.get(1)?,
        status: status_str.parse()?,
        response_time_ms: row.get(3)?,
        error_message: row.get(4)?,
        metadata,
        checked_at: Monitor::i64_to_timestamp(row.get(6)?),
    })
}

#[async_trait]
impl Database for DatabaseImpl {
    async fn get_monitors(&self) -> Result<Vec<Monitor>> {
        self.query_monitors("", Vec::new()).await
    }

    async fn get_monitor(&self, id: i64) -> Result<Option<Monitor>> {
        let mut monitors = self.query_monitors("WHERE id = ?", vec![id.into()]).await?;
        Ok(monitors.pop())
    }

    async fn get_monitor_by_uuid(&self, uuid: Uuid) -> Result<Option<Monitor>> {
        let mut monitors =
            self.query_monitors("WHERE uuid = ?", vec![uuid.to_string().into()]).await?;
        Ok(monitors.pop())
    }

    async fn save_monitor(&self, monitor: &Monitor) -> Result<i64> {
        let conn = self.get_conn().await?;
        let last_check_at = monitor.last_check_at.map(Monitor::timestamp_to_i64);
        let frequency = monitor.frequency_minutes.map(i64::from);
        let updated_at = Monitor::timestamp_to_i64(monitor.updated_at);

        if let Some(id) = monitor.id {
            conn.execute(
                "UPDATE monitors SET name = ?, url = ?, monitor_type = ?, frequency_minutes = ?, is_active = ?, last_check_at = ?, notes = ?, updated_at = ? WHERE id = ?",
                params![
                    monitor.name.clone(),
                    monitor.url.clone(),
                    monitor.monitor_type.clone(),
                    frequency,
                    if monitor.is_active { 1 } else { 0 },
                    last_check_at,
                    monitor.notes.clone(),
                    updated_at,
                    id
                ],
            )
            .await?;
            Ok(id)
        } else {
            conn.execute(
                "INSERT INTO monitors (uuid, name, url, monitor_type, frequency_minutes, is_active, last_check_at, notes, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    monitor.uuid.to_string(),
                    monitor.name.clone(),
                    monitor.url.clone(),
                    monitor.monitor_type.clone(),
                    frequency,
                    if monitor.is_active { 1 } else { 0 },
                    last_check_at,
                    monitor.notes.clone(),
                    Monitor::timestamp_to_i64(monitor.created_at),
                    updated_at
                ],
            )
            .await?;

            Ok(conn.last_insert_rowid())
        }
    }

    async fn update_last_check(&self, id: i64, at: DateTime<Utc>) -> Result<()> {
        let conn = self.get_conn().await?;
        conn.execute(
            "UPDATE monitors SET last_check_at = ? WHERE id = ?",
            params![Monitor::timestamp_to_i64(at), id],
        )
        .await?;
        Ok(())
    }

    async fn save_log(&self, result: &CheckResult) -> Result<i64> {
        let conn = self.get_conn().await?;
        let metadata = serde_json::to_string(&result.metadata)?;

        conn.execute(
            "INSERT INTO monitors_logs (monitor_id, status, response_time_ms, error_message, metadata, checked_at, created_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                result.monitor_id,
                result.status.as_str(),
                result.latency_ms,
                result.error_message.clone(),
                metadata,
                Monitor::timestamp_to_i64(result.checked_at),
                Utc::now().timestamp()
            ],
        )
        .await?;

        Ok(conn.last_insert_rowid())
    }

    async fn latest_logs(&self) -> Result<Vec<MonitorLog>> {
        self.query_logs(
            "WHERE id IN (SELECT MAX(id) FROM monitors_logs GROUP BY monitor_id)",
            Vec::new(),
        )
        .await
    }

    async fn logs_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<MonitorLog>> {
        self.query_logs(
            "WHERE checked_at BETWEEN ? AND ?",
            vec![start.timestamp().into(), end.timestamp().into()],
        )
        .await
    }

    async fn count_active_monitors(&self) -> Result<u64> {
        let conn = self.get_conn().await?;
        let mut rows = conn.query("SELECT COUNT(*) FROM monitors WHERE is_active = 1", ()).await?;
        let count = match rows.next().await? {
            Some(row) => row.get::<i64>(0)?,
            None => 0,
        };
        Ok(count.max(0) as u64)
    }

    async fn delete_logs_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let conn = self.get_conn().await?;
        let deleted = conn
            .execute("DELETE FROM monitors_logs WHERE checked_at < ?", params![cutoff.timestamp()])
            .await?;
        Ok(deleted)
    }
}

#[async_trait]
impl LogSink for DatabaseImpl {
    async fn append(&self, result: &CheckResult) -> Result<()> {
        self.save_log(result).await.map(|_| ())
    }
}
