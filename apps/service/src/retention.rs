//! Retention of the check log.
//!
//! Log rows older than the configured number of days are deleted. Cleanup
//! runs once on demand (`vigil cleanup-logs`) or hourly as a background task.

use anyhow::Result;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::RetentionConfig;
use crate::database::Database;

/// Retention policy for the check log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Days to keep log rows, `None` keeps them forever
    pub log_retention_days: Option<i64>,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self { log_retention_days: Some(30) }
    }
}

impl From<&RetentionConfig> for RetentionPolicy {
    fn from(config: &RetentionConfig) -> Self {
        Self { log_retention_days: config.log_retention_days }
    }
}

impl RetentionPolicy {
    /// Retention duration in seconds, saturating for absurdly long periods.
    /// A period under one day keeps everything.
    fn retention_seconds(&self) -> Option<i64> {
        self.log_retention_days
            .filter(|days| *days >= 1)
            .map(|days| days.checked_mul(24 * 3600).unwrap_or(i64::MAX))
    }

    /// Rows checked before this instant are expired, clamped to the earliest
    /// representable time
    pub fn cutoff(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let seconds = self.retention_seconds()?;
        let cutoff = now
            .timestamp()
            .checked_sub(seconds)
            .and_then(|timestamp| DateTime::from_timestamp(timestamp, 0));
        Some(cutoff.unwrap_or(DateTime::<Utc>::MIN_UTC))
    }
}

/// Cleanup manager for expired log rows
pub struct RetentionCleanup {
    database: Arc<dyn Database>,
    policy: RetentionPolicy,
}

impl RetentionCleanup {
    pub fn new(database: Arc<dyn Database>, policy: RetentionPolicy) -> Self {
        Self { database, policy }
    }

    /// Delete expired log rows, returning how many were removed
    pub async fn cleanup_expired_logs(&self) -> Result<u64> {
        let Some(cutoff) = self.policy.cutoff(Utc::now()) else {
            info!("Log retention disabled, keeping all check logs");
            return Ok(0);
        };

        debug!(
            "Deleting check logs older than {} days (cutoff: {})",
            self.policy.log_retention_days.unwrap_or_default(),
            cutoff
        );

        let deleted = self.database.delete_logs_before(cutoff).await?;
        info!("Retention cleanup completed: {} check logs deleted", deleted);
        Ok(deleted)
    }

    /// Start background cleanup task (runs every hour)
    pub fn start_periodic_cleanup(&self) -> tokio::task::JoinHandle<()> {
        let database = Arc::clone(&self.database);
        let policy = self.policy.clone();

        tokio::spawn(async move {
            let cleanup = RetentionCleanup::new(database, policy);
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(3600));

            loop {
                interval.tick().await;

                match cleanup.cleanup_expired_logs().await {
                    Ok(count) => {
                        debug!("Periodic log cleanup completed: {} deleted", count);
                    }
                    Err(e) => {
                        warn!("Periodic log cleanup failed: {:#}", e);
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Monitor;
    use crate::database::test_support::create_test_database;
    use crate::monitoring::types::{CheckResult, Status};
    use chrono::Duration;

    #[test]
    fn test_retention_policy_defaults() {
        let policy = RetentionPolicy::default();
        assert_eq!(policy.log_retention_days, Some(30));
        assert_eq!(policy.retention_seconds(), Some(30 * 24 * 3600));
    }

    #[test]
    fn test_cutoff() {
        let now = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let policy = RetentionPolicy { log_retention_days: Some(7) };
        assert_eq!(policy.cutoff(now), Some(now - Duration::days(7)));

        let forever = RetentionPolicy { log_retention_days: None };
        assert_eq!(forever.cutoff(now), None);

        let huge = RetentionPolicy { log_retention_days: Some(i64::MAX) };
        assert_eq!(huge.cutoff(now), Some(DateTime::<Utc>::MIN_UTC));

        let negative = RetentionPolicy { log_retention_days: Some(-1) };
        assert_eq!(negative.cutoff(now), None);
    }

    #[tokio::test]
    async fn test_cleanup_deletes_only_expired_logs() -> Result<()> {
        let (database, _dir) = create_test_database().await?;
        let monitor_id = database.save_monitor(&Monitor::new("10.0.0.1", None)).await?;

        let mut old = CheckResult::new(monitor_id, Status::Up, "Ping successful");
        old.checked_at = Utc::now() - Duration::days(45);
        database.save_log(&old).await?;
        database.save_log(&CheckResult::new(monitor_id, Status::Down, "timeout")).await?;

        let database: Arc<dyn Database> = Arc::new(database);
        let cleanup = RetentionCleanup::new(database.clone(), RetentionPolicy::default());
        assert_eq!(cleanup.cleanup_expired_logs().await?, 1);

        let remaining = database.latest_logs().await?;
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].status, Status::Down);

        let keep_all =
            RetentionCleanup::new(database.clone(), RetentionPolicy { log_retention_days: None });
        assert_eq!(keep_all.cleanup_expired_logs().await?, 0);

        let negative =
            RetentionCleanup::new(database.clone(), RetentionPolicy { log_retention_days: Some(-1) });
        assert_eq!(negative.cleanup_expired_logs().await?, 0);
        assert_eq!(database.latest_logs().await?.len(), 1);
        Ok(())
    }
}
