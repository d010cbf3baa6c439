use anyhow::Result;
use chrono::{DateTime, Utc};
use futures::stream::{FuturesUnordered, StreamExt};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::{interval, timeout};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::executor::MonitorChecker;
use super::types::{CheckResult, Status};
use crate::config::SchedulerConfig;
use crate::database::{Database, Monitor};

/// Whether `monitor` should be checked at `now`.
///
/// Active monitors are due when never checked, or when at least their
/// frequency (override, else `default_frequency_minutes`) in whole minutes has
/// passed since the last check. An override of `0` is due on every tick.
pub fn is_due(monitor: &Monitor, now: DateTime<Utc>, default_frequency_minutes: u32) -> bool {
    if !monitor.is_active {
        return false;
    }

    let Some(last_check_at) = monitor.last_check_at else {
        return true;
    };

    let frequency = monitor.frequency_minutes.unwrap_or(default_frequency_minutes);

    (now - last_check_at).num_minutes() >= i64::from(frequency)
}

/// The due-set at `now`
pub fn due_monitors(
    monitors: impl IntoIterator<Item = Monitor>,
    now: DateTime<Utc>,
    default_frequency_minutes: u32,
) -> Vec<Monitor> {
    monitors
        .into_iter()
        .filter(|monitor| is_due(monitor, now, default_frequency_minutes))
        .collect()
}

/// Monitor selected by numeric id or by UUID
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorRef {
    Id(i64),
    Uuid(Uuid),
}

impl FromStr for MonitorRef {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(id) = s.parse::<i64>() {
            return Ok(MonitorRef::Id(id));
        }
        Uuid::parse_str(s)
            .map(MonitorRef::Uuid)
            .map_err(|_| format!("'{s}' is neither a monitor id nor a UUID"))
    }
}

impl fmt::Display for MonitorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MonitorRef::Id(id) => write!(f, "{id}"),
            MonitorRef::Uuid(uuid) => write!(f, "{uuid}"),
        }
    }
}

/// A monitor together with the result of checking it
#[derive(Debug, Clone)]
pub struct MonitorOutcome {
    pub monitor: Monitor,
    pub result: CheckResult,
}

/// Result of one batch run
#[derive(Debug, Clone, Default)]
pub struct BatchSummary {
    pub outcomes: Vec<MonitorOutcome>,
    pub succeeded: usize,
    pub failed: usize,
}

impl BatchSummary {
    fn from_outcomes(mut outcomes: Vec<MonitorOutcome>) -> Self {
        outcomes.sort_by_key(|outcome| outcome.monitor.log_id());
        let failed = outcomes.iter().filter(|outcome| outcome.result.is_failure()).count();
        Self { succeeded: outcomes.len() - failed, failed, outcomes }
    }

    /// No monitor was due
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

/// Monitoring scheduler - selects due monitors and checks them concurrently
pub struct MonitoringScheduler {
    checker: Arc<MonitorChecker>,
    database: Arc<dyn Database>,
    default_frequency_minutes: u32,
    concurrency_limiter: Arc<Semaphore>,
    check_deadline: Duration,
}

impl MonitoringScheduler {
    pub fn new(
        checker: Arc<MonitorChecker>,
        database: Arc<dyn Database>,
        config: &SchedulerConfig,
    ) -> Self {
        let check_deadline = checker.deadline();
        Self {
            checker,
            database,
            default_frequency_minutes: config.default_frequency_minutes,
            concurrency_limiter: Arc::new(Semaphore::new(config.max_concurrency.max(1))),
            check_deadline,
        }
    }

    /// Override the per-check hard deadline
    pub fn with_check_deadline(mut self, deadline: Duration) -> Self {
        self.check_deadline = deadline;
        self
    }

    /// Check every monitor that is due right now
    pub async fn run_due(&self) -> Result<BatchSummary> {
        let now = Utc::now();
        let monitors = self.database.get_monitors().await?;
        let total = monitors.len();
        let due = due_monitors(monitors, now, self.default_frequency_minutes);

        if due.is_empty() {
            debug!("No monitors due ({} configured)", total);
            return Ok(BatchSummary::default());
        }

        info!("Checking {} of {} monitors", due.len(), total);

        let mut tasks: FuturesUnordered<_> =
            due.into_iter().map(|monitor| self.run_guarded(monitor)).collect();

        let mut outcomes = Vec::with_capacity(tasks.len());
        while let Some(outcome) = tasks.next().await {
            outcomes.push(outcome);
        }

        let summary = BatchSummary::from_outcomes(outcomes);
        info!(
            "Batch completed: {} successful, {} failed",
            summary.succeeded, summary.failed
        );
        Ok(summary)
    }

    /// Check one monitor immediately, ignoring its schedule.
    ///
    /// Returns `None` when no such monitor exists.
    pub async fn run_one(&self, reference: MonitorRef) -> Result<Option<MonitorOutcome>> {
        let monitor = match reference {
            MonitorRef::Id(id) => self.database.get_monitor(id).await?,
            MonitorRef::Uuid(uuid) => self.database.get_monitor_by_uuid(uuid).await?,
        };

        match monitor {
            Some(monitor) => Ok(Some(self.run_guarded(monitor).await)),
            None => Ok(None),
        }
    }

    /// Run [`run_due`](Self::run_due) every `tick` until the task is aborted
    pub fn start_periodic(self: Arc<Self>, tick: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut timer = interval(tick);

            loop {
                timer.tick().await;

                match self.run_due().await {
                    Ok(summary) if !summary.is_success() => {
                        warn!("{} monitor(s) failed their check", summary.failed);
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!("Scheduled run failed: {:#}", e);
                    }
                }
            }
        })
    }

    /// Check `monitor` in its own task under the concurrency limit and the
    /// hard deadline, then stamp its last check time.
    async fn run_guarded(&self, monitor: Monitor) -> MonitorOutcome {
        let checker = Arc::clone(&self.checker);
        let limiter = Arc::clone(&self.concurrency_limiter);
        let deadline = self.check_deadline;
        let task_monitor = monitor.clone();

        let handle = tokio::spawn(async move {
            let _permit = limiter.acquire_owned().await.ok();
            match timeout(deadline, checker.check(&task_monitor)).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(monitor_id = task_monitor.log_id(), "check exceeded {:?}", deadline);
                    let reason = format!("Check timed out after {}s", deadline.as_secs_f64());
                    checker.fail(&task_monitor, reason).await
                }
            }
        });

        let result = match handle.await {
            Ok(result) => result,
            Err(e) => {
                warn!(monitor_id = monitor.log_id(), "check task failed: {}", e);
                self.checker.fail(&monitor, format!("Check task failed: {e}")).await
            }
        };

        if result.status != Status::Skipped {
            if let Some(id) = monitor.id {
                if let Err(e) = self.database.update_last_check(id, result.checked_at).await {
                    warn!(monitor_id = id, "failed to update last check time: {:#}", e);
                }
            }
        }

        MonitorOutcome { monitor, result }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn checked_at(last: Option<DateTime<Utc>>, frequency: Option<u32>) -> Monitor {
        let mut monitor = Monitor::new("https://example.com", None);
        monitor.last_check_at = last;
        monitor.frequency_minutes = frequency;
        monitor
    }

    #[test]
    fn test_never_checked_is_due() {
        let now = Utc::now();
        assert!(is_due(&checked_at(None, None), now, 5));
    }

    #[test]
    fn test_due_boundary_is_inclusive() {
        let now = Utc::now();
        let monitor = checked_at(Some(now), None);

        assert!(!is_due(&monitor, now, 5));
        assert!(!is_due(&monitor, now + ChronoDuration::minutes(1), 5));
        assert!(!is_due(&monitor, now + ChronoDuration::seconds(299), 5));
        assert!(is_due(&monitor, now + ChronoDuration::minutes(5), 5));
        assert!(is_due(&monitor, now + ChronoDuration::minutes(90), 5));
    }

    #[test]
    fn test_frequency_override() {
        let now = Utc::now();
        let monitor = checked_at(Some(now - ChronoDuration::minutes(10)), Some(15));
        assert!(!is_due(&monitor, now, 5));

        let monitor = checked_at(Some(now - ChronoDuration::minutes(2)), Some(1));
        assert!(is_due(&monitor, now, 5));

        // zero override is due even right after a check
        let monitor = checked_at(Some(now), Some(0));
        assert!(is_due(&monitor, now, 5));
        assert!(!is_due(&checked_at(Some(now), None), now, 5));
    }

    #[test]
    fn test_inactive_never_due() {
        let now = Utc::now();
        let mut monitor = checked_at(None, None);
        monitor.is_active = false;
        assert!(!is_due(&monitor, now, 5));
    }

    #[test]
    fn test_due_monitors_filters() {
        let now = Utc::now();
        let fresh = checked_at(Some(now), None);
        let stale = checked_at(Some(now - ChronoDuration::hours(1)), None);
        let stale_uuid = stale.uuid;

        let due = due_monitors(vec![fresh, stale], now, 5);
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].uuid, stale_uuid);
    }

    #[test]
    fn test_monitor_ref_parsing() {
        assert_eq!("42".parse::<MonitorRef>().unwrap(), MonitorRef::Id(42));

        let uuid = Uuid::new_v4();
        assert_eq!(uuid.to_string().parse::<MonitorRef>().unwrap(), MonitorRef::Uuid(uuid));
        assert!("monitor-seven".parse::<MonitorRef>().is_err());
    }
}
