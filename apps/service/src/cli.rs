use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, info};

use crate::config::Config;
use crate::database::{self, Database, DatabaseImpl};
use crate::monitoring::{BatchSummary, MonitorChecker, MonitorOutcome, MonitorRef, MonitoringScheduler};
use crate::retention::{RetentionCleanup, RetentionPolicy};

#[derive(Debug, Parser)]
#[command(author, version, about = "Uptime checks for URLs, hosts and ports", long_about = None)]
pub struct Cli {
    /// Config file, defaults to $XDG_CONFIG_HOME/vigil/config.toml
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Check every monitor that is due, or one monitor right now
    Check {
        /// Numeric id or UUID of the monitor to check, ignoring its schedule
        #[arg(long, value_name = "ID|UUID")]
        monitor_id: Option<MonitorRef>,
    },
    /// Delete check logs older than the retention period
    CleanupLogs,
    /// Check due monitors periodically and clean up logs hourly until Ctrl-C
    Run,
}

/// Execute a parsed command line
pub async fn run(cli: Cli) -> Result<ExitCode> {
    let config = Config::from_config(cli.config.as_ref()).context("failed to load configuration")?;
    debug!("{}", config);

    let database = Arc::new(
        database::open(&config.database.path, config.scheduler.max_concurrency + 1)
            .await
            .with_context(|| format!("failed to open database {}", config.database.path))?,
    );

    match cli.command {
        Commands::Check { monitor_id } => {
            let scheduler = build_scheduler(&config, database)?;
            match monitor_id {
                Some(reference) => check_one(&scheduler, reference).await,
                None => check_due(&scheduler).await,
            }
        }
        Commands::CleanupLogs => cleanup_logs(&config, database).await,
        Commands::Run => run_forever(&config, database).await,
    }
}

fn build_scheduler(config: &Config, database: Arc<DatabaseImpl>) -> Result<MonitoringScheduler> {
    let checker = MonitorChecker::new(config.checks.clone(), database.clone())?;
    Ok(MonitoringScheduler::new(Arc::new(checker), database, &config.scheduler))
}

async fn check_one(scheduler: &MonitoringScheduler, reference: MonitorRef) -> Result<ExitCode> {
    let Some(outcome) = scheduler.run_one(reference).await? else {
        eprintln!("Monitor with ID {reference} not found.");
        return Ok(ExitCode::FAILURE);
    };

    print_outcome(&outcome);
    Ok(if outcome.result.is_failure() { ExitCode::FAILURE } else { ExitCode::SUCCESS })
}

async fn check_due(scheduler: &MonitoringScheduler) -> Result<ExitCode> {
    let summary = scheduler.run_due().await?;
    if summary.is_empty() {
        println!("No monitors due for checking.");
        return Ok(ExitCode::SUCCESS);
    }

    for outcome in &summary.outcomes {
        print_outcome(outcome);
    }
    println!("{}", summary_line(&summary));

    Ok(if summary.is_success() { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

async fn cleanup_logs(config: &Config, database: Arc<DatabaseImpl>) -> Result<ExitCode> {
    let policy = RetentionPolicy::from(&config.retention);
    let Some(days) = policy.log_retention_days else {
        println!("Log retention is set to unlimited. No cleanup needed.");
        return Ok(ExitCode::SUCCESS);
    };

    let deleted = RetentionCleanup::new(database, policy).cleanup_expired_logs().await?;
    println!("Deleted {deleted} log entries older than {days} days.");
    Ok(ExitCode::SUCCESS)
}

async fn run_forever(config: &Config, database: Arc<DatabaseImpl>) -> Result<ExitCode> {
    let scheduler = Arc::new(build_scheduler(config, database.clone())?);
    let tick = std::time::Duration::from_secs(config.scheduler.tick_seconds);

    let store: Arc<dyn Database> = database;
    let cleanup = RetentionCleanup::new(store, RetentionPolicy::from(&config.retention));

    let checks = scheduler.start_periodic(tick);
    let housekeeping = cleanup.start_periodic_cleanup();
    info!("Scheduler running every {}s, press Ctrl-C to stop", tick.as_secs());

    tokio::signal::ctrl_c().await.context("failed to listen for Ctrl-C")?;
    info!("Shutting down");

    checks.abort();
    housekeeping.abort();
    Ok(ExitCode::SUCCESS)
}

fn print_outcome(outcome: &MonitorOutcome) {
    for line in outcome_lines(outcome) {
        println!("{line}");
    }
}

/// Operator-facing lines for one checked monitor
pub fn outcome_lines(outcome: &MonitorOutcome) -> Vec<String> {
    let result = &outcome.result;
    let mark = if result.is_failure() { '✗' } else { '✓' };

    let mut lines = vec![
        format!("Checking monitor #{}: {}", outcome.monitor.log_id(), outcome.monitor.url),
        format!("  {} {} - {}", mark, result.status, result.message),
    ];
    if let Some(latency) = result.latency_ms {
        lines.push(format!("  Response time: {latency}ms"));
    }
    lines
}

pub fn summary_line(summary: &BatchSummary) -> String {
    format!("Completed: {} successful, {} failed.", summary.succeeded, summary.failed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Monitor;
    use crate::monitoring::{CheckResult, Status};

    fn outcome(status: Status, message: &str, latency: Option<f64>) -> MonitorOutcome {
        let mut monitor = Monitor::new("db.internal:5432", None);
        monitor.id = Some(3);
        MonitorOutcome {
            monitor,
            result: CheckResult::new(3, status, message).with_latency(latency),
        }
    }

    #[test]
    fn test_outcome_lines() {
        let lines = outcome_lines(&outcome(Status::Up, "Port 5432 is open", Some(12.5)));
        assert_eq!(
            lines,
            vec![
                "Checking monitor #3: db.internal:5432",
                "  ✓ up - Port 5432 is open",
                "  Response time: 12.5ms",
            ]
        );

        let lines = outcome_lines(&outcome(Status::Down, "Connection refused", None));
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1], "  ✗ down - Connection refused");

        let lines = outcome_lines(&outcome(Status::SslExpiring, "expires soon", None));
        assert!(lines[1].starts_with("  ✓ ssl_expiring"));
    }

    #[test]
    fn test_summary_line() {
        let summary = BatchSummary { outcomes: Vec::new(), succeeded: 1, failed: 1 };
        assert_eq!(summary_line(&summary), "Completed: 1 successful, 1 failed.");
    }

    #[test]
    fn test_parse_arguments() {
        let cli = Cli::try_parse_from(["vigil", "check", "--monitor-id", "12"]).unwrap();
        assert!(matches!(cli.command, Commands::Check { monitor_id: Some(MonitorRef::Id(12)) }));

        let cli = Cli::try_parse_from(["vigil", "--config", "/tmp/v.toml", "cleanup-logs"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/v.toml")));
        assert!(matches!(cli.command, Commands::CleanupLogs));

        assert!(Cli::try_parse_from(["vigil", "check", "--monitor-id", "nope"]).is_err());
    }

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
