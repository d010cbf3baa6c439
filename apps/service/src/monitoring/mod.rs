//! Check engine - everything between a configured monitor and a log row
//!
//! This module is responsible for:
//! - Resolving a monitor's address into a protocol and target
//! - Executing ping, TCP and HTTP(S) probes
//! - Classifying outcomes, including certificate state
//! - Selecting due monitors and checking them concurrently

pub mod certificate;
pub mod classifier;
pub mod executor;
pub mod probe;
pub mod scheduler;
pub mod target;
pub mod types;


pub use executor::{LogSink, MonitorChecker};
pub use scheduler::{BatchSummary, MonitorOutcome, MonitorRef, MonitoringScheduler};
pub use types::{CheckResult, Status};
