//! vigil: uptime checks for URLs, IP addresses and host:port pairs.
//!
//! Monitors live in a LibSQL database. The check engine in [`monitoring`]
//! resolves each monitor's address, probes it, classifies the outcome and
//! appends the result to the check log, which [`dashboard`] aggregates.

pub mod cli;
pub mod config;
pub mod dashboard;
pub mod database;
pub mod monitoring;
pub mod pool;
pub mod retention;
