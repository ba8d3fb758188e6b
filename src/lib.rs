//! Integration verification for the QUAST SDK module.
//!
//! Runs `run_QUAST` against live services and checks that the packaged result
//! landed intact in Shock and is indexed by the handle service.

/// Application directories for log files.
pub mod app_dirs;
/// Deployment config and environment inputs.
pub mod config;
/// Top-level error type.
pub mod error;
/// Run fixture and best-effort teardown.
pub mod fixture;
pub(crate) mod http_client;
/// `run_QUAST` invocation.
pub mod job;
/// Tracing setup.
pub mod logging;
/// Sequential scenario runner.
pub mod runner;
/// Built-in scenarios.
pub mod scenario;
/// Remote service clients.
pub mod services;
/// Result verification.
pub mod verify;

pub use error::HarnessError;
