use std::path::PathBuf;

use crate::{
    config::ConfigError,
    services::{AuthenticationError, ServiceError},
};

/// Failure building the run fixture.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Authentication failed: {0}")]
    Authentication(#[from] AuthenticationError),
    #[error("Service error: {0}")]
    Service(#[from] ServiceError),
    #[error("Failed to prepare scratch directory {path}: {source}")]
    Scratch {
        path: PathBuf,
        source: std::io::Error,
    },
}
