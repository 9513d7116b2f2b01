//! Error types for the command line runner.

use dbsweep_core::SweepError;

use crate::config::ConfigError;

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Sweep(#[from] SweepError),
    #[error("Failed to initialize logging: {0}")]
    Telemetry(String),
}

impl From<dbsweep_core::QueryError> for CliError {
    fn from(e: dbsweep_core::QueryError) -> Self {
        CliError::Sweep(e.into())
    }
}
