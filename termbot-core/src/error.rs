//! Error types for the termbot core.
//!
//! Only [`StoreError::ConfigMissing`] and [`StoreError::ConfigCorrupt`] are
//! fatal, and only at startup. Everything else is converted into a reply at
//! the dispatcher boundary.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Access store failures.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("No access configuration found at {path}")]
    ConfigMissing { path: PathBuf },

    #[error("Access configuration is corrupt: {reason}")]
    ConfigCorrupt { reason: String },

    #[error("Failed to persist access configuration: {reason}")]
    PersistFailure { reason: String },
}

impl StoreError {
    pub fn is_fatal(&self) -> bool {
        !matches!(self, StoreError::PersistFailure { .. })
    }
}

/// Shell executor failures.
#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("Failed to start command: {0}")]
    Spawn(String),

    #[error("I/O error while running command: {0}")]
    Io(#[from] std::io::Error),

    #[error("Command timed out after {0:?}")]
    Timeout(Duration),
}

/// Host telemetry failures.
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Telemetry unavailable: {0}")]
    Unavailable(String),

    #[error("Telemetry query timed out after {0:?}")]
    Timeout(Duration),
}
