use std::{fmt::Display, io, path::Path};

use cadence_domain::{DateWindowError, JobStateError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Persistence error: {0}")]
    Persistence(String),
    #[error("Timed out after {waited_ms}ms waiting for lock `{path}`")]
    LockTimeout { path: String, waited_ms: u64 },
    #[error("External process failed: {0}")]
    ExternalProcess(String),
    #[error("Scheduler error: {0}")]
    Scheduler(String),
    #[error(transparent)]
    InvalidTransition(#[from] JobStateError),
}

impl CoreError {
    /// Persistence failure tied to a concrete file.
    pub fn persistence_at(path: &Path, err: impl Display) -> Self {
        CoreError::Persistence(format!("{}: {}", path.display(), err))
    }

    pub fn lock_timeout(path: &Path, waited_ms: u64) -> Self {
        CoreError::LockTimeout {
            path: path.display().to_string(),
            waited_ms,
        }
    }
}

impl From<io::Error> for CoreError {
    fn from(err: io::Error) -> Self {
        CoreError::Persistence(err.to_string())
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::Persistence(err.to_string())
    }
}

impl From<DateWindowError> for CoreError {
    fn from(err: DateWindowError) -> Self {
        CoreError::Validation(err.to_string())
    }
}
