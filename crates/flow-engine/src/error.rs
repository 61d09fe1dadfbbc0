//! Error types for the flow engine
//!
//! Runs never fail with these: every problem inside a run becomes a log entry
//! or a terminal status. They cover setup defects detected before a run is
//! marked running.

use std::path::PathBuf;

use thiserror::Error;

use crate::validation::ValidationReport;

/// Result type alias using EngineError
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors that prevent a run from starting
#[derive(Debug, Error)]
pub enum EngineError {
    /// Working directory missing, not a directory, or read-only
    #[error("Working directory '{}' is unusable: {reason}", .path.display())]
    WorkingDirectory { path: PathBuf, reason: String },

    /// Validation was enforced and found errors
    #[error("Workflow is invalid: {0}")]
    Validation(ValidationReport),

    /// A run is already in progress on this executor
    #[error("Executor is already running")]
    AlreadyRunning,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    pub fn working_directory(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::WorkingDirectory {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
