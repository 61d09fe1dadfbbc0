//! Errors reported by `flowctl` commands

use std::path::PathBuf;

use flow_engine::{DecodeError, EngineError};
use generation::ProviderError;
use thiserror::Error;

use crate::config::ConfigError;

pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("No configuration directory on this platform, pass --config")]
    NoConfigDir,

    #[error("Cannot read workflow '{}': {source}", .path.display())]
    ReadWorkflow {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid workflow '{}': {source}", .path.display())]
    DecodeWorkflow { path: PathBuf, source: DecodeError },

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("Cannot create provider: {0}")]
    Provider(#[from] ProviderError),
}
