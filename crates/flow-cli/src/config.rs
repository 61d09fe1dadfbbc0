//! Host configuration storage
//!
//! Handles persistent storage of provider connection and run settings.

use std::path::{Path, PathBuf};

use flow_engine::ExecutorOptions;
use generation::ProviderConfig;
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::constants::{defaults, paths};

/// Full host configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Generation server connection
    pub provider: ProviderConfig,
    /// Root for relative filenames in workflows
    pub working_dir: Option<PathBuf>,
    /// Probe the server before running
    pub check_connection: bool,
    /// Refuse to run workflows with validation errors
    pub enforce_validation: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            provider: ProviderConfig::default(),
            working_dir: None,
            check_connection: true,
            enforce_validation: false,
        }
    }
}

/// Values given on the command line; each one wins over the file
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub url: Option<String>,
    pub working_dir: Option<PathBuf>,
    pub no_check: bool,
    pub strict: bool,
}

impl AppConfig {
    /// Platform directory holding `config.json`
    pub fn default_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(paths::CONFIG_DIR))
    }

    /// Load configuration from a directory
    pub async fn load(config_dir: &Path) -> Result<Self, ConfigError> {
        Self::load_file(&config_dir.join(paths::CONFIG_FILE)).await
    }

    /// Load configuration from a file; a missing file yields defaults
    pub async fn load_file(config_path: &Path) -> Result<Self, ConfigError> {
        if !config_path.exists() {
            log::debug!("No configuration at {:?}, using defaults", config_path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(config_path)
            .await
            .map_err(ConfigError::Io)?;

        serde_json::from_str(&contents).map_err(ConfigError::Parse)
    }

    /// Save configuration to a directory
    pub async fn save(&self, config_dir: &Path) -> Result<PathBuf, ConfigError> {
        let config_path = config_dir.join(paths::CONFIG_FILE);
        self.save_file(&config_path).await?;
        Ok(config_path)
    }

    /// Save configuration to a file, creating its directory
    pub async fn save_file(&self, config_path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = config_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await.map_err(ConfigError::Io)?;
            }
        }

        let contents = serde_json::to_string_pretty(self).map_err(ConfigError::Serialize)?;

        fs::write(config_path, contents)
            .await
            .map_err(ConfigError::Io)?;

        log::info!("Configuration saved to {:?}", config_path);
        Ok(())
    }

    pub fn apply(&mut self, overrides: &Overrides) {
        if let Some(url) = &overrides.url {
            self.provider.base_url = url.clone();
        }
        if let Some(dir) = &overrides.working_dir {
            self.working_dir = Some(dir.clone());
        }
        if overrides.no_check {
            self.check_connection = false;
        }
        if overrides.strict {
            self.enforce_validation = true;
        }
    }

    pub fn working_dir(&self) -> PathBuf {
        self.working_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(defaults::WORKING_DIR))
    }

    pub fn executor_options(&self) -> ExecutorOptions {
        ExecutorOptions::new(self.working_dir())
            .with_check_connection(self.check_connection)
            .with_enforce_validation(self.enforce_validation)
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(serde_json::Error),
    #[error("Failed to serialize config: {0}")]
    Serialize(serde_json::Error),
}
