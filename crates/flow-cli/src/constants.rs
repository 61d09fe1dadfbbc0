//! Host-wide constants
//!
//! Single source of truth for file locations and command defaults.

/// Configuration storage
pub mod paths {
    /// Directory created under the platform config directory
    pub const CONFIG_DIR: &str = "flowctl";
    /// Configuration file name inside that directory
    pub const CONFIG_FILE: &str = "config.json";
}

/// Default values for command options
pub mod defaults {
    /// Working directory when neither the config nor `--workdir` names one
    pub const WORKING_DIR: &str = ".";
}
