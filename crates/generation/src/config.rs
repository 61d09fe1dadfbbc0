//! Configuration types for generation providers

use serde::{Deserialize, Serialize};

use crate::constants::defaults;

/// Connection settings for an HTTP generation provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Base URL of the server (e.g., "http://127.0.0.1:7860")
    pub base_url: String,
    /// Timeout for a single generation request, in seconds
    pub timeout_secs: u64,
    /// Optional bearer token for servers behind an authenticating proxy
    pub api_key: Option<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::BASE_URL.to_string(),
            timeout_secs: defaults::TIMEOUT_SECS,
            api_key: None,
        }
    }
}

impl ProviderConfig {
    /// Create a config pointing at the given base URL
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Base URL without a trailing slash
    pub fn normalized_base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ProviderConfig::default();
        assert_eq!(config.base_url, "http://127.0.0.1:7860");
        assert_eq!(config.timeout_secs, 600);
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: ProviderConfig =
            serde_json::from_str(r#"{"base_url": "http://gpu-box:7888/"}"#).unwrap();
        assert_eq!(config.normalized_base_url(), "http://gpu-box:7888");
        assert_eq!(config.timeout_secs, 600);
    }
}
