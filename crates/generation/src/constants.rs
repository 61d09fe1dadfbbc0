//! Provider constants
//!
//! Single source of truth for endpoints and connection defaults.

/// Default values for provider configuration
pub mod defaults {
    /// Default base URL of the Draw Things HTTP server
    pub const BASE_URL: &str = "http://127.0.0.1:7860";
    /// Request timeout for a single generation call (generations can take minutes)
    pub const TIMEOUT_SECS: u64 = 600;
    /// Timeout for the liveness probe
    pub const PROBE_TIMEOUT_SECS: u64 = 5;
}

/// HTTP endpoints of the A1111-compatible API
pub mod endpoints {
    /// Liveness probe (returns the server's current configuration)
    pub const PROBE: &str = "/";
    /// Text-to-image generation
    pub const TXT2IMG: &str = "/sdapi/v1/txt2img";
    /// Image-to-image generation (used whenever a canvas is present)
    pub const IMG2IMG: &str = "/sdapi/v1/img2img";
}

/// Extensions tried, in order, when an instruction names a file by index only
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp"];
