//! Pluggable generation provider abstraction
//!
//! This module provides a trait-based abstraction over image generation
//! servers. All providers implement the same interface, so the workflow
//! engine never needs to know which server renders its images.

pub mod draw_things;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::image_data::ImageData;
use crate::types::{AssistOutput, AssistRequest, GenerationRequest};

pub use draw_things::DrawThingsProvider;

/// Progress callback invoked with values in `0.0..=1.0`
///
/// The lifetime lets callers pass closures that borrow from the caller's
/// frame, such as an event sink.
pub type ProgressCallback<'a> = dyn Fn(f32) + Send + Sync + 'a;

/// Error types for provider operations
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProviderError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Authentication rejected: {0}")]
    Unauthorized(String),

    #[error("Request failed with status {status_code}: {body}")]
    RequestFailed { status_code: u16, body: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Image decoding failed: {0}")]
    ImageDecodingFailed(String),

    #[error("Not supported by provider: {0}")]
    Unsupported(String),

    #[error("Request cancelled")]
    Cancelled,
}

impl ProviderError {
    /// Whether this error should abort the whole run
    ///
    /// Only an unreachable provider or rejected credentials are fatal;
    /// everything else is a failure of the single instruction that triggered
    /// the call.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ConnectionFailed(_) | Self::Unauthorized(_))
    }

    /// Error for a non-success HTTP status
    pub fn from_status(status_code: u16, body: String) -> Self {
        match status_code {
            401 | 403 => Self::Unauthorized(format!("status {}: {}", status_code, body)),
            _ => Self::RequestFailed { status_code, body },
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() {
            Self::ConnectionFailed(err.to_string())
        } else if let Some(status) = err.status() {
            Self::from_status(status.as_u16(), err.to_string())
        } else {
            Self::InvalidResponse(err.to_string())
        }
    }
}

/// Capabilities that a provider may or may not support
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderCapabilities {
    /// Accepts a canvas for image-to-image
    pub img2img: bool,
    /// Accepts an inpainting mask
    pub inpainting: bool,
    /// Accepts weighted moodboard references
    pub moodboard: bool,
    /// Implements [`GenerationProvider::assist`]
    pub assist: bool,
}

/// The core trait that all generation providers must implement.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Human-readable name for logs
    fn name(&self) -> &'static str;

    /// What this provider supports
    fn capabilities(&self) -> ProviderCapabilities;

    /// Liveness probe, used before a run starts
    async fn check_connection(&self) -> bool;

    /// Render one or more images for the request
    async fn generate_image(
        &self,
        request: &GenerationRequest,
        on_progress: &ProgressCallback<'_>,
    ) -> Result<Vec<ImageData>, ProviderError>;

    /// Run an assisted operation (masking, depth, pose, zoom) remotely
    ///
    /// Providers without such models keep the default, which reports the
    /// operation as unsupported.
    async fn assist(&self, request: &AssistRequest) -> Result<AssistOutput, ProviderError> {
        Err(ProviderError::Unsupported(
            request.operation.label().to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_connection_failures_are_fatal() {
        assert!(ProviderError::ConnectionFailed("refused".into()).is_fatal());
        assert!(!ProviderError::RequestFailed {
            status_code: 422,
            body: "bad sampler".into()
        }
        .is_fatal());
        assert!(!ProviderError::InvalidResponse("no images".into()).is_fatal());
        assert!(!ProviderError::ImageDecodingFailed("truncated".into()).is_fatal());
        assert!(!ProviderError::Unsupported("depth extraction".into()).is_fatal());
        assert!(!ProviderError::Cancelled.is_fatal());
    }

    #[test]
    fn test_rejected_credentials_are_fatal() {
        for status in [401, 403] {
            let err = ProviderError::from_status(status, "invalid token".into());
            assert!(matches!(err, ProviderError::Unauthorized(_)));
            assert!(err.is_fatal());
        }
        let err = ProviderError::from_status(422, "unknown sampler".into());
        assert_eq!(
            err,
            ProviderError::RequestFailed {
                status_code: 422,
                body: "unknown sampler".into()
            }
        );
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_error_messages() {
        let err = ProviderError::RequestFailed {
            status_code: 500,
            body: "out of memory".into(),
        };
        assert_eq!(err.to_string(), "Request failed with status 500: out of memory");
    }
}
