//! Image generation provider library
//!
//! This library provides a unified interface for image generation servers:
//! - **Draw Things**: HTTP API exposed by the Draw Things app (A1111-compatible)
//! - Any other server implementing [`GenerationProvider`]
//!
//! The workflow engine only ever talks to the trait; concrete providers own
//! transport, payload layout and image decoding.
//!
//! # Example
//!
//! ```rust,ignore
//! use generation::{DrawThingsProvider, GenerationProvider, GenerationRequest, ProviderConfig};
//!
//! let provider = DrawThingsProvider::new(&ProviderConfig::default())?;
//! if provider.check_connection().await {
//!     let request = GenerationRequest::new("a lighthouse at dusk");
//!     let images = provider.generate_image(&request, &|p| log::info!("{:.0}%", p * 100.0)).await?;
//! }
//! ```

pub mod backend;
pub mod config;
pub mod constants;
pub mod image_data;
pub mod types;

// Re-exports for convenience
pub use backend::{
    DrawThingsProvider, GenerationProvider, ProgressCallback, ProviderCapabilities, ProviderError,
};
pub use config::ProviderConfig;
pub use image_data::{ImageData, ImageError};
pub use types::{
    AssistOperation, AssistOutput, AssistRequest, CanvasTransform, GenerationConfig,
    GenerationRequest, LoraSpec, ReferenceImage,
};
