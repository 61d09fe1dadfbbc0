//! Draw Things provider implementation
//!
//! This provider talks to the HTTP API exposed by the Draw Things app
//! (Settings > API Server). The API follows the A1111 layout: text-to-image
//! and image-to-image endpoints that answer with base64-encoded PNGs.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{GenerationProvider, ProgressCallback, ProviderCapabilities, ProviderError};
use crate::config::ProviderConfig;
use crate::constants::{defaults, endpoints};
use crate::image_data::ImageData;
use crate::types::{GenerationRequest, LoraSpec};

/// Draw Things provider using the app's HTTP server
pub struct DrawThingsProvider {
    /// HTTP client for API requests
    http_client: reqwest::Client,
    /// Base URL without trailing slash
    base_url: String,
    /// Optional bearer token
    api_key: Option<String>,
}

/// Request body shared by the txt2img and img2img endpoints
#[derive(Debug, Serialize)]
struct GenerationPayload<'a> {
    prompt: &'a str,
    negative_prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    steps: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    guidance_scale: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sampler: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    strength: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    batch_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    batch_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    clip_skip: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    shift: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    loras: Option<&'a [LoraSpec]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    mask_blur: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    mask_blur_outset: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    preserve_original_after_inpaint: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_frames: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    init_images: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    canvas_transform: Option<TransformPayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    mask: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    moodboard: Vec<MoodboardPayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    depth_map: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pose: Option<&'a serde_json::Value>,
}

#[derive(Debug, Serialize)]
struct TransformPayload {
    x: f64,
    y: f64,
    scale: f64,
}

#[derive(Debug, Serialize)]
struct MoodboardPayload {
    image: String,
    weight: f64,
}

/// Response body of both generation endpoints
#[derive(Debug, Deserialize)]
struct GenerationResponse {
    #[serde(default)]
    images: Option<Vec<String>>,
}

impl DrawThingsProvider {
    /// Create a new provider for the configured server
    pub fn new(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ProviderError::ConnectionFailed(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: config.normalized_base_url().to_string(),
            api_key: config.api_key.clone(),
        })
    }

    /// Get static capabilities (for listing before instantiation)
    pub fn static_capabilities() -> ProviderCapabilities {
        ProviderCapabilities {
            img2img: true,
            inpainting: true,
            moodboard: true,
            assist: false,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    /// Pick the endpoint for a request
    fn endpoint_for(request: &GenerationRequest) -> &'static str {
        if request.is_img2img() {
            endpoints::IMG2IMG
        } else {
            endpoints::TXT2IMG
        }
    }

    /// Build the JSON body for a request
    fn build_payload(request: &GenerationRequest) -> GenerationPayload<'_> {
        let config = &request.config;
        let canvas_transform = (request.init_image.is_some()
            && !request.canvas_transform.is_identity())
        .then(|| TransformPayload {
            x: request.canvas_transform.x,
            y: request.canvas_transform.y,
            scale: request.canvas_transform.scale,
        });

        GenerationPayload {
            prompt: &request.prompt,
            negative_prompt: &request.negative_prompt,
            width: config.width,
            height: config.height,
            steps: config.steps,
            guidance_scale: config.guidance_scale,
            seed: config.seed,
            model: config.model.as_deref(),
            sampler: config.sampler.as_deref(),
            strength: config.strength,
            batch_count: config.batch_count,
            batch_size: config.batch_size,
            clip_skip: config.clip_skip,
            shift: config.shift,
            loras: config.loras.as_deref(),
            mask_blur: config.mask_blur,
            mask_blur_outset: config.mask_blur_outset,
            preserve_original_after_inpaint: config.preserve_original_after_inpaint,
            num_frames: config.num_frames,
            init_images: request
                .init_image
                .iter()
                .map(ImageData::to_base64)
                .collect(),
            canvas_transform,
            mask: request.mask.as_ref().map(ImageData::to_base64),
            moodboard: request
                .moodboard
                .iter()
                .map(|reference| MoodboardPayload {
                    image: reference.image.to_base64(),
                    weight: reference.weight,
                })
                .collect(),
            depth_map: request.depth_map.as_ref().map(ImageData::to_base64),
            pose: request.pose.as_ref(),
        }
    }

    /// Decode the images of a successful response body
    fn parse_images(body: &str) -> Result<Vec<ImageData>, ProviderError> {
        let response: GenerationResponse = serde_json::from_str(body)
            .map_err(|e| ProviderError::InvalidResponse(format!("malformed JSON: {}", e)))?;

        let encoded = response
            .images
            .filter(|images| !images.is_empty())
            .ok_or_else(|| ProviderError::InvalidResponse("response contains no images".into()))?;

        encoded
            .iter()
            .enumerate()
            .map(|(i, data)| {
                ImageData::from_base64(data)
                    .map_err(|e| ProviderError::ImageDecodingFailed(format!("image {}: {}", i, e)))
            })
            .collect()
    }
}

#[async_trait]
impl GenerationProvider for DrawThingsProvider {
    fn name(&self) -> &'static str {
        "Draw Things"
    }

    fn capabilities(&self) -> ProviderCapabilities {
        Self::static_capabilities()
    }

    async fn check_connection(&self) -> bool {
        let probe = self
            .authorized(self.http_client.get(self.url(endpoints::PROBE)))
            .timeout(Duration::from_secs(defaults::PROBE_TIMEOUT_SECS));

        match probe.send().await {
            Ok(resp) if resp.status().is_success() => {
                log::info!("Connected to {} at {}", self.name(), self.base_url);
                true
            }
            Ok(resp) => {
                log::warn!(
                    "{} at {} answered the probe with {}",
                    self.name(),
                    self.base_url,
                    resp.status()
                );
                false
            }
            Err(e) => {
                log::warn!("{} unreachable at {}: {}", self.name(), self.base_url, e);
                false
            }
        }
    }

    async fn generate_image(
        &self,
        request: &GenerationRequest,
        on_progress: &ProgressCallback<'_>,
    ) -> Result<Vec<ImageData>, ProviderError> {
        let endpoint = Self::endpoint_for(request);
        let payload = Self::build_payload(request);

        log::debug!(
            "POST {}{} ({} moodboard refs, mask: {})",
            self.base_url,
            endpoint,
            payload.moodboard.len(),
            payload.mask.is_some()
        );
        on_progress(0.0);

        let response = self
            .authorized(self.http_client.post(self.url(endpoint)))
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ProviderError::from_status(status.as_u16(), body));
        }

        let images = Self::parse_images(&body)?;
        on_progress(1.0);
        Ok(images)
    }
}
