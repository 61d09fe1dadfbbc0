//! Request and configuration types shared by all providers

use serde::{Deserialize, Serialize};

use crate::image_data::ImageData;

/// A LoRA adapter applied during generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoraSpec {
    /// LoRA file name as known to the server
    pub file: String,
    /// Blend weight (1.0 = full strength)
    pub weight: f64,
}

/// Generation settings
///
/// Every field is optional: an unset field means "use the provider's
/// default". Successive partial configurations are combined with
/// [`GenerationConfig::merge`], which only overwrites the fields the newer
/// configuration sets.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub steps: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guidance_scale: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sampler: Option<String>,
    /// Denoising strength for image-to-image (0.0 - 1.0)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strength: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clip_skip: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shift: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loras: Option<Vec<LoraSpec>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mask_blur: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mask_blur_outset: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preserve_original_after_inpaint: Option<bool>,
    /// Number of video frames (video-capable models only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_frames: Option<u32>,
}

macro_rules! merge_fields {
    ($target:ident, $patch:ident, $($field:ident),+ $(,)?) => {
        $(
            if let Some(value) = &$patch.$field {
                $target.$field = Some(value.clone());
            }
        )+
    };
}

impl GenerationConfig {
    /// Overwrite the fields that `patch` sets, leaving the others untouched
    pub fn merge(&mut self, patch: &GenerationConfig) {
        merge_fields!(
            self,
            patch,
            width,
            height,
            steps,
            guidance_scale,
            seed,
            model,
            sampler,
            strength,
            batch_count,
            batch_size,
            clip_skip,
            shift,
            loras,
            mask_blur,
            mask_blur_outset,
            preserve_original_after_inpaint,
            num_frames,
        );
    }

    /// Return a copy of `self` with `patch` merged on top
    pub fn merged(&self, patch: &GenerationConfig) -> GenerationConfig {
        let mut merged = self.clone();
        merged.merge(patch);
        merged
    }

    /// True when no field is set
    pub fn is_empty(&self) -> bool {
        *self == GenerationConfig::default()
    }
}

/// Placement of the canvas image inside the generation frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CanvasTransform {
    pub x: f64,
    pub y: f64,
    pub scale: f64,
}

impl Default for CanvasTransform {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            scale: 1.0,
        }
    }
}

impl CanvasTransform {
    pub fn is_identity(&self) -> bool {
        *self == CanvasTransform::default()
    }
}

/// A weighted moodboard reference sent along with a generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceImage {
    pub image: ImageData,
    pub weight: f64,
}

/// Everything a provider needs to render one generation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    pub prompt: String,
    pub negative_prompt: String,
    pub config: GenerationConfig,
    /// Current canvas; when present the provider runs image-to-image
    pub init_image: Option<ImageData>,
    pub canvas_transform: CanvasTransform,
    pub mask: Option<ImageData>,
    pub moodboard: Vec<ReferenceImage>,
    pub depth_map: Option<ImageData>,
    pub pose: Option<serde_json::Value>,
}

impl GenerationRequest {
    /// Create a text-only request with default settings
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Self::default()
        }
    }

    /// Whether the request carries a canvas (image-to-image)
    pub fn is_img2img(&self) -> bool {
        self.init_image.is_some()
    }
}

/// Operations that need a model the local engine does not have
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum AssistOperation {
    MaskBackground,
    MaskForeground,
    #[serde(rename_all = "camelCase")]
    MaskBody {
        upper: bool,
        lower: bool,
        clothes: bool,
        neck: bool,
    },
    MaskAsk {
        description: String,
    },
    DepthExtract,
    PoseExtract,
    RemoveBackground,
    FaceZoom,
    AskZoom {
        description: String,
    },
}

impl AssistOperation {
    /// Short human-readable name used in logs and error messages
    pub fn label(&self) -> &'static str {
        match self {
            Self::MaskBackground => "background mask",
            Self::MaskForeground => "foreground mask",
            Self::MaskBody { .. } => "body mask",
            Self::MaskAsk { .. } => "described mask",
            Self::DepthExtract => "depth extraction",
            Self::PoseExtract => "pose extraction",
            Self::RemoveBackground => "background removal",
            Self::FaceZoom => "face zoom",
            Self::AskZoom { .. } => "described zoom",
        }
    }
}

/// Request for an assisted operation on the current canvas
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssistRequest {
    pub operation: AssistOperation,
    pub canvas: Option<ImageData>,
}

/// Result of an assisted operation
#[derive(Debug, Clone, PartialEq)]
pub enum AssistOutput {
    Image(ImageData),
    Pose(serde_json::Value),
}
