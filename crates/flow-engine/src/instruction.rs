//! Instruction model
//!
//! A workflow is an ordered list of [`Instruction`]s. Instructions are plain
//! data: they carry typed parameters and presentation metadata, and nothing
//! else. All behavior lives in the executor.

use std::collections::BTreeMap;

use generation::GenerationConfig;
use serde::{Deserialize, Serialize};

/// Which body regions `maskBody` should cover
///
/// Unset flags fall back to the provider's defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BodyMask {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upper: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lower: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clothes: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub neck: Option<bool>,
}

/// Inpainting adjustments folded into the generation settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct InpaintTools {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strength: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mask_blur: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mask_blur_outset: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restore_original: Option<bool>,
}

/// Parameters of the `xlMagic` refiner pass
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct XlMagic {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub negative: Option<f64>,
}

/// One step of a workflow
///
/// The set is closed; the wire form of every variant is produced and parsed
/// in [`crate::wire`].
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    // Flow control
    Note { text: String },
    Loop { count: u32, start: u32 },
    LoopEnd,
    End,

    // Prompt and settings
    Prompt { text: String },
    NegativePrompt { text: String },
    Config(GenerationConfig),
    Frames { count: u32 },

    // Canvas
    CanvasClear,
    CanvasLoad { filename: String },
    CanvasSave { filename: String },
    MoveScale { x: f64, y: f64, scale: f64 },
    AdaptSize { max_width: u32, max_height: u32 },
    Crop,

    // Moodboard
    MoodboardClear,
    MoodboardCanvas,
    MoodboardAdd { filename: String },
    MoodboardRemove { index: usize },
    MoodboardWeights { weights: BTreeMap<usize, f64> },
    LoopAddMoodboard { folder: String },

    // Mask
    MaskClear,
    MaskLoad { filename: String },
    MaskGet,
    MaskBackground,
    MaskForeground,
    MaskBody(BodyMask),
    MaskAsk { description: String },

    // Advanced
    DepthExtract,
    DepthCanvas,
    DepthToCanvas,
    PoseExtract,
    PoseJson { data: serde_json::Value },
    RemoveBackground,
    FaceZoom,
    AskZoom { description: String },
    InpaintTools(InpaintTools),
    XlMagic(XlMagic),

    // Loop-scoped I/O
    LoopLoad { folder: String },
    LoopSave { prefix: String },

    Generate,
}

impl Instruction {
    /// Stable wire key
    pub fn key(&self) -> &'static str {
        match self {
            Self::Note { .. } => "note",
            Self::Loop { .. } => "loop",
            Self::LoopEnd => "loopEnd",
            Self::End => "end",
            Self::Prompt { .. } => "prompt",
            Self::NegativePrompt { .. } => "negativePrompt",
            Self::Config(_) => "config",
            Self::Frames { .. } => "frames",
            Self::CanvasClear => "canvasClear",
            Self::CanvasLoad { .. } => "canvasLoad",
            Self::CanvasSave { .. } => "canvasSave",
            Self::MoveScale { .. } => "moveScale",
            Self::AdaptSize { .. } => "adaptSize",
            Self::Crop => "crop",
            Self::MoodboardClear => "moodboardClear",
            Self::MoodboardCanvas => "moodboardCanvas",
            Self::MoodboardAdd { .. } => "moodboardAdd",
            Self::MoodboardRemove { .. } => "moodboardRemove",
            Self::MoodboardWeights { .. } => "moodboardWeights",
            Self::LoopAddMoodboard { .. } => "loopAddMB",
            Self::MaskClear => "maskClear",
            Self::MaskLoad { .. } => "maskLoad",
            Self::MaskGet => "maskGet",
            Self::MaskBackground => "maskBackground",
            Self::MaskForeground => "maskForeground",
            Self::MaskBody(_) => "maskBody",
            Self::MaskAsk { .. } => "maskAsk",
            Self::DepthExtract => "depthExtract",
            Self::DepthCanvas => "depthCanvas",
            Self::DepthToCanvas => "depthToCanvas",
            Self::PoseExtract => "poseExtract",
            Self::PoseJson { .. } => "poseJSON",
            Self::RemoveBackground => "removeBackground",
            Self::FaceZoom => "faceZoom",
            Self::AskZoom { .. } => "askZoom",
            Self::InpaintTools(_) => "inpaintTools",
            Self::XlMagic(_) => "xlMagic",
            Self::LoopLoad { .. } => "loopLoad",
            Self::LoopSave { .. } => "loopSave",
            Self::Generate => "generate",
        }
    }

    /// Display title for editors and run reports
    pub fn title(&self) -> &'static str {
        match self {
            Self::Note { .. } => "Note",
            Self::Loop { .. } => "Loop",
            Self::LoopEnd => "End Loop",
            Self::End => "End",
            Self::Prompt { .. } => "Prompt",
            Self::NegativePrompt { .. } => "Negative Prompt",
            Self::Config(_) => "Configuration",
            Self::Frames { .. } => "Frames",
            Self::CanvasClear => "Clear Canvas",
            Self::CanvasLoad { .. } => "Load Canvas",
            Self::CanvasSave { .. } => "Save Canvas",
            Self::MoveScale { .. } => "Move & Scale",
            Self::AdaptSize { .. } => "Adapt Size",
            Self::Crop => "Crop",
            Self::MoodboardClear => "Clear Moodboard",
            Self::MoodboardCanvas => "Canvas to Moodboard",
            Self::MoodboardAdd { .. } => "Add to Moodboard",
            Self::MoodboardRemove { .. } => "Remove from Moodboard",
            Self::MoodboardWeights { .. } => "Moodboard Weights",
            Self::LoopAddMoodboard { .. } => "Loop Add to Moodboard",
            Self::MaskClear => "Clear Mask",
            Self::MaskLoad { .. } => "Load Mask",
            Self::MaskGet => "Mask from Canvas",
            Self::MaskBackground => "Mask Background",
            Self::MaskForeground => "Mask Foreground",
            Self::MaskBody(_) => "Mask Body",
            Self::MaskAsk { .. } => "Ask for Mask",
            Self::DepthExtract => "Extract Depth",
            Self::DepthCanvas => "Canvas to Depth",
            Self::DepthToCanvas => "Depth to Canvas",
            Self::PoseExtract => "Extract Pose",
            Self::PoseJson { .. } => "Pose from JSON",
            Self::RemoveBackground => "Remove Background",
            Self::FaceZoom => "Face Zoom",
            Self::AskZoom { .. } => "Ask Zoom",
            Self::InpaintTools(_) => "Inpaint Tools",
            Self::XlMagic(_) => "XL Magic",
            Self::LoopLoad { .. } => "Loop Load",
            Self::LoopSave { .. } => "Loop Save",
            Self::Generate => "Generate",
        }
    }

    /// Icon name (presentation only, passed through to the log)
    pub fn icon(&self) -> &'static str {
        match self {
            Self::Note { .. } => "note",
            Self::Loop { .. } | Self::LoopEnd => "repeat",
            Self::End => "stop",
            Self::Prompt { .. } | Self::NegativePrompt { .. } => "text",
            Self::Config(_) | Self::Frames { .. } | Self::InpaintTools(_) | Self::XlMagic(_) => {
                "sliders"
            }
            Self::CanvasClear
            | Self::CanvasLoad { .. }
            | Self::CanvasSave { .. }
            | Self::MoveScale { .. }
            | Self::AdaptSize { .. }
            | Self::Crop => "canvas",
            Self::MoodboardClear
            | Self::MoodboardCanvas
            | Self::MoodboardAdd { .. }
            | Self::MoodboardRemove { .. }
            | Self::MoodboardWeights { .. }
            | Self::LoopAddMoodboard { .. } => "moodboard",
            Self::MaskClear
            | Self::MaskLoad { .. }
            | Self::MaskGet
            | Self::MaskBackground
            | Self::MaskForeground
            | Self::MaskBody(_)
            | Self::MaskAsk { .. } => "mask",
            Self::DepthExtract | Self::DepthCanvas | Self::DepthToCanvas => "depth",
            Self::PoseExtract | Self::PoseJson { .. } => "pose",
            Self::RemoveBackground | Self::FaceZoom | Self::AskZoom { .. } => "wand",
            Self::LoopLoad { .. } | Self::LoopSave { .. } => "folder",
            Self::Generate => "sparkles",
        }
    }

    /// Loop bookkeeping and annotations; logged but not counted
    pub fn is_control_flow(&self) -> bool {
        matches!(
            self,
            Self::Note { .. } | Self::Loop { .. } | Self::LoopEnd | Self::End
        )
    }

    /// Needs an open loop frame to compute its iteration-indexed path
    pub fn is_loop_scoped(&self) -> bool {
        matches!(
            self,
            Self::LoopLoad { .. } | Self::LoopSave { .. } | Self::LoopAddMoodboard { .. }
        )
    }

    /// May call the provider's `generate_image`
    pub fn is_generation_trigger(&self) -> bool {
        matches!(
            self,
            Self::Generate | Self::CanvasSave { .. } | Self::LoopSave { .. }
        )
    }
}

/// An instruction with its editor identity
///
/// The id only exists for selection in editors; two entries with the same
/// instruction compare equal regardless of id.
#[derive(Debug, Clone)]
pub struct WorkflowInstruction {
    pub id: String,
    pub instruction: Instruction,
}

impl WorkflowInstruction {
    pub fn new(instruction: Instruction) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            instruction,
        }
    }

    pub fn with_id(id: impl Into<String>, instruction: Instruction) -> Self {
        Self {
            id: id.into(),
            instruction,
        }
    }
}

impl PartialEq for WorkflowInstruction {
    fn eq(&self, other: &Self) -> bool {
        self.instruction == other.instruction
    }
}

impl AsRef<Instruction> for WorkflowInstruction {
    fn as_ref(&self) -> &Instruction {
        &self.instruction
    }
}

impl AsRef<Instruction> for Instruction {
    fn as_ref(&self) -> &Instruction {
        self
    }
}

impl From<Instruction> for WorkflowInstruction {
    fn from(instruction: Instruction) -> Self {
        Self::new(instruction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equality_ignores_identity() {
        let a = WorkflowInstruction::new(Instruction::Generate);
        let b = WorkflowInstruction::new(Instruction::Generate);
        assert_ne!(a.id, b.id);
        assert_eq!(a, b);
        assert_ne!(a, WorkflowInstruction::new(Instruction::Crop));
    }

    #[test]
    fn test_keys_match_wire_protocol() {
        assert_eq!(Instruction::LoopAddMoodboard { folder: "f".into() }.key(), "loopAddMB");
        assert_eq!(Instruction::PoseJson { data: serde_json::json!({}) }.key(), "poseJSON");
        assert_eq!(Instruction::LoopEnd.key(), "loopEnd");
    }

    #[test]
    fn test_classification_helpers() {
        assert!(Instruction::Loop { count: 1, start: 0 }.is_control_flow());
        assert!(Instruction::Note { text: String::new() }.is_control_flow());
        assert!(!Instruction::Generate.is_control_flow());

        assert!(Instruction::LoopSave { prefix: "v_".into() }.is_loop_scoped());
        assert!(!Instruction::CanvasSave { filename: "a.png".into() }.is_loop_scoped());

        assert!(Instruction::CanvasSave { filename: "a.png".into() }.is_generation_trigger());
        assert!(!Instruction::CanvasLoad { filename: "a.png".into() }.is_generation_trigger());
    }

    #[test]
    fn test_metadata_is_populated() {
        let instruction = Instruction::MoveScale {
            x: 0.0,
            y: 0.0,
            scale: 1.0,
        };
        assert_eq!(instruction.title(), "Move & Scale");
        assert_eq!(instruction.icon(), "canvas");
    }
}
