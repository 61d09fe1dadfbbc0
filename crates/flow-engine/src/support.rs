//! How faithfully each instruction runs without the editor
//!
//! This table is the only place support levels are decided; the validator
//! and the executor both call [`classify`].

use serde::{Deserialize, Serialize};

use crate::instruction::Instruction;

/// Support level of an instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SupportLevel {
    /// Pure state mutation, emulated exactly
    Full,
    /// Forwarded to the provider; only as good as its support for it
    Partial,
    /// No local effect and no remote equivalent; always skipped
    Unsupported,
}

impl SupportLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Partial => "partial",
            Self::Unsupported => "unsupported",
        }
    }
}

impl std::fmt::Display for SupportLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify an instruction
pub fn classify(instruction: &Instruction) -> SupportLevel {
    use Instruction::*;

    match instruction {
        MaskBackground | MaskForeground | MaskBody(_) | MaskAsk { .. } | DepthExtract
        | PoseExtract | RemoveBackground | FaceZoom | AskZoom { .. } => SupportLevel::Partial,

        XlMagic(_) => SupportLevel::Unsupported,

        Note { .. } | Loop { .. } | LoopEnd | End | Prompt { .. } | NegativePrompt { .. }
        | Config(_) | Frames { .. } | CanvasClear | CanvasLoad { .. } | CanvasSave { .. }
        | MoveScale { .. } | AdaptSize { .. } | Crop | MoodboardClear | MoodboardCanvas
        | MoodboardAdd { .. } | MoodboardRemove { .. } | MoodboardWeights { .. }
        | LoopAddMoodboard { .. } | MaskClear | MaskLoad { .. } | MaskGet | DepthCanvas
        | DepthToCanvas | PoseJson { .. } | InpaintTools(_) | LoopLoad { .. }
        | LoopSave { .. } | Generate => SupportLevel::Full,
    }
}
