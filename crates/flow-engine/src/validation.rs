//! Pre-run validation of instruction sequences
//!
//! Validation never touches pipeline state or the filesystem, so it is safe
//! to call after every edit. Errors mean the run is guaranteed to misbehave;
//! warnings flag constructs that run but are easy to get wrong.

use std::collections::HashMap;
use std::path::Path;

use serde::Serialize;

use crate::instruction::Instruction;
use crate::support::{classify, SupportLevel};

/// Blocking problem at a position in the sequence
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ValidationError {
    /// A `loop` with no matching `loopEnd`
    UnmatchedLoop { index: usize },
    /// A `loopEnd` with no open `loop`
    StrayLoopEnd { index: usize },
    /// A loop-scoped instruction outside any loop
    OutsideLoop { index: usize, key: &'static str },
    /// A save target that would not be written as PNG
    NotPng { index: usize, filename: String },
    /// A generation trigger with no prompt, canvas or moodboard to work from
    NothingToRender { index: usize },
}

impl ValidationError {
    pub fn index(&self) -> usize {
        match self {
            Self::UnmatchedLoop { index }
            | Self::StrayLoopEnd { index }
            | Self::OutsideLoop { index, .. }
            | Self::NotPng { index, .. }
            | Self::NothingToRender { index } => *index,
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnmatchedLoop { index } => {
                write!(f, "#{}: loop is never closed by a loopEnd", index)
            }
            Self::StrayLoopEnd { index } => {
                write!(f, "#{}: loopEnd has no open loop", index)
            }
            Self::OutsideLoop { index, key } => {
                write!(f, "#{}: {} can only be used inside a loop", index, key)
            }
            Self::NotPng { index, filename } => {
                write!(f, "#{}: '{}' must be saved as a .png file", index, filename)
            }
            Self::NothingToRender { index } => write!(
                f,
                "#{}: generation with an empty prompt and no canvas or moodboard",
                index
            ),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Non-blocking finding
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ValidationWarning {
    /// Will be skipped at runtime
    Unsupported { index: usize, key: &'static str },
    /// `config` after a generation in the same loop body, with no new prompt
    ConfigAfterGeneration { index: usize },
    /// `moodboardWeights` names an index past the end of the moodboard
    WeightIndexOutOfRange {
        index: usize,
        weight_index: usize,
        moodboard_len: usize,
    },
    /// `loop` whose body never runs
    ZeroCountLoop { index: usize },
}

impl ValidationWarning {
    pub fn index(&self) -> usize {
        match self {
            Self::Unsupported { index, .. }
            | Self::ConfigAfterGeneration { index }
            | Self::WeightIndexOutOfRange { index, .. }
            | Self::ZeroCountLoop { index } => *index,
        }
    }
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unsupported { index, key } => {
                write!(f, "#{}: {} is not supported and will be skipped", index, key)
            }
            Self::ConfigAfterGeneration { index } => write!(
                f,
                "#{}: config after a generation in this loop only applies from the next iteration",
                index
            ),
            Self::WeightIndexOutOfRange {
                index,
                weight_index,
                moodboard_len,
            } => write!(
                f,
                "#{}: moodboard weight index {} but the moodboard holds {} image(s)",
                index, weight_index, moodboard_len
            ),
            Self::ZeroCountLoop { index } => {
                write!(f, "#{}: loop count is 0, its body never runs", index)
            }
        }
    }
}

/// Result of a validation pass
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

impl std::fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let messages: Vec<String> = self.errors.iter().map(ToString::to_string).collect();
        write!(f, "{} validation error(s): {}", self.errors.len(), messages.join("; "))
    }
}

/// Matched `loop`/`loopEnd` positions
#[derive(Debug, Clone, Default)]
pub struct LoopMatching {
    /// `loop` index to its `loopEnd` index
    pub pairs: HashMap<usize, usize>,
    pub unmatched_loops: Vec<usize>,
    pub stray_ends: Vec<usize>,
}

impl LoopMatching {
    pub fn end_of(&self, loop_index: usize) -> Option<usize> {
        self.pairs.get(&loop_index).copied()
    }
}

/// Pair every `loop` with the `loopEnd` that closes it
pub fn match_loops<I: AsRef<Instruction>>(instructions: &[I]) -> LoopMatching {
    let mut matching = LoopMatching::default();
    let mut open = Vec::new();

    for (index, instruction) in instructions.iter().enumerate() {
        match instruction.as_ref() {
            Instruction::Loop { .. } => open.push(index),
            Instruction::LoopEnd => match open.pop() {
                Some(start) => {
                    matching.pairs.insert(start, index);
                }
                None => matching.stray_ends.push(index),
            },
            _ => {}
        }
    }

    matching.unmatched_loops = open;
    matching
}

/// Validate an instruction sequence
///
/// Returns every problem found, not just the first.
pub fn validate<I: AsRef<Instruction>>(instructions: &[I]) -> ValidationReport {
    let instructions: Vec<&Instruction> = instructions.iter().map(AsRef::as_ref).collect();
    let mut report = ValidationReport::default();

    check_loop_balance(&instructions, &mut report);
    check_loop_scope(&instructions, &mut report);
    check_save_targets(&instructions, &mut report);
    check_render_inputs(&instructions, &mut report);
    check_support(&instructions, &mut report);
    check_config_after_generation(&instructions, &mut report);
    check_moodboard_weights(&instructions, &mut report);

    report.errors.sort_by_key(ValidationError::index);
    report.warnings.sort_by_key(ValidationWarning::index);
    report
}

fn check_loop_balance(instructions: &[&Instruction], report: &mut ValidationReport) {
    let matching = match_loops(instructions);
    report.errors.extend(
        matching
            .unmatched_loops
            .iter()
            .map(|&index| ValidationError::UnmatchedLoop { index }),
    );
    report.errors.extend(
        matching
            .stray_ends
            .iter()
            .map(|&index| ValidationError::StrayLoopEnd { index }),
    );

    for (index, instruction) in instructions.iter().enumerate() {
        if let Instruction::Loop { count: 0, .. } = instruction {
            report.warnings.push(ValidationWarning::ZeroCountLoop { index });
        }
    }
}

fn check_loop_scope(instructions: &[&Instruction], report: &mut ValidationReport) {
    let mut depth = 0usize;
    for (index, instruction) in instructions.iter().enumerate() {
        match instruction {
            Instruction::Loop { .. } => depth += 1,
            Instruction::LoopEnd => depth = depth.saturating_sub(1),
            other if other.is_loop_scoped() && depth == 0 => {
                report.errors.push(ValidationError::OutsideLoop {
                    index,
                    key: other.key(),
                });
            }
            _ => {}
        }
    }
}

fn has_png_extension(filename: &str) -> bool {
    Path::new(filename)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("png"))
}

fn check_save_targets(instructions: &[&Instruction], report: &mut ValidationReport) {
    for (index, instruction) in instructions.iter().enumerate() {
        let bad = match instruction {
            Instruction::CanvasSave { filename } => {
                (!has_png_extension(filename)).then(|| filename.clone())
            }
            // A bare prefix gets ".png" appended; an explicit extension must be png.
            Instruction::LoopSave { prefix } => {
                let has_other_extension = Path::new(prefix)
                    .extension()
                    .is_some_and(|ext| !ext.is_empty() && !ext.eq_ignore_ascii_case("png"));
                (prefix.is_empty() || has_other_extension).then(|| prefix.clone())
            }
            _ => None,
        };
        if let Some(filename) = bad {
            report.errors.push(ValidationError::NotPng { index, filename });
        }
    }
}

fn check_render_inputs(instructions: &[&Instruction], report: &mut ValidationReport) {
    let mut has_prompt = false;
    let mut has_canvas = false;
    let mut has_moodboard = false;

    for (index, instruction) in instructions.iter().enumerate() {
        match instruction {
            Instruction::Prompt { text } => has_prompt = !text.trim().is_empty(),
            Instruction::CanvasLoad { .. }
            | Instruction::LoopLoad { .. }
            | Instruction::DepthToCanvas => has_canvas = true,
            Instruction::CanvasClear => has_canvas = false,
            Instruction::MoodboardAdd { .. } | Instruction::LoopAddMoodboard { .. } => {
                has_moodboard = true
            }
            Instruction::MoodboardCanvas => has_moodboard |= has_canvas,
            Instruction::MoodboardClear => has_moodboard = false,
            trigger if trigger.is_generation_trigger() => {
                if !has_prompt && !has_canvas && !has_moodboard {
                    report
                        .errors
                        .push(ValidationError::NothingToRender { index });
                } else {
                    has_canvas = true;
                }
            }
            _ => {}
        }
    }
}

fn check_support(instructions: &[&Instruction], report: &mut ValidationReport) {
    for (index, instruction) in instructions.iter().enumerate() {
        if classify(instruction) == SupportLevel::Unsupported {
            report.warnings.push(ValidationWarning::Unsupported {
                index,
                key: instruction.key(),
            });
        }
    }
}

fn check_config_after_generation(instructions: &[&Instruction], report: &mut ValidationReport) {
    // One flag per open loop body: a generation happened since the last prompt
    let mut generated = Vec::<bool>::new();

    for (index, instruction) in instructions.iter().enumerate() {
        match instruction {
            Instruction::Loop { .. } => generated.push(false),
            Instruction::LoopEnd => {
                generated.pop();
            }
            Instruction::Prompt { .. } => {
                if let Some(flag) = generated.last_mut() {
                    *flag = false;
                }
            }
            Instruction::Config(_) => {
                if generated.last() == Some(&true) {
                    report
                        .warnings
                        .push(ValidationWarning::ConfigAfterGeneration { index });
                }
            }
            trigger if trigger.is_generation_trigger() => {
                if let Some(flag) = generated.last_mut() {
                    *flag = true;
                }
            }
            _ => {}
        }
    }
}

fn check_moodboard_weights(instructions: &[&Instruction], report: &mut ValidationReport) {
    // Entries added inside a loop body are counted once; that is the minimum
    // the moodboard holds on the first iteration.
    let mut len = 0usize;

    for (index, instruction) in instructions.iter().enumerate() {
        match instruction {
            Instruction::MoodboardAdd { .. }
            | Instruction::MoodboardCanvas
            | Instruction::LoopAddMoodboard { .. } => len += 1,
            Instruction::MoodboardRemove { .. } => len = len.saturating_sub(1),
            Instruction::MoodboardClear => len = 0,
            Instruction::MoodboardWeights { weights } => {
                for &weight_index in weights.keys() {
                    if weight_index >= len {
                        report.warnings.push(ValidationWarning::WeightIndexOutOfRange {
                            index,
                            weight_index,
                            moodboard_len: len,
                        });
                    }
                }
            }
            _ => {}
        }
    }
}
