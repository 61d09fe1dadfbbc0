//! Pipeline state owned by a single run

use generation::{CanvasTransform, GenerationConfig, GenerationRequest, ImageData, ReferenceImage};
use serde_json::Value;

/// A moodboard reference and its weight
#[derive(Debug, Clone, PartialEq)]
pub struct MoodboardEntry {
    pub image: ImageData,
    pub weight: f64,
}

impl MoodboardEntry {
    pub fn new(image: ImageData) -> Self {
        Self { image, weight: 1.0 }
    }
}

/// Runtime record of an open loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopFrame {
    /// Index of the `loop` instruction
    pub start_pc: usize,
    pub start: u32,
    pub count: u32,
    pub current_iteration: u32,
}

impl LoopFrame {
    pub fn new(start_pc: usize, start: u32, count: u32) -> Self {
        Self {
            start_pc,
            start,
            count,
            current_iteration: start,
        }
    }

    /// Move to the next iteration; false once `[start, start + count)` is done
    pub fn advance(&mut self) -> bool {
        let end = u64::from(self.start) + u64::from(self.count);
        let next = u64::from(self.current_iteration) + 1;
        // Iterations past u32::MAX are not representable and end the loop
        match u32::try_from(next) {
            Ok(next_iteration) if next < end => {
                self.current_iteration = next_iteration;
                true
            }
            _ => false,
        }
    }
}

/// Everything a run mutates
#[derive(Debug, Clone, Default)]
pub struct PipelineState {
    pub canvas: Option<ImageData>,
    pub canvas_transform: CanvasTransform,
    pub moodboard: Vec<MoodboardEntry>,
    /// Same dimensions as the canvas when both are present
    pub mask: Option<ImageData>,
    pub depth_map: Option<ImageData>,
    pub pose: Option<Value>,
    pub config: GenerationConfig,
    pub positive_prompt: String,
    pub negative_prompt: String,
    pub loop_stack: Vec<LoopFrame>,
    pub program_counter: usize,
    /// A generation already happened in the current logical step
    pub generated_in_step: bool,
}

impl PipelineState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear the control state while keeping images, prompts and settings
    pub fn rewind(&mut self) {
        self.loop_stack.clear();
        self.program_counter = 0;
        self.generated_in_step = false;
    }

    /// Iteration of the innermost open loop
    pub fn current_iteration(&self) -> Option<u32> {
        self.loop_stack.last().map(|frame| frame.current_iteration)
    }

    /// Start a new logical step: the next save generates again
    pub fn begin_step(&mut self) {
        self.generated_in_step = false;
    }

    /// Something to render from or with
    pub fn has_render_input(&self) -> bool {
        !self.positive_prompt.trim().is_empty() || self.canvas.is_some() || !self.moodboard.is_empty()
    }

    /// Replace the canvas, dropping a mask whose size no longer matches
    pub fn set_canvas(&mut self, canvas: ImageData) {
        if let Some(mask) = &self.mask {
            if mask.dimensions() != canvas.dimensions() {
                log::warn!(
                    "Dropping {}x{} mask: the canvas is now {}x{}",
                    mask.width(),
                    mask.height(),
                    canvas.width(),
                    canvas.height()
                );
                self.mask = None;
            }
        }
        self.canvas = Some(canvas);
    }

    /// Replace the mask, checking it against the canvas
    pub fn set_mask(&mut self, mask: ImageData) -> Result<(), String> {
        if let Some(canvas) = &self.canvas {
            if canvas.dimensions() != mask.dimensions() {
                return Err(format!(
                    "mask is {}x{} but the canvas is {}x{}",
                    mask.width(),
                    mask.height(),
                    canvas.width(),
                    canvas.height()
                ));
            }
        }
        self.mask = Some(mask);
        Ok(())
    }

    /// Assemble the provider request from the current state
    pub fn generation_request(&self) -> GenerationRequest {
        GenerationRequest {
            prompt: self.positive_prompt.clone(),
            negative_prompt: self.negative_prompt.clone(),
            config: self.config.clone(),
            init_image: self.canvas.clone(),
            canvas_transform: self.canvas_transform,
            mask: self.mask.clone(),
            moodboard: self
                .moodboard
                .iter()
                .map(|entry| ReferenceImage {
                    image: entry.image.clone(),
                    weight: entry.weight,
                })
                .collect(),
            depth_map: self.depth_map.clone(),
            pose: self.pose.clone(),
        }
    }
}
