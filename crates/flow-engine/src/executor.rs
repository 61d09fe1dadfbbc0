//! Workflow executor.
//!
//! Walks an instruction list under a program counter, mutating a
//! [`PipelineState`] and calling the generation provider at trigger points.
//! A run never returns an error once it has started: every problem becomes a
//! log entry, and only an unreachable provider, rejected credentials or
//! cancellation stop it early.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use generation::{
    AssistOperation, AssistOutput, AssistRequest, GenerationConfig, GenerationProvider, ImageData,
    ImageError, ProviderError,
};
use parking_lot::RwLock;

use crate::cancel::CancelHandle;
use crate::error::{EngineError, Result};
use crate::events::{EventSink, ExecutionEvent};
use crate::instruction::{BodyMask, Instruction, WorkflowInstruction};
use crate::result::{
    millis, ExecutionLog, ExecutionResult, ExecutionStatus, InstructionOutcome, LogEntry,
    OutcomeKind, ProducedImage,
};
use crate::state::{LoopFrame, MoodboardEntry, PipelineState};
use crate::support::{classify, SupportLevel};
use crate::validation::{match_loops, validate, LoopMatching};
use crate::workdir::{PathError, WorkingDirectory};

/// Generation sizes are snapped down to this multiple
const SIZE_STEP: u32 = 64;

/// Settings for a [`WorkflowExecutor`]
#[derive(Debug, Clone)]
pub struct ExecutorOptions {
    /// Root for every relative filename in the workflow
    pub working_dir: PathBuf,
    /// Probe the provider before the first instruction
    pub check_connection: bool,
    /// Refuse to start when validation reports errors
    pub enforce_validation: bool,
}

impl ExecutorOptions {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
            check_connection: true,
            enforce_validation: false,
        }
    }

    pub fn with_check_connection(mut self, check_connection: bool) -> Self {
        self.check_connection = check_connection;
        self
    }

    pub fn with_enforce_validation(mut self, enforce_validation: bool) -> Self {
        self.enforce_validation = enforce_validation;
        self
    }
}

/// Executor for instruction lists.
pub struct WorkflowExecutor {
    provider: Arc<dyn GenerationProvider>,
    options: ExecutorOptions,
    cancel: CancelHandle,
    status: Arc<RwLock<ExecutionStatus>>,
}

impl WorkflowExecutor {
    /// Create a new executor.
    pub fn new(provider: Arc<dyn GenerationProvider>, options: ExecutorOptions) -> Self {
        Self {
            provider,
            options,
            cancel: CancelHandle::new(),
            status: Arc::new(RwLock::new(ExecutionStatus::Idle)),
        }
    }

    /// Handle that cancels the current (or next) run
    ///
    /// Cancellation is sticky: call [`CancelHandle::reset`] before reusing
    /// the executor.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn status(&self) -> ExecutionStatus {
        *self.status.read()
    }

    pub fn options(&self) -> &ExecutorOptions {
        &self.options
    }

    /// Run a workflow from a fresh pipeline state.
    pub async fn execute(
        &self,
        instructions: &[WorkflowInstruction],
        event_sink: &dyn EventSink,
    ) -> Result<ExecutionResult> {
        let (result, _) = self
            .execute_with_state(instructions, PipelineState::new(), event_sink)
            .await?;
        Ok(result)
    }

    /// Run a workflow on top of an existing state and hand the state back.
    ///
    /// Images, prompts and settings carry over; loop and step bookkeeping is
    /// reset.
    pub async fn execute_with_state(
        &self,
        instructions: &[WorkflowInstruction],
        state: PipelineState,
        event_sink: &dyn EventSink,
    ) -> Result<(ExecutionResult, PipelineState)> {
        let workdir = WorkingDirectory::open(&self.options.working_dir)?;

        if self.options.enforce_validation {
            let report = validate(instructions);
            if !report.is_valid() {
                return Err(EngineError::Validation(report));
            }
        }

        {
            let mut status = self.status.write();
            if *status == ExecutionStatus::Running {
                return Err(EngineError::AlreadyRunning);
            }
            *status = ExecutionStatus::Running;
        }

        let execution_id = format!("run-{}", uuid::Uuid::new_v4());
        let run = Run {
            provider: self.provider.as_ref(),
            cancel: &self.cancel,
            check_connection: self.options.check_connection,
            instructions,
            sink: event_sink,
            workdir,
            loops: match_loops(instructions),
            log: ExecutionLog::new(execution_id.clone()),
            execution_id,
            state,
        };

        let (result, state) = run.drive().await;
        *self.status.write() = result.status;
        Ok((result, state))
    }
}

/// Why a run stopped before the end of the list
enum Halt {
    Fatal { message: String, resume_from: usize },
    Cancelled { resume_from: usize },
}

/// Where the program counter goes after a visit
enum Flow {
    Next,
    Jump(usize),
    Halt,
    Abort(String),
    Cancel,
}

struct Step {
    outcome: InstructionOutcome,
    control_flow: bool,
    flow: Flow,
}

impl Step {
    fn control(outcome: InstructionOutcome, flow: Flow) -> Self {
        Self {
            outcome,
            control_flow: true,
            flow,
        }
    }

    fn from_result(result: StepResult) -> Self {
        let (outcome, flow) = match result {
            Ok(message) => (InstructionOutcome::executed(message), Flow::Next),
            Err(StepError::Skipped(reason)) => (InstructionOutcome::skipped(reason), Flow::Next),
            Err(StepError::Failed(reason)) => (InstructionOutcome::failed(reason), Flow::Next),
            Err(StepError::Fatal(reason)) => {
                (InstructionOutcome::failed(reason.clone()), Flow::Abort(reason))
            }
            Err(StepError::Cancelled) => (
                InstructionOutcome::skipped("cancelled while waiting for the provider"),
                Flow::Cancel,
            ),
        };
        Self {
            outcome,
            control_flow: false,
            flow,
        }
    }
}

/// Ways a state instruction can end other than success
enum StepError {
    Skipped(String),
    Failed(String),
    Fatal(String),
    Cancelled,
}

impl From<PathError> for StepError {
    fn from(err: PathError) -> Self {
        Self::Failed(err.to_string())
    }
}

type StepResult = std::result::Result<Option<String>, StepError>;

/// State of one run
struct Run<'a> {
    provider: &'a dyn GenerationProvider,
    cancel: &'a CancelHandle,
    check_connection: bool,
    instructions: &'a [WorkflowInstruction],
    sink: &'a dyn EventSink,
    workdir: WorkingDirectory,
    loops: LoopMatching,
    execution_id: String,
    state: PipelineState,
    log: ExecutionLog,
}

impl<'a> Run<'a> {
    async fn drive(mut self) -> (ExecutionResult, PipelineState) {
        let instructions = self.instructions;
        let total = instructions.len();
        self.state.rewind();

        log::info!(
            "Run {} started: {} instruction(s), provider '{}', working directory '{}'",
            self.execution_id,
            total,
            self.provider.name(),
            self.workdir.root().display()
        );

        let mut halt = None;
        if self.check_connection && !self.provider.check_connection().await {
            let message = format!(
                "Generation provider '{}' is unreachable",
                self.provider.name()
            );
            log::error!("{}", message);
            halt = Some(Halt::Fatal {
                message,
                resume_from: 0,
            });
        }

        while halt.is_none() && self.state.program_counter < total {
            let index = self.state.program_counter;
            if self.cancel.is_cancelled() {
                halt = Some(Halt::Cancelled { resume_from: index });
                break;
            }

            let entry = &instructions[index];
            let iteration = self.state.current_iteration();
            self.emit_instruction_started(index, total, entry, iteration);

            let timestamp = Utc::now();
            let started = Instant::now();
            let step = self.step(index, &entry.instruction).await;
            self.record_visit(index, entry, iteration, &step, timestamp, started);

            match step.flow {
                Flow::Next => self.state.program_counter += 1,
                Flow::Jump(target) => self.state.program_counter = target,
                Flow::Halt => self.state.program_counter = total,
                Flow::Abort(message) => {
                    log::error!("Run {} aborted at #{}: {}", self.execution_id, index, message);
                    halt = Some(Halt::Fatal {
                        message,
                        resume_from: index + 1,
                    });
                }
                Flow::Cancel => {
                    halt = Some(Halt::Cancelled {
                        resume_from: index + 1,
                    })
                }
            }
        }

        let (status, fatal_error) = match halt {
            None => (ExecutionStatus::Completed { success: true }, None),
            Some(Halt::Fatal {
                message,
                resume_from,
            }) => {
                self.skip_remaining(resume_from, &format!("not run: {}", message));
                (ExecutionStatus::Completed { success: false }, Some(message))
            }
            Some(Halt::Cancelled { resume_from }) => {
                let message = format!("Run cancelled before instruction #{}", resume_from);
                self.skip_remaining(resume_from, "not run: cancelled");
                log::warn!("{}", message);
                (ExecutionStatus::Cancelled, Some(message))
            }
        };

        let result = self.log.finish(status, fatal_error);
        let _ = self.sink.send(ExecutionEvent::RunCompleted {
            execution_id: self.execution_id.clone(),
            status: result.status,
            executed: result.executed_count,
            skipped: result.skipped_count,
            failed: result.failed_count,
            duration_ms: result.duration_ms,
            error: result.fatal_error.clone(),
        });

        log::info!(
            "Run {} finished in {}ms: {} executed, {} skipped, {} failed",
            self.execution_id,
            result.duration_ms,
            result.executed_count,
            result.skipped_count,
            result.failed_count
        );

        (result, self.state)
    }

    async fn step(&mut self, index: usize, instruction: &Instruction) -> Step {
        log::debug!("#{} {}", index, instruction.key());

        if classify(instruction) == SupportLevel::Unsupported {
            let outcome =
                InstructionOutcome::skipped(format!("{} is not supported", instruction.key()));
            return Step {
                outcome,
                control_flow: instruction.is_control_flow(),
                flow: Flow::Next,
            };
        }

        match instruction {
            Instruction::Note { .. } => {
                Step::control(InstructionOutcome::executed(None), Flow::Next)
            }
            Instruction::End => Step::control(
                InstructionOutcome::executed(Some("end of workflow".into())),
                Flow::Halt,
            ),
            Instruction::Loop { count, start } => self.enter_loop(index, *count, *start),
            Instruction::LoopEnd => self.close_loop(),
            other => {
                let result = self.apply(index, other).await;
                Step::from_result(result)
            }
        }
    }

    fn enter_loop(&mut self, index: usize, count: u32, start: u32) -> Step {
        if count == 0 {
            return match self.loops.end_of(index) {
                Some(end) => Step::control(
                    InstructionOutcome::executed(Some("count is 0, body skipped".into())),
                    Flow::Jump(end + 1),
                ),
                None => Step::control(
                    InstructionOutcome::skipped("loop has no matching loopEnd"),
                    Flow::Next,
                ),
            };
        }

        self.state
            .loop_stack
            .push(LoopFrame::new(index, start, count));
        self.state.begin_step();
        Step::control(
            InstructionOutcome::executed(Some(format!("iteration {}", start))),
            Flow::Next,
        )
    }

    fn close_loop(&mut self) -> Step {
        let Some(frame) = self.state.loop_stack.last_mut() else {
            return Step::control(
                InstructionOutcome::skipped("loopEnd without an open loop"),
                Flow::Next,
            );
        };

        if frame.advance() {
            let target = frame.start_pc + 1;
            let iteration = frame.current_iteration;
            self.state.begin_step();
            Step::control(
                InstructionOutcome::executed(Some(format!("iteration {}", iteration))),
                Flow::Jump(target),
            )
        } else {
            self.state.loop_stack.pop();
            Step::control(
                InstructionOutcome::executed(Some("loop finished".into())),
                Flow::Next,
            )
        }
    }

    async fn apply(&mut self, index: usize, instruction: &Instruction) -> StepResult {
        match instruction {
            Instruction::Prompt { text } => {
                self.state.positive_prompt = text.clone();
                self.state.begin_step();
                Ok(None)
            }
            Instruction::NegativePrompt { text } => {
                self.state.negative_prompt = text.clone();
                self.state.begin_step();
                Ok(None)
            }
            Instruction::Config(patch) => {
                self.state.config.merge(patch);
                Ok(None)
            }
            Instruction::Frames { count } => {
                self.state.config.num_frames = Some(*count);
                Ok(None)
            }

            Instruction::CanvasClear => {
                self.state.canvas = None;
                self.state.canvas_transform = Default::default();
                Ok(None)
            }
            Instruction::CanvasLoad { filename } => {
                let image = self.load(filename).await?;
                let message = format!("{}x{}", image.width(), image.height());
                self.state.set_canvas(image);
                Ok(Some(message))
            }
            Instruction::CanvasSave { filename } => {
                let path = self.workdir.resolve(filename)?;
                self.save_canvas(index, path).await
            }
            Instruction::MoveScale { x, y, scale } => {
                if !scale.is_finite() || *scale <= 0.0 || !x.is_finite() || !y.is_finite() {
                    return Err(StepError::Failed(format!(
                        "invalid transform ({}, {}) x{}",
                        x, y, scale
                    )));
                }
                self.state.canvas_transform = generation::CanvasTransform {
                    x: *x,
                    y: *y,
                    scale: *scale,
                };
                Ok(None)
            }
            Instruction::AdaptSize {
                max_width,
                max_height,
            } => self.adapt_size(*max_width, *max_height),
            Instruction::Crop => {
                let (width, height) = self.require_canvas()?.dimensions();
                self.state.config.width = Some(width);
                self.state.config.height = Some(height);
                self.state.canvas_transform = Default::default();
                Ok(Some(format!("{}x{}", width, height)))
            }

            Instruction::MoodboardClear => {
                self.state.moodboard.clear();
                Ok(None)
            }
            Instruction::MoodboardCanvas => {
                let canvas = self.require_canvas()?.clone();
                self.add_to_moodboard(canvas)
            }
            Instruction::MoodboardAdd { filename } => {
                let image = self.load(filename).await?;
                self.add_to_moodboard(image)
            }
            Instruction::MoodboardRemove { index: position } => {
                if *position >= self.state.moodboard.len() {
                    return Err(StepError::Failed(format!(
                        "no moodboard entry {} (moodboard holds {})",
                        position,
                        self.state.moodboard.len()
                    )));
                }
                self.state.moodboard.remove(*position);
                Ok(None)
            }
            Instruction::MoodboardWeights { weights } => {
                let len = self.state.moodboard.len();
                if let Some(bad) = weights.keys().find(|&&position| position >= len) {
                    return Err(StepError::Failed(format!(
                        "no moodboard entry {} (moodboard holds {})",
                        bad, len
                    )));
                }
                for (&position, &weight) in weights {
                    self.state.moodboard[position].weight = weight;
                }
                Ok(None)
            }
            Instruction::LoopAddMoodboard { folder } => {
                let iteration = self.require_loop(instruction)?;
                let path = self.workdir.find_indexed_image(folder, iteration).await?;
                let image = load_path(&path).await?;
                self.add_to_moodboard(image)
            }

            Instruction::MaskClear => {
                self.state.mask = None;
                Ok(None)
            }
            Instruction::MaskLoad { filename } => {
                let mask = self.load(filename).await?;
                self.state.set_mask(mask).map_err(StepError::Failed)?;
                Ok(None)
            }
            Instruction::MaskGet => {
                let mask = self.require_canvas()?.clone();
                self.state.set_mask(mask).map_err(StepError::Failed)?;
                Ok(None)
            }
            Instruction::MaskBackground => self.assist(AssistOperation::MaskBackground).await,
            Instruction::MaskForeground => self.assist(AssistOperation::MaskForeground).await,
            Instruction::MaskBody(body) => self.assist(body_mask_operation(body)).await,
            Instruction::MaskAsk { description } => {
                self.assist(AssistOperation::MaskAsk {
                    description: description.clone(),
                })
                .await
            }

            Instruction::DepthExtract => self.assist(AssistOperation::DepthExtract).await,
            Instruction::DepthCanvas => {
                self.state.depth_map = Some(self.require_canvas()?.clone());
                Ok(None)
            }
            Instruction::DepthToCanvas => {
                let depth = self
                    .state
                    .depth_map
                    .clone()
                    .ok_or_else(|| StepError::Failed("no depth map".into()))?;
                self.state.set_canvas(depth);
                Ok(None)
            }
            Instruction::PoseExtract => self.assist(AssistOperation::PoseExtract).await,
            Instruction::PoseJson { data } => {
                self.state.pose = Some(data.clone());
                Ok(None)
            }
            Instruction::RemoveBackground => self.assist(AssistOperation::RemoveBackground).await,
            Instruction::FaceZoom => self.assist(AssistOperation::FaceZoom).await,
            Instruction::AskZoom { description } => {
                self.assist(AssistOperation::AskZoom {
                    description: description.clone(),
                })
                .await
            }
            Instruction::InpaintTools(tools) => {
                self.state.config.merge(&GenerationConfig {
                    strength: tools.strength,
                    mask_blur: tools.mask_blur,
                    mask_blur_outset: tools.mask_blur_outset,
                    preserve_original_after_inpaint: tools.restore_original,
                    ..Default::default()
                });
                Ok(None)
            }
            Instruction::XlMagic(_) => Err(StepError::Skipped("xlMagic is not supported".into())),

            Instruction::LoopLoad { folder } => {
                let iteration = self.require_loop(instruction)?;
                let path = self.workdir.find_indexed_image(folder, iteration).await?;
                let image = load_path(&path).await?;
                let message = format!("{}", self.relative(&path).display());
                self.state.set_canvas(image);
                Ok(Some(message))
            }
            Instruction::LoopSave { prefix } => {
                let iteration = self.require_loop(instruction)?;
                let path = self.workdir.loop_save_path(prefix, iteration)?;
                self.save_canvas(index, path).await
            }

            Instruction::Generate => self.generate(index).await,

            Instruction::Note { .. }
            | Instruction::Loop { .. }
            | Instruction::LoopEnd
            | Instruction::End => Ok(None),
        }
    }

    /// Call the provider with the current state
    async fn generate(&mut self, index: usize) -> StepResult {
        if !self.state.has_render_input() {
            return Err(StepError::Failed(
                "nothing to render: empty prompt, no canvas and no moodboard".into(),
            ));
        }

        let request = self.state.generation_request();
        log::debug!(
            "Generating at #{} ({}, {} moodboard image(s))",
            index,
            if request.is_img2img() { "img2img" } else { "txt2img" },
            request.moodboard.len()
        );

        let sink = self.sink;
        let execution_id = self.execution_id.clone();
        let on_progress = move |progress: f32| {
            let _ = sink.send(ExecutionEvent::GenerationProgress {
                execution_id: execution_id.clone(),
                index,
                progress,
            });
        };

        let response = tokio::select! {
            result = self.provider.generate_image(&request, &on_progress) => result,
            _ = self.cancel.cancelled() => Err(ProviderError::Cancelled),
        };

        let images = response.map_err(provider_failure)?;
        let first = images
            .first()
            .cloned()
            .ok_or_else(|| StepError::Failed("provider returned no images".into()))?;

        let iteration = self.state.current_iteration();
        let count = images.len();
        for image in images {
            self.log.add_image(ProducedImage {
                index,
                iteration,
                image,
            });
        }
        self.state.set_canvas(first);
        self.state.generated_in_step = true;
        Ok(Some(format!("generated {} image(s)", count)))
    }

    /// Save the canvas, generating first unless this step already did
    async fn save_canvas(&mut self, index: usize, path: PathBuf) -> StepResult {
        let generated = if self.state.generated_in_step {
            None
        } else {
            self.generate(index).await?
        };

        let canvas = self
            .state
            .canvas
            .as_ref()
            .ok_or_else(|| StepError::Failed("no canvas to save".into()))?
            .to_png()
            .map_err(|e| StepError::Failed(format!("cannot convert canvas to PNG: {}", e)))?;
        canvas
            .save(&path)
            .await
            .map_err(|e| StepError::Failed(format!("cannot save '{}': {}", path.display(), e)))?;

        let saved = format!("saved {}", self.relative(&path).display());
        self.log.add_saved_file(path);
        Ok(Some(match generated {
            Some(generated) => format!("{}, {}", generated, saved),
            None => saved,
        }))
    }

    /// Forward an operation to the provider and apply its result
    async fn assist(&mut self, operation: AssistOperation) -> StepResult {
        let canvas = self.require_canvas()?.clone();
        let label = operation.label();
        let request = AssistRequest {
            operation: operation.clone(),
            canvas: Some(canvas),
        };

        let response = tokio::select! {
            result = self.provider.assist(&request) => result,
            _ = self.cancel.cancelled() => Err(ProviderError::Cancelled),
        };
        let output = match response {
            Err(ProviderError::Unsupported(_)) => {
                return Err(StepError::Skipped(format!(
                    "provider '{}' does not support {}",
                    self.provider.name(),
                    label
                )))
            }
            other => other.map_err(provider_failure)?,
        };

        match (operation, output) {
            (
                AssistOperation::MaskBackground
                | AssistOperation::MaskForeground
                | AssistOperation::MaskBody { .. }
                | AssistOperation::MaskAsk { .. },
                AssistOutput::Image(mask),
            ) => {
                self.state.set_mask(mask).map_err(StepError::Failed)?;
            }
            (AssistOperation::DepthExtract, AssistOutput::Image(depth)) => {
                self.state.depth_map = Some(depth);
            }
            (AssistOperation::PoseExtract, AssistOutput::Pose(pose)) => {
                self.state.pose = Some(pose);
            }
            (
                AssistOperation::RemoveBackground
                | AssistOperation::FaceZoom
                | AssistOperation::AskZoom { .. },
                AssistOutput::Image(image),
            ) => {
                self.state.set_canvas(image);
            }
            _ => {
                return Err(StepError::Failed(format!(
                    "provider returned the wrong kind of result for {}",
                    label
                )))
            }
        }
        Ok(Some(label.to_string()))
    }

    fn adapt_size(&mut self, max_width: u32, max_height: u32) -> StepResult {
        if max_width == 0 || max_height == 0 {
            return Err(StepError::Failed("maximum size must be positive".into()));
        }
        let (width, height) = self.require_canvas()?.dimensions();
        let (width, height) = fit_within(width, height, max_width, max_height);
        self.state.config.width = Some(width);
        self.state.config.height = Some(height);
        Ok(Some(format!("{}x{}", width, height)))
    }

    fn add_to_moodboard(&mut self, image: ImageData) -> StepResult {
        self.state.moodboard.push(MoodboardEntry::new(image));
        Ok(Some(format!(
            "moodboard holds {} image(s)",
            self.state.moodboard.len()
        )))
    }

    async fn load(&self, filename: &str) -> std::result::Result<ImageData, StepError> {
        let path = self.workdir.resolve(filename)?;
        load_path(&path).await
    }

    fn require_canvas(&self) -> std::result::Result<&ImageData, StepError> {
        self.state
            .canvas
            .as_ref()
            .ok_or_else(|| StepError::Failed("no canvas".into()))
    }

    fn require_loop(&self, instruction: &Instruction) -> std::result::Result<u32, StepError> {
        self.state.current_iteration().ok_or_else(|| {
            StepError::Skipped(format!("{} needs an open loop", instruction.key()))
        })
    }

    fn relative<'p>(&self, path: &'p Path) -> &'p Path {
        path.strip_prefix(self.workdir.root()).unwrap_or(path)
    }

    fn record_visit(
        &mut self,
        index: usize,
        entry: &WorkflowInstruction,
        iteration: Option<u32>,
        step: &Step,
        timestamp: DateTime<Utc>,
        started: Instant,
    ) {
        let key = entry.instruction.key();
        match (&step.outcome.kind, &step.outcome.message) {
            (OutcomeKind::Skipped, Some(reason)) => log::warn!("#{} {} skipped: {}", index, key, reason),
            (OutcomeKind::Failed, Some(reason)) => log::warn!("#{} {} failed: {}", index, key, reason),
            _ => log::debug!("#{} {} done", index, key),
        }

        self.log.record(LogEntry {
            index,
            instruction_id: entry.id.clone(),
            key: key.to_string(),
            title: entry.instruction.title().to_string(),
            icon: entry.instruction.icon().to_string(),
            iteration,
            control_flow: step.control_flow,
            outcome: step.outcome.clone(),
            timestamp,
            duration_ms: millis(started.elapsed()),
        });

        let _ = self.sink.send(ExecutionEvent::InstructionCompleted {
            execution_id: self.execution_id.clone(),
            index,
            instruction_id: entry.id.clone(),
            outcome: step.outcome.clone(),
        });
    }

    /// Log every instruction from `from` on as skipped
    fn skip_remaining(&mut self, from: usize, reason: &str) {
        let instructions = self.instructions;
        for (index, entry) in instructions.iter().enumerate().skip(from) {
            self.log.record(LogEntry {
                index,
                instruction_id: entry.id.clone(),
                key: entry.instruction.key().to_string(),
                title: entry.instruction.title().to_string(),
                icon: entry.instruction.icon().to_string(),
                iteration: None,
                control_flow: entry.instruction.is_control_flow(),
                outcome: InstructionOutcome::skipped(reason),
                timestamp: Utc::now(),
                duration_ms: 0,
            });
        }
    }

    fn emit_instruction_started(
        &self,
        index: usize,
        total: usize,
        entry: &WorkflowInstruction,
        iteration: Option<u32>,
    ) {
        let _ = self.sink.send(ExecutionEvent::InstructionStarted {
            execution_id: self.execution_id.clone(),
            index,
            total,
            instruction_id: entry.id.clone(),
            key: entry.instruction.key().to_string(),
            iteration,
        });
    }
}

fn provider_failure(err: ProviderError) -> StepError {
    match err {
        ProviderError::Cancelled => StepError::Cancelled,
        err if err.is_fatal() => StepError::Fatal(err.to_string()),
        err => StepError::Failed(err.to_string()),
    }
}

async fn load_path(path: &Path) -> std::result::Result<ImageData, StepError> {
    ImageData::load(path).await.map_err(|e| match e {
        ImageError::Io(io) if io.kind() == std::io::ErrorKind::NotFound => {
            StepError::Failed(format!("file not found: {}", path.display()))
        }
        other => StepError::Failed(format!("cannot load '{}': {}", path.display(), other)),
    })
}

fn body_mask_operation(body: &BodyMask) -> AssistOperation {
    AssistOperation::MaskBody {
        upper: body.upper.unwrap_or(true),
        lower: body.lower.unwrap_or(true),
        clothes: body.clothes.unwrap_or(false),
        neck: body.neck.unwrap_or(false),
    }
}

/// Scale `width`x`height` down to fit the maximum, keeping the aspect ratio,
/// then snap both sides down to a multiple of [`SIZE_STEP`]
fn fit_within(width: u32, height: u32, max_width: u32, max_height: u32) -> (u32, u32) {
    let scale = (f64::from(max_width) / f64::from(width))
        .min(f64::from(max_height) / f64::from(height))
        .min(1.0);
    let snap = |side: u32| {
        let scaled = (f64::from(side) * scale).round() as u32;
        (scaled / SIZE_STEP * SIZE_STEP).max(SIZE_STEP)
    };
    (snap(width), snap(height))
}
