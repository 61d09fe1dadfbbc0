//! Flow Engine - instruction-list workflows for image generation
//!
//! A workflow is an ordered list of instructions (prompts, canvas and mask
//! edits, moodboard changes, loops and save points). The engine decodes and
//! validates such lists and interprets them against a [`GenerationProvider`].
//!
//! - `wire`: the JSON single-key object format used by workflow files
//! - `validation`: static checks returning every problem found
//! - `support`: how much of each instruction the engine honors
//! - `executor`: the interpreter, with per-instruction logging and
//!   cooperative cancellation
//!
//! # Example
//!
//! ```rust,ignore
//! use flow_engine::{decode_workflow, ExecutorOptions, NullEventSink, WorkflowExecutor};
//!
//! let instructions = decode_workflow(&std::fs::read_to_string("cats.json")?)?;
//! let executor = WorkflowExecutor::new(provider, ExecutorOptions::new("./out"));
//! let result = executor.execute(&instructions, &NullEventSink).await?;
//! println!("{} image(s)", result.images.len());
//! ```
//!
//! [`GenerationProvider`]: generation::GenerationProvider

pub mod cancel;
pub mod error;
pub mod events;
pub mod executor;
pub mod instruction;
pub mod result;
pub mod state;
pub mod support;
pub mod validation;
pub mod wire;
pub mod workdir;

#[cfg(test)]
mod testing;

// Re-export key types
pub use cancel::CancelHandle;
pub use error::{EngineError, Result};
pub use events::{
    ChannelEventSink, EventError, EventSink, ExecutionEvent, NullEventSink, VecEventSink,
};
pub use executor::{ExecutorOptions, WorkflowExecutor};
pub use instruction::{Instruction, WorkflowInstruction};
pub use result::{
    ExecutionResult, ExecutionStatus, InstructionOutcome, LogEntry, OutcomeKind, ProducedImage,
};
pub use state::PipelineState;
pub use support::{classify, SupportLevel};
pub use validation::{validate, ValidationError, ValidationReport, ValidationWarning};
pub use wire::{decode, decode_workflow, encode, encode_workflow, DecodeError};
pub use workdir::{PathError, WorkingDirectory};
