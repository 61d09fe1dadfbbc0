//! Event types for streaming run progress
//!
//! The executor reports every instruction visit through an [`EventSink`],
//! so hosts can render progress without reading live pipeline state.

use serde::{Deserialize, Serialize};

use crate::result::{ExecutionStatus, InstructionOutcome};

/// Trait for receiving execution events
///
/// This abstracts over the transport (log output, channel, test buffer).
pub trait EventSink: Send + Sync {
    /// Send an event
    ///
    /// Returns an error if the event could not be delivered (e.g., channel closed)
    fn send(&self, event: ExecutionEvent) -> Result<(), EventError>;
}

/// Error when sending events fails
#[derive(Debug, Clone)]
pub struct EventError {
    pub message: String,
}

impl std::fmt::Display for EventError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Event error: {}", self.message)
    }
}

impl std::error::Error for EventError {}

impl EventError {
    pub fn channel_closed() -> Self {
        Self {
            message: "Channel closed".to_string(),
        }
    }
}

/// Events emitted during a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ExecutionEvent {
    /// An instruction is about to run
    #[serde(rename_all = "camelCase")]
    InstructionStarted {
        execution_id: String,
        index: usize,
        total: usize,
        instruction_id: String,
        key: String,
        iteration: Option<u32>,
    },

    /// An instruction finished
    #[serde(rename_all = "camelCase")]
    InstructionCompleted {
        execution_id: String,
        index: usize,
        instruction_id: String,
        outcome: InstructionOutcome,
    },

    /// Provider progress for the generation in flight
    #[serde(rename_all = "camelCase")]
    GenerationProgress {
        execution_id: String,
        index: usize,
        progress: f32,
    },

    /// The run reached a terminal status
    #[serde(rename_all = "camelCase")]
    RunCompleted {
        execution_id: String,
        status: ExecutionStatus,
        executed: usize,
        skipped: usize,
        failed: usize,
        duration_ms: u64,
        error: Option<String>,
    },
}

/// A no-op event sink that discards all events
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn send(&self, _event: ExecutionEvent) -> Result<(), EventError> {
        Ok(())
    }
}

/// A vector-based event sink that collects events
///
/// Useful for testing to verify events were emitted correctly.
pub struct VecEventSink {
    events: parking_lot::Mutex<Vec<ExecutionEvent>>,
}

impl VecEventSink {
    pub fn new() -> Self {
        Self {
            events: parking_lot::Mutex::new(Vec::new()),
        }
    }

    /// Get all collected events
    pub fn events(&self) -> Vec<ExecutionEvent> {
        self.events.lock().clone()
    }

    /// Clear all collected events
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl Default for VecEventSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for VecEventSink {
    fn send(&self, event: ExecutionEvent) -> Result<(), EventError> {
        self.events.lock().push(event);
        Ok(())
    }
}

/// Forwards events into a tokio channel
pub struct ChannelEventSink {
    sender: tokio::sync::mpsc::UnboundedSender<ExecutionEvent>,
}

impl ChannelEventSink {
    pub fn new(sender: tokio::sync::mpsc::UnboundedSender<ExecutionEvent>) -> Self {
        Self { sender }
    }

    /// Create a sink together with its receiving end
    pub fn channel() -> (Self, tokio::sync::mpsc::UnboundedReceiver<ExecutionEvent>) {
        let (sender, receiver) = tokio::sync::mpsc::unbounded_channel();
        (Self::new(sender), receiver)
    }
}

impl EventSink for ChannelEventSink {
    fn send(&self, event: ExecutionEvent) -> Result<(), EventError> {
        self.sender
            .send(event)
            .map_err(|_| EventError::channel_closed())
    }
}
