//! Per-instruction outcomes and the run report

use std::path::PathBuf;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use generation::ImageData;
use serde::{Deserialize, Serialize};

/// Lifecycle status of an executor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum ExecutionStatus {
    Idle,
    Running,
    /// Representable for hosts; the executor never pauses on its own
    Paused,
    Completed { success: bool },
    Cancelled,
}

impl ExecutionStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Cancelled)
    }
}

/// What happened to one visited instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OutcomeKind {
    Executed,
    Skipped,
    Failed,
}

/// Outcome of one instruction visit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstructionOutcome {
    pub kind: OutcomeKind,
    pub message: Option<String>,
}

impl InstructionOutcome {
    pub fn executed(message: Option<String>) -> Self {
        Self {
            kind: OutcomeKind::Executed,
            message,
        }
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            kind: OutcomeKind::Skipped,
            message: Some(reason.into()),
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            kind: OutcomeKind::Failed,
            message: Some(reason.into()),
        }
    }

    /// Not a failure (skips count as success)
    pub fn success(&self) -> bool {
        self.kind != OutcomeKind::Failed
    }

    pub fn is_skipped(&self) -> bool {
        self.kind == OutcomeKind::Skipped
    }
}

/// One line of the run timeline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub index: usize,
    pub instruction_id: String,
    pub key: String,
    pub title: String,
    pub icon: String,
    /// Innermost loop iteration at the time of the visit
    pub iteration: Option<u32>,
    /// Loop bookkeeping and notes are logged but never counted
    pub control_flow: bool,
    pub outcome: InstructionOutcome,
    pub timestamp: DateTime<Utc>,
    pub duration_ms: u64,
}

/// An image returned by the provider during the run
#[derive(Debug, Clone)]
pub struct ProducedImage {
    /// Index of the instruction that triggered the generation
    pub index: usize,
    pub iteration: Option<u32>,
    pub image: ImageData,
}

/// Report of a finished run
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub execution_id: String,
    pub status: ExecutionStatus,
    /// No fatal abort and not cancelled; per-instruction failures do not count
    pub success: bool,
    pub entries: Vec<LogEntry>,
    pub executed_count: usize,
    pub skipped_count: usize,
    pub failed_count: usize,
    pub duration_ms: u64,
    pub images: Vec<ProducedImage>,
    /// Files written by `canvasSave` and `loopSave`, in order
    pub saved_files: Vec<PathBuf>,
    pub fatal_error: Option<String>,
}

impl ExecutionResult {
    /// All visits of the instruction at `index`
    pub fn entries_for(&self, index: usize) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter().filter(move |entry| entry.index == index)
    }

    /// Counted entries (control flow excluded)
    pub fn counted_entries(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter().filter(|entry| !entry.control_flow)
    }
}

/// Accumulates log entries while a run is in progress
#[derive(Debug)]
pub struct ExecutionLog {
    execution_id: String,
    started: Instant,
    entries: Vec<LogEntry>,
    images: Vec<ProducedImage>,
    saved_files: Vec<PathBuf>,
}

impl ExecutionLog {
    pub fn new(execution_id: impl Into<String>) -> Self {
        Self {
            execution_id: execution_id.into(),
            started: Instant::now(),
            entries: Vec::new(),
            images: Vec::new(),
            saved_files: Vec::new(),
        }
    }

    pub fn record(&mut self, entry: LogEntry) {
        self.entries.push(entry);
    }

    pub fn add_image(&mut self, image: ProducedImage) {
        self.images.push(image);
    }

    pub fn add_saved_file(&mut self, path: PathBuf) {
        self.saved_files.push(path);
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn elapsed_ms(&self) -> u64 {
        millis(self.started.elapsed())
    }

    /// (executed, skipped, failed) over counted entries
    pub fn counts(&self) -> (usize, usize, usize) {
        self.entries
            .iter()
            .filter(|entry| !entry.control_flow)
            .fold((0, 0, 0), |(executed, skipped, failed), entry| {
                match entry.outcome.kind {
                    OutcomeKind::Executed => (executed + 1, skipped, failed),
                    OutcomeKind::Skipped => (executed, skipped + 1, failed),
                    OutcomeKind::Failed => (executed, skipped, failed + 1),
                }
            })
    }

    pub fn finish(self, status: ExecutionStatus, fatal_error: Option<String>) -> ExecutionResult {
        let (executed_count, skipped_count, failed_count) = self.counts();
        let duration_ms = self.elapsed_ms();
        let success = matches!(status, ExecutionStatus::Completed { success: true });

        ExecutionResult {
            execution_id: self.execution_id,
            status,
            success,
            entries: self.entries,
            executed_count,
            skipped_count,
            failed_count,
            duration_ms,
            images: self.images,
            saved_files: self.saved_files,
            fatal_error,
        }
    }
}

/// Whole milliseconds, saturating at `u64::MAX`
pub(crate) fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_millis_saturates() {
        assert_eq!(millis(Duration::from_millis(1500)), 1500);
        assert_eq!(millis(Duration::MAX), u64::MAX);
    }

    fn entry(index: usize, control_flow: bool, outcome: InstructionOutcome) -> LogEntry {
        LogEntry {
            index,
            instruction_id: format!("id-{index}"),
            key: "generate".into(),
            title: "Generate".into(),
            icon: "sparkles".into(),
            iteration: None,
            control_flow,
            outcome,
            timestamp: Utc::now(),
            duration_ms: 0,
        }
    }

    #[test]
    fn test_counts_exclude_control_flow() {
        let mut log = ExecutionLog::new("run-1");
        log.record(entry(0, true, InstructionOutcome::executed(None)));
        log.record(entry(1, false, InstructionOutcome::executed(None)));
        log.record(entry(2, false, InstructionOutcome::skipped("unsupported")));
        log.record(entry(3, false, InstructionOutcome::failed("missing file")));
        log.record(entry(1, false, InstructionOutcome::executed(None)));

        let result = log.finish(ExecutionStatus::Completed { success: true }, None);
        assert_eq!(result.executed_count, 2);
        assert_eq!(result.skipped_count, 1);
        assert_eq!(result.failed_count, 1);
        assert_eq!(result.entries.len(), 5);
        assert_eq!(result.entries_for(1).count(), 2);
        assert_eq!(result.counted_entries().count(), 4);
        assert!(result.success);
    }

    #[test]
    fn test_success_follows_status() {
        let failed = ExecutionLog::new("run-2")
            .finish(ExecutionStatus::Completed { success: false }, Some("unreachable".into()));
        assert!(!failed.success);
        assert_eq!(failed.fatal_error.as_deref(), Some("unreachable"));

        let cancelled = ExecutionLog::new("run-3").finish(ExecutionStatus::Cancelled, None);
        assert!(!cancelled.success);
        assert!(cancelled.status.is_finished());
    }

    #[test]
    fn test_outcome_flags() {
        assert!(InstructionOutcome::skipped("x").success());
        assert!(InstructionOutcome::skipped("x").is_skipped());
        assert!(!InstructionOutcome::failed("x").success());
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_value(ExecutionStatus::Completed { success: true }).unwrap();
        assert_eq!(json, serde_json::json!({"state": "completed", "success": true}));
    }
}
