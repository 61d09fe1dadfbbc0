//! Event sink that renders run progress to the log

use flow_engine::{EventError, EventSink, ExecutionEvent, OutcomeKind};

/// Writes execution events through the `log` facade
pub struct LogEventSink;

impl EventSink for LogEventSink {
    fn send(&self, event: ExecutionEvent) -> Result<(), EventError> {
        match event {
            ExecutionEvent::InstructionStarted {
                index,
                total,
                key,
                iteration,
                ..
            } => match iteration {
                Some(i) => log::info!("[{}/{}] {} (iteration {})", index + 1, total, key, i),
                None => log::info!("[{}/{}] {}", index + 1, total, key),
            },
            ExecutionEvent::InstructionCompleted { index, outcome, .. } => {
                if outcome.kind == OutcomeKind::Executed {
                    if let Some(message) = outcome.message {
                        log::info!("    #{} {}", index, message);
                    }
                }
            }
            ExecutionEvent::GenerationProgress {
                index, progress, ..
            } => {
                log::debug!("    #{} generating {:.0}%", index, progress * 100.0);
            }
            ExecutionEvent::RunCompleted {
                execution_id,
                error: Some(error),
                ..
            } => {
                log::error!("Run {} stopped: {}", execution_id, error);
            }
            ExecutionEvent::RunCompleted { .. } => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flow_engine::{ExecutionStatus, InstructionOutcome};

    #[test]
    fn test_accepts_every_event() {
        let sink = LogEventSink;
        let events = vec![
            ExecutionEvent::InstructionStarted {
                execution_id: "run-1".into(),
                index: 0,
                total: 2,
                instruction_id: "a".into(),
                key: "prompt".into(),
                iteration: None,
            },
            ExecutionEvent::InstructionCompleted {
                execution_id: "run-1".into(),
                index: 0,
                instruction_id: "a".into(),
                outcome: InstructionOutcome::executed(Some("done".into())),
            },
            ExecutionEvent::GenerationProgress {
                execution_id: "run-1".into(),
                index: 1,
                progress: 0.5,
            },
            ExecutionEvent::RunCompleted {
                execution_id: "run-1".into(),
                status: ExecutionStatus::Cancelled,
                executed: 1,
                skipped: 1,
                failed: 0,
                duration_ms: 3,
                error: Some("Run cancelled before instruction #1".into()),
            },
        ];

        for event in events {
            assert!(sink.send(event).is_ok());
        }
    }
}
