//! Plain-text reports printed by the commands

use std::fmt::Write;
use std::path::Path;

use flow_engine::{
    classify, ExecutionResult, OutcomeKind, SupportLevel, ValidationReport, WorkflowInstruction,
};

pub fn render_validation(report: &ValidationReport) -> String {
    let mut out = String::new();
    for error in &report.errors {
        let _ = writeln!(out, "error   {}", error);
    }
    for warning in &report.warnings {
        let _ = writeln!(out, "warning {}", warning);
    }
    let _ = writeln!(
        out,
        "{} error(s), {} warning(s)",
        report.errors.len(),
        report.warnings.len()
    );
    out
}

/// One line per instruction with its support level
pub fn render_classification(instructions: &[WorkflowInstruction]) -> String {
    let mut out = String::new();
    let mut partial = 0;
    let mut unsupported = 0;
    for (index, entry) in instructions.iter().enumerate() {
        let level = classify(&entry.instruction);
        match level {
            SupportLevel::Partial => partial += 1,
            SupportLevel::Unsupported => unsupported += 1,
            SupportLevel::Full => {}
        }
        let _ = writeln!(
            out,
            "#{:<3} {:<18} {}",
            index,
            entry.instruction.key(),
            level
        );
    }
    let _ = writeln!(
        out,
        "{} instruction(s): {} partial, {} unsupported",
        instructions.len(),
        partial,
        unsupported
    );
    out
}

/// Log of a finished run, with paths shown relative to `root`
pub fn render_run(result: &ExecutionResult, root: &Path) -> String {
    let mut out = String::new();
    for entry in &result.entries {
        let outcome = match entry.outcome.kind {
            OutcomeKind::Executed => "ok",
            OutcomeKind::Skipped => "skipped",
            OutcomeKind::Failed => "FAILED",
        };
        let iteration = entry
            .iteration
            .map(|i| format!("[{}]", i))
            .unwrap_or_default();
        let _ = write!(out, "#{:<3} {:<5} {:<18} {}", entry.index, iteration, entry.key, outcome);
        if let Some(message) = &entry.outcome.message {
            let _ = write!(out, ": {}", message);
        }
        out.push('\n');
    }

    for path in &result.saved_files {
        let shown = path.strip_prefix(root).unwrap_or(path);
        let _ = writeln!(out, "saved {}", shown.display());
    }

    let _ = writeln!(
        out,
        "{}: {} executed, {} skipped, {} failed, {} image(s) in {}ms",
        if result.success { "success" } else { "failure" },
        result.executed_count,
        result.skipped_count,
        result.failed_count,
        result.images.len(),
        result.duration_ms
    );
    if let Some(error) = &result.fatal_error {
        let _ = writeln!(out, "stopped: {}", error);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use flow_engine::{validate, ExecutionStatus, Instruction, InstructionOutcome, LogEntry};
    use std::path::PathBuf;

    fn workflow(instructions: Vec<Instruction>) -> Vec<WorkflowInstruction> {
        instructions.into_iter().map(WorkflowInstruction::new).collect()
    }

    #[test]
    fn test_validation_report_lists_everything() {
        let instructions = workflow(vec![
            Instruction::LoopEnd,
            Instruction::Loop { count: 0, start: 0 },
            Instruction::LoopEnd,
        ]);
        let text = render_validation(&validate(&instructions));

        assert!(text.contains("error   #0"));
        assert!(text.contains("warning #1"));
        assert!(text.ends_with("1 error(s), 1 warning(s)\n"));
    }

    #[test]
    fn test_classification_counts_levels() {
        let instructions = workflow(vec![
            Instruction::Prompt { text: "a".into() },
            Instruction::DepthExtract,
            Instruction::XlMagic(Default::default()),
        ]);
        let text = render_classification(&instructions);

        assert!(text.contains("depthExtract"));
        assert!(text.contains("unsupported"));
        assert!(text.ends_with("3 instruction(s): 1 partial, 1 unsupported\n"));
    }

    #[test]
    fn test_run_report() {
        let root = PathBuf::from("/renders");
        let entry = |index, key: &str, iteration, outcome| LogEntry {
            index,
            instruction_id: format!("id-{index}"),
            key: key.into(),
            title: key.into(),
            icon: "canvas".into(),
            iteration,
            control_flow: false,
            outcome,
            timestamp: Default::default(),
            duration_ms: 1,
        };
        let result = ExecutionResult {
            execution_id: "run-1".into(),
            status: ExecutionStatus::Completed { success: false },
            success: false,
            entries: vec![
                entry(0, "loopSave", Some(2), InstructionOutcome::executed(Some("saved v_2.png".into()))),
                entry(1, "canvasLoad", None, InstructionOutcome::failed("file not found: a.png")),
            ],
            executed_count: 1,
            skipped_count: 0,
            failed_count: 1,
            duration_ms: 12,
            images: Vec::new(),
            saved_files: vec![root.join("v_2.png")],
            fatal_error: Some("Connection failed: refused".into()),
        };

        let text = render_run(&result, &root);
        assert!(text.contains("#0   [2]   loopSave"));
        assert!(text.contains("FAILED: file not found: a.png"));
        assert!(text.contains("saved v_2.png\n"));
        assert!(text.contains("failure: 1 executed, 0 skipped, 1 failed"));
        assert!(text.ends_with("stopped: Connection failed: refused\n"));
    }
}
