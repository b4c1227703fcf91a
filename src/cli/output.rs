//! CLI output formatting

use crate::{
    core::{FailureReason, RunOutcome, StepResult, StepStatus},
    execution::ExecutionEvent,
    persistence::StoredReport,
};
use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static SKIP: Emoji<'_, '_> = Emoji("⏭️  ", "- ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "! ");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");

/// Create a spinner shown while a step runs
pub fn create_spinner() -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    let style = ProgressStyle::default_spinner()
        .template("{spinner:.green} [{elapsed_precise}] {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    spinner.set_style(style);
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

/// Format a run outcome for display
pub fn format_outcome(outcome: RunOutcome) -> String {
    match outcome {
        RunOutcome::Passed => style("PASSED").green().to_string(),
        RunOutcome::Failed => style("FAILED").red().to_string(),
        RunOutcome::Aborted => style("ABORTED").yellow().to_string(),
    }
}

/// Format one step result as a single line
pub fn format_step_result(result: &StepResult) -> String {
    let duration = style(format_duration_ms(result.duration_ms)).dim();
    match result.status {
        StepStatus::Success => format!("{}{} {}", CHECK, style(&result.step_name).green(), duration),
        StepStatus::Failed => {
            let detail = match (result.failure, result.exit_code) {
                (Some(FailureReason::Timeout), _) => "timed out".to_string(),
                (_, Some(code)) => format!("exit code {}", code),
                (_, None) => "killed".to_string(),
            };
            format!(
                "{}{} {} {}",
                CROSS,
                style(&result.step_name).red(),
                style(detail).red(),
                duration
            )
        }
        StepStatus::Skipped => {
            let reason = result
                .skip_reason
                .map(|r| r.to_string())
                .unwrap_or_default();
            format!("{}{} {}", SKIP, style(&result.step_name).dim(), style(reason).dim())
        }
    }
}

/// Format an execution event for display
///
/// `StepStarted` has no line of its own; it only drives the spinner.
pub fn format_execution_event(event: &ExecutionEvent) -> Option<String> {
    match event {
        ExecutionEvent::RunStarted {
            run_id,
            pipeline_name,
            total_steps,
        } => Some(format!(
            "{}Running pipeline {} ({} steps, {})",
            ROCKET,
            style(pipeline_name).bold(),
            total_steps,
            style(&run_id.to_string()[..8]).dim()
        )),
        ExecutionEvent::StepStarted { .. } => None,
        ExecutionEvent::StepFinished { result } => Some(format!("  {}", format_step_result(result))),
        ExecutionEvent::StepSkipped { step_name, reason } => Some(format!(
            "  {}{} {}",
            SKIP,
            style(step_name).dim(),
            style(reason).dim()
        )),
        ExecutionEvent::RunFinished { run_id, outcome } => Some(format!(
            "{}Run {} {}",
            INFO,
            style(&run_id.to_string()[..8]).dim(),
            format_outcome(*outcome)
        )),
    }
}

/// Spinner message for a running step
pub fn format_step_progress(step_name: &str, index: usize, total: usize) -> String {
    format!("[{}/{}] {}", index + 1, total, style(step_name).cyan())
}

/// One-line summary of a stored report
pub fn format_stored_report(stored: &StoredReport) -> String {
    let outcome = stored.report.body_text.lines().next().unwrap_or_default();
    let icon = match outcome {
        "Passed" => CHECK,
        "Failed" => CROSS,
        _ => WARN,
    };
    format!(
        "{}{} - {} (revision {}) - {}",
        icon,
        style(&stored.report.change_id).bold(),
        outcome,
        style(stored.report.revision).cyan(),
        style(stored.updated_at.to_rfc3339()).dim()
    )
}

pub fn format_duration_ms(ms: u64) -> String {
    let secs = ms / 1000;
    if ms < 1000 {
        format!("{}ms", ms)
    } else if secs < 60 {
        format!("{:.1}s", ms as f64 / 1000.0)
    } else {
        format!("{}m {}s", secs / 60, secs % 60)
    }
}
