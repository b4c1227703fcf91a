//! Report body rendering

use crate::core::config::ReportSettings;
use crate::core::{FailureReason, PipelineRun, StepResult, StepStatus};
use std::fmt::Write;

/// Render a run into a report body
///
/// The first line is the bare outcome so a reader scanning only the top of
/// the report learns pass/fail.
pub fn render_report(run: &PipelineRun, settings: &ReportSettings) -> String {
    let mut body = String::new();
    let ctx = &run.context;

    let _ = writeln!(body, "{}", run.outcome);
    body.push('\n');

    if let Some(cause) = &run.abort_cause {
        let _ = writeln!(body, "Run aborted: {}", cause);
        body.push('\n');
    }

    let _ = writeln!(
        body,
        "Pipeline `{}` for change `{}` ({}: {} -> {})",
        run.pipeline_name, ctx.change_id, ctx.event_kind, ctx.source_ref, ctx.target_ref
    );
    body.push('\n');

    for (index, result) in run.results.iter().enumerate() {
        let _ = writeln!(
            body,
            "{}. **{}**: {}",
            index + 1,
            result.step_name,
            describe(result)
        );
    }

    for result in run.results.iter().filter(|r| r.is_completed()) {
        let output = combined_output(result);
        if output.trim().is_empty() {
            continue;
        }

        let excerpt = excerpt(&output, settings.excerpt_lines, settings.excerpt_bytes);
        let fence = if excerpt.contains("```") { "````" } else { "```" };
        let _ = write!(
            body,
            "\n#### {}\n\n{}\n{}\n{}\n",
            result.step_name, fence, excerpt, fence
        );
    }

    body
}

/// One-line status description for a step
fn describe(result: &StepResult) -> String {
    let duration = format_duration_ms(result.duration_ms);
    match result.status {
        StepStatus::Success => format!("Success ({})", duration),
        StepStatus::Failed => match (result.failure, result.exit_code) {
            (Some(FailureReason::Timeout), _) => format!("Failed, timed out ({})", duration),
            (_, Some(code)) => format!("Failed, exit code {} ({})", code, duration),
            (_, None) => format!("Failed, killed by signal ({})", duration),
        },
        StepStatus::Skipped => match result.skip_reason {
            Some(reason) => format!("Skipped, {}", reason),
            None => "Skipped".to_string(),
        },
    }
}

fn combined_output(result: &StepResult) -> String {
    let stdout = result.stdout.trim_end();
    let stderr = result.stderr.trim_end();
    match (stdout.is_empty(), stderr.is_empty()) {
        (_, true) => stdout.to_string(),
        (true, false) => stderr.to_string(),
        (false, false) => format!("{}\n{}", stdout, stderr),
    }
}

/// Keep the last `max_lines` lines and at most the last `max_bytes` bytes
///
/// Summaries and diagnostics come at the end of IaC CLI output.
pub fn excerpt(output: &str, max_lines: usize, max_bytes: usize) -> String {
    let lines: Vec<&str> = output.lines().collect();
    let earlier = lines.len().saturating_sub(max_lines);
    let mut text = lines[earlier..].join("\n");

    let truncated = text.len() > max_bytes;
    if truncated {
        let mut cut = text.len() - max_bytes;
        while !text.is_char_boundary(cut) {
            cut += 1;
        }
        text.drain(..cut);
    }

    match (earlier, truncated) {
        (0, false) => text,
        (_, true) => format!("... (truncated)\n{}", text),
        (n, false) => format!("... ({} earlier lines)\n{}", n, text),
    }
}

fn format_duration_ms(ms: u64) -> String {
    if ms < 1000 {
        format!("{}ms", ms)
    } else {
        format!("{:.1}s", ms as f64 / 1000.0)
    }
}
