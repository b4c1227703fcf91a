//! Execution state models

use crate::core::context::TriggerContext;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Final status of a single step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepStatus {
    Success,
    Failed,
    Skipped,
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StepStatus::Success => "Success",
            StepStatus::Failed => "Failed",
            StepStatus::Skipped => "Skipped",
        };
        f.write_str(s)
    }
}

/// Why a step failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureReason {
    /// The command exited with a non-zero code (or was killed by a signal)
    ExitCode,
    /// The command exceeded its timeout and was killed
    Timeout,
}

/// Why a step did not run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkipReason {
    /// `run_if` evaluated false for this trigger
    Condition,
    /// An earlier halting step failed
    Halted,
    /// An earlier step failed and this step requires a clean run
    PriorFailure,
    /// The run was cancelled or aborted before this step completed
    Cancelled,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SkipReason::Condition => "condition not met",
            SkipReason::Halted => "halted after earlier failure",
            SkipReason::PriorFailure => "earlier step failed",
            SkipReason::Cancelled => "run aborted",
        };
        f.write_str(s)
    }
}

/// Result of one step, produced exactly once per step of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepResult {
    pub step_name: String,
    pub status: StepStatus,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
    #[serde(default)]
    pub failure: Option<FailureReason>,
    #[serde(default)]
    pub skip_reason: Option<SkipReason>,
}

impl StepResult {
    pub fn success(step_name: impl Into<String>, stdout: String, stderr: String, duration_ms: u64) -> Self {
        Self {
            step_name: step_name.into(),
            status: StepStatus::Success,
            exit_code: Some(0),
            stdout,
            stderr,
            duration_ms,
            failure: None,
            skip_reason: None,
        }
    }

    pub fn failed(
        step_name: impl Into<String>,
        exit_code: Option<i32>,
        stdout: String,
        stderr: String,
        duration_ms: u64,
    ) -> Self {
        Self {
            step_name: step_name.into(),
            status: StepStatus::Failed,
            exit_code,
            stdout,
            stderr,
            duration_ms,
            failure: Some(FailureReason::ExitCode),
            skip_reason: None,
        }
    }

    pub fn timed_out(step_name: impl Into<String>, stdout: String, stderr: String, duration_ms: u64) -> Self {
        Self {
            step_name: step_name.into(),
            status: StepStatus::Failed,
            exit_code: None,
            stdout,
            stderr,
            duration_ms,
            failure: Some(FailureReason::Timeout),
            skip_reason: None,
        }
    }

    /// Skipped steps carry no exit code and no output
    pub fn skipped(step_name: impl Into<String>, reason: SkipReason) -> Self {
        Self {
            step_name: step_name.into(),
            status: StepStatus::Skipped,
            exit_code: None,
            stdout: String::new(),
            stderr: String::new(),
            duration_ms: 0,
            failure: None,
            skip_reason: Some(reason),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.status == StepStatus::Failed
    }

    /// Whether the command actually ran to a verdict
    pub fn is_completed(&self) -> bool {
        matches!(self.status, StepStatus::Success | StepStatus::Failed)
    }
}

/// Overall outcome of a pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunOutcome {
    Passed,
    Failed,
    Aborted,
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunOutcome::Passed => "Passed",
            RunOutcome::Failed => "Failed",
            RunOutcome::Aborted => "Aborted",
        };
        f.write_str(s)
    }
}

/// What stopped an aborted run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AbortCause {
    /// Cancelled by the caller, e.g. superseded by a newer trigger
    Cancelled,
    /// A step command could not be launched
    Launch { step_name: String, message: String },
}

impl fmt::Display for AbortCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortCause::Cancelled => f.write_str("cancelled"),
            AbortCause::Launch { step_name, message } => {
                write!(f, "step '{}' could not be launched: {}", step_name, message)
            }
        }
    }
}

/// One execution of a pipeline against one trigger context
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    /// Unique run ID
    pub run_id: Uuid,

    /// Name of the pipeline definition that ran
    pub pipeline_name: String,

    pub context: TriggerContext,

    /// Results in step order, one per step
    pub results: Vec<StepResult>,

    pub outcome: RunOutcome,

    #[serde(default)]
    pub abort_cause: Option<AbortCause>,

    pub started_at: DateTime<Utc>,

    pub finished_at: Option<DateTime<Utc>>,
}

impl PipelineRun {
    /// Start a new run record
    pub fn new(pipeline_name: impl Into<String>, context: TriggerContext) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            pipeline_name: pipeline_name.into(),
            context,
            results: Vec::new(),
            outcome: RunOutcome::Passed,
            abort_cause: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Mark the run as aborted
    pub fn abort(&mut self, cause: AbortCause) {
        self.outcome = RunOutcome::Aborted;
        self.abort_cause = Some(cause);
        self.finished_at = Some(Utc::now());
    }

    /// Derive the outcome from the recorded results
    pub fn finish(&mut self) {
        if self.abort_cause.is_none() {
            self.outcome = if self.results.iter().any(StepResult::is_failed) {
                RunOutcome::Failed
            } else {
                RunOutcome::Passed
            };
        }
        self.finished_at = Some(Utc::now());
    }

    /// Get the result of a specific step
    pub fn result(&self, step_name: &str) -> Option<&StepResult> {
        self.results.iter().find(|r| r.step_name == step_name)
    }

    /// Number of steps that ran to a verdict
    pub fn completed_steps(&self) -> usize {
        self.results.iter().filter(|r| r.is_completed()).count()
    }

    /// Statuses in step order
    pub fn statuses(&self) -> Vec<StepStatus> {
        self.results.iter().map(|r| r.status).collect()
    }

    pub fn launch_error(&self) -> Option<(&str, &str)> {
        match &self.abort_cause {
            Some(AbortCause::Launch { step_name, message }) => Some((step_name.as_str(), message.as_str())),
            _ => None,
        }
    }

    /// Total time spent running step commands
    pub fn total_duration_ms(&self) -> u64 {
        self.results.iter().map(|r| r.duration_ms).sum()
    }
}
