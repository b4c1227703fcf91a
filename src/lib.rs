//! iac-verify - format, validate, plan and report on infrastructure changes

pub mod cli;
pub mod core;
pub mod execution;
pub mod persistence;
pub mod report;
pub mod runner;

// Re-export commonly used types
pub use crate::core::config::VerifyConfig;
pub use crate::core::{PipelineRun, RunOutcome, Step, StepResult, StepStatus, TriggerContext, TriggerGate};
pub use crate::execution::{ExecutionEvent, Pipeline, Verification, Verifier, VerifyError, WorkspaceMode};
pub use crate::persistence::{InMemoryReportStore, ReportStore};
pub use crate::report::{Report, ReportBuilder};
pub use crate::runner::{ProcessRunner, ProcessRunnerConfig, RunnerError, StepRunner};
