//! Runner error types

use thiserror::Error;

/// Errors that stop a step from producing a verdict
///
/// A command that runs and exits non-zero is not an error; it is a
/// `Failed` step result.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RunnerError {
    /// The command could not be started at all
    #[error("Failed to launch step '{step}': {message}")]
    Launch { step: String, message: String },

    /// The run was cancelled while the step was in flight
    #[error("Step '{step}' was cancelled")]
    Cancelled { step: String },
}

impl RunnerError {
    pub fn launch(step: impl Into<String>, message: impl Into<String>) -> Self {
        RunnerError::Launch {
            step: step.into(),
            message: message.into(),
        }
    }

    pub fn cancelled(step: impl Into<String>) -> Self {
        RunnerError::Cancelled { step: step.into() }
    }
}
