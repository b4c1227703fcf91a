//! Step runners - execute one verification command and capture its result

pub mod error;
pub mod process;

use crate::core::{Step, StepResult, TriggerContext};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub use error::RunnerError;
pub use process::{ProcessRunner, ProcessRunnerConfig};

/// Trait for step execution - allows for different implementations
#[async_trait]
pub trait StepRunner: Send + Sync {
    /// Run `step` against the tree at `workdir`
    ///
    /// Non-zero exits and timeouts come back as `Ok` with a failed result;
    /// only launch failures and cancellation are errors.
    async fn run(
        &self,
        step: &Step,
        workdir: &Path,
        context: &TriggerContext,
        cancel: &CancellationToken,
    ) -> Result<StepResult, RunnerError>;
}

#[async_trait]
impl<R: StepRunner + ?Sized> StepRunner for Arc<R> {
    async fn run(
        &self,
        step: &Step,
        workdir: &Path,
        context: &TriggerContext,
        cancel: &CancellationToken,
    ) -> Result<StepResult, RunnerError> {
        (**self).run(step, workdir, context, cancel).await
    }
}
