//! Main execution engine - runs a pipeline's steps in order with gating

use crate::{
    core::{AbortCause, PipelineDefinition, PipelineRun, RunOutcome, SkipReason, Step, StepResult, TriggerContext},
    runner::{RunnerError, StepRunner},
};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Events that can occur during pipeline execution
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    RunStarted {
        run_id: Uuid,
        pipeline_name: String,
        total_steps: usize,
    },
    StepStarted {
        step_name: String,
        index: usize,
        total: usize,
    },
    StepFinished {
        result: StepResult,
    },
    StepSkipped {
        step_name: String,
        reason: SkipReason,
    },
    RunFinished {
        run_id: Uuid,
        outcome: RunOutcome,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(&ExecutionEvent) + Send + Sync>;

/// Sequential pipeline executor over a [`StepRunner`]
pub struct Pipeline<R> {
    runner: R,
    event_handlers: Vec<EventHandler>,
}

impl<R: StepRunner> Pipeline<R> {
    pub fn new(runner: R) -> Self {
        Self {
            runner,
            event_handlers: Vec::new(),
        }
    }

    /// Add an event handler
    pub fn with_event_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&ExecutionEvent) + Send + Sync + 'static,
    {
        self.event_handlers.push(Arc::new(handler));
        self
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    fn emit_event(&self, event: ExecutionEvent) {
        for handler in &self.event_handlers {
            handler(&event);
        }
    }

    fn skip(&self, run: &mut PipelineRun, step: &Step, reason: SkipReason) {
        debug!("Skipping step {}: {}", step.name, reason);
        run.results.push(StepResult::skipped(&step.name, reason));
        self.emit_event(ExecutionEvent::StepSkipped {
            step_name: step.name.clone(),
            reason,
        });
    }

    /// Execute a catalog definition
    pub async fn execute_definition(
        &self,
        definition: &PipelineDefinition,
        context: &TriggerContext,
        workdir: &Path,
        cancel: &CancellationToken,
    ) -> PipelineRun {
        self.execute(&definition.name, &definition.steps, context, workdir, cancel)
            .await
    }

    /// Execute `steps` in order and return the completed run
    ///
    /// Always produces exactly one result per step. Runner failures do not
    /// escape: launch errors and cancellation are folded into an `Aborted`
    /// run with the cause recorded.
    pub async fn execute(
        &self,
        name: &str,
        steps: &[Step],
        context: &TriggerContext,
        workdir: &Path,
        cancel: &CancellationToken,
    ) -> PipelineRun {
        let mut run = PipelineRun::new(name, context.clone());
        let total = steps.len();

        info!(
            "Starting pipeline {} for change {} ({})",
            name, context.change_id, run.run_id
        );
        self.emit_event(ExecutionEvent::RunStarted {
            run_id: run.run_id,
            pipeline_name: name.to_string(),
            total_steps: total,
        });

        // Once set, every remaining step is skipped with this reason
        let mut stop: Option<SkipReason> = None;
        let mut any_failed = false;

        for (index, step) in steps.iter().enumerate() {
            if stop.is_none() && cancel.is_cancelled() {
                info!("Pipeline {} cancelled before step {}", name, step.name);
                run.abort(AbortCause::Cancelled);
                stop = Some(SkipReason::Cancelled);
            }

            if let Some(reason) = stop {
                self.skip(&mut run, step, reason);
                continue;
            }

            if !step.run_if.evaluate(context) {
                self.skip(&mut run, step, SkipReason::Condition);
                continue;
            }

            if step.requires_success && any_failed {
                self.skip(&mut run, step, SkipReason::PriorFailure);
                continue;
            }

            self.emit_event(ExecutionEvent::StepStarted {
                step_name: step.name.clone(),
                index,
                total,
            });

            match self.runner.run(step, workdir, context, cancel).await {
                Ok(mut result) => {
                    result.step_name = step.name.clone();
                    if result.is_failed() {
                        any_failed = true;
                        if step.halt_on_failure {
                            warn!("Step {} failed, halting pipeline {}", step.name, name);
                            stop = Some(SkipReason::Halted);
                        }
                    }
                    run.results.push(result.clone());
                    self.emit_event(ExecutionEvent::StepFinished { result });
                }
                Err(RunnerError::Launch { step: step_name, message }) => {
                    warn!("Could not launch step {}: {}", step_name, message);
                    run.abort(AbortCause::Launch { step_name, message });
                    stop = Some(SkipReason::Cancelled);
                    self.skip(&mut run, step, SkipReason::Cancelled);
                }
                Err(RunnerError::Cancelled { .. }) => {
                    info!("Step {} cancelled", step.name);
                    run.abort(AbortCause::Cancelled);
                    stop = Some(SkipReason::Cancelled);
                    self.skip(&mut run, step, SkipReason::Cancelled);
                }
            }
        }

        run.finish();

        info!("Pipeline {} finished: {}", name, run.outcome);
        self.emit_event(ExecutionEvent::RunFinished {
            run_id: run.run_id,
            outcome: run.outcome,
        });

        run
    }
}
