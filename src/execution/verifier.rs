//! End-to-end verification: gate, run, report

use crate::core::config::VerifyConfig;
use crate::core::{EventKind, PipelineRun, RunOutcome, TriggerContext, TriggerGate};
use crate::execution::{Pipeline, RunCoordinator, Workspace};
use crate::persistence::ReportStore;
use crate::report::{Report, ReportBuilder, ReportPublisher};
use crate::runner::StepRunner;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Where a run's steps execute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkspaceMode {
    /// A temporary copy of the source tree
    #[default]
    Isolated,
    /// The source tree itself
    InPlace,
}

/// A finished verification
#[derive(Debug)]
pub struct Verification {
    pub run: PipelineRun,

    /// The stored report, when one was written
    pub report: Option<Report>,

    /// Why reporting failed, if it did; never affects the run outcome
    pub report_warning: Option<String>,
}

#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("No pipeline is configured for a {event} event targeting '{target}'")]
    NoPipeline { event: EventKind, target: String },

    #[error("Failed to prepare workspace: {0}")]
    Workspace(String),

    /// A step could not be started; the aborted run is still available
    #[error("Step '{step}' could not be launched: {message}")]
    Launch {
        step: String,
        message: String,
        run: Box<PipelineRun>,
        report: Option<Report>,
    },
}

/// Ties the trigger gate, pipeline executor and report builder together
pub struct Verifier<R> {
    gate: TriggerGate,
    pipeline: Pipeline<R>,
    reports: ReportBuilder,
    store: Arc<dyn ReportStore>,
    coordinator: RunCoordinator,
}

impl<R: StepRunner> Verifier<R> {
    pub fn new(
        gate: TriggerGate,
        pipeline: Pipeline<R>,
        reports: ReportBuilder,
        store: Arc<dyn ReportStore>,
    ) -> Self {
        Self {
            gate,
            pipeline,
            reports,
            store,
            coordinator: RunCoordinator::default(),
        }
    }

    /// Build a verifier from loaded configuration
    pub fn from_config(
        config: &VerifyConfig,
        pipeline: Pipeline<R>,
        store: Arc<dyn ReportStore>,
    ) -> anyhow::Result<Self> {
        let catalog = Arc::new(config.to_catalog()?);
        let gate = config.to_gate(catalog);
        let reports = ReportBuilder::new(config.report.clone());

        Ok(Self::new(gate, pipeline, reports, store)
            .with_coordinator(RunCoordinator::new(config.concurrency.on_superseded)))
    }

    pub fn with_coordinator(mut self, coordinator: RunCoordinator) -> Self {
        self.coordinator = coordinator;
        self
    }

    pub fn with_publisher(mut self, publisher: Arc<dyn ReportPublisher>) -> Self {
        self.reports = self.reports.with_publisher(publisher);
        self
    }

    pub fn gate(&self) -> &TriggerGate {
        &self.gate
    }

    pub fn coordinator(&self) -> &RunCoordinator {
        &self.coordinator
    }

    pub fn store(&self) -> &Arc<dyn ReportStore> {
        &self.store
    }

    /// Verify one trigger against the tree at `source`
    pub async fn verify(
        &self,
        context: &TriggerContext,
        source: &Path,
        mode: WorkspaceMode,
    ) -> Result<Verification, VerifyError> {
        let definition = self
            .gate
            .select_definition(context)
            .ok_or_else(|| VerifyError::NoPipeline {
                event: context.event_kind,
                target: context.target_ref.clone(),
            })?;

        info!(
            "Selected pipeline {} for change {} ({} -> {})",
            definition.name, context.change_id, context.source_ref, context.target_ref
        );

        let workspace = match mode {
            WorkspaceMode::Isolated => Workspace::isolated(source).await,
            WorkspaceMode::InPlace => Workspace::in_place(source),
        }
        .map_err(|e| VerifyError::Workspace(format!("{:#}", e)))?;

        let run = {
            let ticket = self.coordinator.begin(&context.change_id);
            self.pipeline
                .execute_definition(definition, context, workspace.path(), ticket.token())
                .await
        };
        drop(workspace);

        let (report, report_warning) = self.report(&run).await;

        let launch_error = run
            .launch_error()
            .map(|(step, message)| (step.to_string(), message.to_string()));
        if let Some((step, message)) = launch_error {
            return Err(VerifyError::Launch {
                step,
                message,
                run: Box::new(run),
                report,
            });
        }

        Ok(Verification {
            run,
            report,
            report_warning,
        })
    }

    async fn report(&self, run: &PipelineRun) -> (Option<Report>, Option<String>) {
        if run.outcome == RunOutcome::Aborted {
            if run.completed_steps() == 0 {
                info!("Run for change {} aborted before any step completed, not reporting", run.context.change_id);
                return (None, None);
            }
            if !self.reports.settings().publish_partial_on_abort {
                info!("Not reporting partial run for change {}", run.context.change_id);
                return (None, None);
            }
        }

        match self.reports.upsert(self.store.as_ref(), run).await {
            Ok(upserted) => (Some(upserted.report), upserted.publish_warning),
            Err(e) => {
                warn!("Report for change {} was not updated: {}", run.context.change_id, e);
                (None, Some(e.to_string()))
            }
        }
    }
}
