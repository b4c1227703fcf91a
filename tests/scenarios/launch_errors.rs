//! Test: Launch errors - a broken CI environment is not a failed verification

use crate::helpers::*;
use iac_verify::core::{RunOutcome, SkipReason, StepStatus};
use iac_verify::execution::{Pipeline, Verifier, VerifyError, WorkspaceMode};
use iac_verify::persistence::{InMemoryReportStore, ReportStore};
use std::sync::Arc;

/// The run aborts at the step that could not be launched
#[tokio::test]
async fn test_launch_error_aborts_run() {
    let runner = Arc::new(SpyRunner::new().script("init", Scripted::Launch("terraform: not found".to_string())));

    let run = run_steps(runner.clone(), &iac_steps(), &pr_context("42")).await;

    assert_eq!(run.outcome, RunOutcome::Aborted);
    assert_eq!(run.launch_error(), Some(("init", "terraform: not found")));
    assert_statuses(
        &run,
        &[StepStatus::Success, StepStatus::Skipped, StepStatus::Skipped, StepStatus::Skipped],
    );
    assert!(run.results[1..]
        .iter()
        .all(|r| r.skip_reason == Some(SkipReason::Cancelled)));
    assert_execution_order(&runner, &["fmt", "init"]);
}

/// The verifier surfaces launch errors as errors, carrying the run
#[tokio::test]
async fn test_verifier_reports_launch_error_distinctly() {
    let runner = Arc::new(SpyRunner::new().script("validate", Scripted::Launch("permission denied".to_string())));
    let store = Arc::new(InMemoryReportStore::new());
    let verifier = Verifier::from_config(&terraform_config(), Pipeline::new(runner), store.clone()).unwrap();
    let source = tempfile::tempdir().unwrap();

    let err = verifier
        .verify(&pr_context("42"), source.path(), WorkspaceMode::Isolated)
        .await
        .unwrap_err();

    match err {
        VerifyError::Launch { step, message, run, report } => {
            assert_eq!(step, "validate");
            assert_eq!(message, "permission denied");
            assert_eq!(run.outcome, RunOutcome::Aborted);
            assert_eq!(run.completed_steps(), 2);
            assert!(report.is_some());
        }
        other => panic!("expected a launch error, got {}", other),
    }

    let stored = store.load("42").await.unwrap().unwrap();
    assert!(stored.report.body_text.contains("could not be launched: permission denied"));
}

/// Launch failure on the first step: nothing completed, nothing reported
#[tokio::test]
async fn test_launch_error_on_first_step_posts_nothing() {
    let runner = Arc::new(SpyRunner::new().script("fmt", Scripted::Launch("no such file".to_string())));
    let store = Arc::new(InMemoryReportStore::new());
    let verifier = Verifier::from_config(&terraform_config(), Pipeline::new(runner), store.clone()).unwrap();
    let source = tempfile::tempdir().unwrap();

    let err = verifier
        .verify(&push_context(), source.path(), WorkspaceMode::Isolated)
        .await
        .unwrap_err();

    assert!(matches!(err, VerifyError::Launch { report: None, .. }));
    assert!(store.load("a1b2c3d").await.unwrap().is_none());
}
