//! Test: Cancellation - aborted runs, partial reports and superseded triggers

use crate::helpers::*;
use iac_verify::core::config::SupersedePolicy;
use iac_verify::core::{AbortCause, FailureReason, RunOutcome, SkipReason};
use iac_verify::execution::{Pipeline, Verification, Verifier, WorkspaceMode};
use iac_verify::persistence::{InMemoryReportStore, ReportStore};
use iac_verify::VerifyConfig;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinHandle;

type SpyVerifier = Verifier<Arc<SpyRunner>>;

fn verifier(config: &VerifyConfig, runner: Arc<SpyRunner>, store: Arc<InMemoryReportStore>) -> Arc<SpyVerifier> {
    Arc::new(Verifier::from_config(config, Pipeline::new(runner), store).unwrap())
}

fn spawn_verify(verifier: Arc<SpyVerifier>, change_id: &str, source: PathBuf) -> JoinHandle<Verification> {
    let ctx = pr_context(change_id);
    tokio::spawn(async move {
        verifier
            .verify(&ctx, &source, WorkspaceMode::Isolated)
            .await
            .unwrap()
    })
}

/// Cancelling during plan aborts the run and posts a partial report
#[tokio::test]
async fn test_cancel_after_completed_steps_posts_partial_report() {
    let runner = Arc::new(SpyRunner::new().script("plan", Scripted::Hang));
    let store = Arc::new(InMemoryReportStore::new());
    let verifier = verifier(&terraform_config(), runner.clone(), store.clone());
    let source = tempfile::tempdir().unwrap();

    let handle = spawn_verify(verifier.clone(), "42", source.path().to_path_buf());
    runner.wait_for("plan", 1).await;
    assert_eq!(verifier.coordinator().cancel("42"), 1);

    let verification = handle.await.unwrap();
    let run = &verification.run;
    assert_eq!(run.outcome, RunOutcome::Aborted);
    assert_eq!(run.abort_cause, Some(AbortCause::Cancelled));
    assert_eq!(run.completed_steps(), 3);
    assert_eq!(run.results[3].skip_reason, Some(SkipReason::Cancelled));

    let report = verification.report.unwrap();
    assert_eq!(report.body_text.lines().next(), Some("Aborted"));
    assert!(store.load("42").await.unwrap().is_some());
}

/// Cancelling before any step completes leaves no report behind
#[tokio::test]
async fn test_cancel_before_any_step_completes_posts_nothing() {
    let runner = Arc::new(SpyRunner::new().script("fmt", Scripted::Hang));
    let store = Arc::new(InMemoryReportStore::new());
    let verifier = verifier(&terraform_config(), runner.clone(), store.clone());
    let source = tempfile::tempdir().unwrap();

    let handle = spawn_verify(verifier.clone(), "42", source.path().to_path_buf());
    runner.wait_for("fmt", 1).await;
    verifier.coordinator().cancel("42");

    let verification = handle.await.unwrap();
    assert_eq!(verification.run.outcome, RunOutcome::Aborted);
    assert_eq!(verification.run.results.len(), 4);
    assert!(verification.report.is_none());
    assert!(store.load("42").await.unwrap().is_none());
}

/// With the cancel policy a second trigger for the same change stops the first
#[tokio::test]
async fn test_new_trigger_supersedes_in_flight_run() {
    let runner = Arc::new(SpyRunner::new().script("fmt", Scripted::HangFirst));
    let store = Arc::new(InMemoryReportStore::new());
    let verifier = verifier(&terraform_config(), runner.clone(), store.clone());
    let source = tempfile::tempdir().unwrap();

    let first = spawn_verify(verifier.clone(), "42", source.path().to_path_buf());
    runner.wait_for("fmt", 1).await;

    let second = spawn_verify(verifier.clone(), "42", source.path().to_path_buf())
        .await
        .unwrap();
    let first = first.await.unwrap();

    assert_eq!(first.run.outcome, RunOutcome::Aborted);
    assert!(first.report.is_none());
    assert_eq!(second.run.outcome, RunOutcome::Passed);

    let stored = store.load("42").await.unwrap().unwrap();
    assert_eq!(stored.report.revision, 1);
    assert!(stored.report.body_text.starts_with("Passed"));
    assert_eq!(verifier.coordinator().in_flight("42"), 0);
}

/// With the parallel policy both runs finish and both report
#[tokio::test]
async fn test_parallel_policy_lets_both_runs_finish() {
    let mut config = terraform_config();
    config.concurrency.on_superseded = SupersedePolicy::Parallel;
    if let Some(full) = config.pipelines.get_mut("full") {
        full.steps[0].timeout_secs = Some(1);
    }

    let runner = Arc::new(SpyRunner::new().script("fmt", Scripted::HangFirst));
    let store = Arc::new(InMemoryReportStore::new());
    let verifier = verifier(&config, runner.clone(), store.clone());
    let source = tempfile::tempdir().unwrap();

    let first = spawn_verify(verifier.clone(), "42", source.path().to_path_buf());
    runner.wait_for("fmt", 1).await;
    let second = spawn_verify(verifier.clone(), "42", source.path().to_path_buf())
        .await
        .unwrap();
    let first = first.await.unwrap();

    assert_eq!(second.run.outcome, RunOutcome::Passed);
    assert_eq!(first.run.outcome, RunOutcome::Failed);
    assert_eq!(first.run.results[0].failure, Some(FailureReason::Timeout));

    // Last committed revision wins
    let stored = store.load("42").await.unwrap().unwrap();
    assert_eq!(stored.report.revision, 2);
    assert!(stored.report.body_text.starts_with("Failed"));
}

/// Partial reports can be switched off
#[tokio::test]
async fn test_partial_reports_disabled() {
    let mut config = terraform_config();
    config.report.publish_partial_on_abort = false;

    let runner = Arc::new(SpyRunner::new().script("plan", Scripted::Hang));
    let store = Arc::new(InMemoryReportStore::new());
    let verifier = verifier(&config, runner.clone(), store.clone());
    let source = tempfile::tempdir().unwrap();

    let handle = spawn_verify(verifier.clone(), "42", source.path().to_path_buf());
    runner.wait_for("plan", 1).await;
    verifier.coordinator().cancel("42");

    let verification = handle.await.unwrap();
    assert_eq!(verification.run.outcome, RunOutcome::Aborted);
    assert!(verification.report.is_none());
    assert!(store.load("42").await.unwrap().is_none());
}
