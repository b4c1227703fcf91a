//! Test: Gating - halt on failure, run conditions, required prior success

use crate::helpers::*;
use iac_verify::core::{FailureReason, RunCondition, RunOutcome, SkipReason, Step, StepStatus};
use std::sync::Arc;
use std::time::Duration;

/// A false run condition skips the step without touching the runner
#[tokio::test]
async fn test_false_condition_never_invokes_runner() {
    let steps = vec![Step::new("comment", vec!["post".to_string()]).with_run_if(RunCondition::Never)];
    let runner = Arc::new(SpyRunner::new());

    let run = run_steps(runner.clone(), &steps, &pr_context("42")).await;

    assert_eq!(runner.calls_for("comment"), 0);
    assert_statuses(&run, &[StepStatus::Skipped]);
    assert_eq!(run.results[0].skip_reason, Some(SkipReason::Condition));
    assert_eq!(run.outcome, RunOutcome::Passed);
}

/// A halting failure at index i invokes the runner exactly i + 1 times
#[tokio::test]
async fn test_halting_failure_at_each_index() {
    let names = ["fmt", "init", "validate"];

    for (i, failing) in names.iter().enumerate() {
        let runner = Arc::new(SpyRunner::new().script(failing, Scripted::Exit(1)));
        let steps = iac_steps();

        let run = run_steps(runner.clone(), &steps, &pr_context("42")).await;

        assert_eq!(run.results.len(), steps.len());
        assert_eq!(run.outcome, RunOutcome::Failed);
        assert_eq!(runner.call_count(), i + 1, "failing step {}", failing);
        assert!(run.results[i + 1..]
            .iter()
            .all(|r| r.skip_reason == Some(SkipReason::Halted)));
    }
}

/// A non-halting failure keeps going, but steps needing a clean run are skipped
#[tokio::test]
async fn test_soft_failure_blocks_plan() {
    let steps = vec![
        Step::new("lint", vec!["tflint".to_string()]).with_halt_on_failure(false),
        Step::new("fmt", vec!["terraform".to_string(), "fmt".to_string()]),
        Step::new("plan", vec!["terraform".to_string(), "plan".to_string()]).with_requires_success(true),
    ];
    let runner = Arc::new(SpyRunner::new().script("lint", Scripted::Exit(2)));

    let run = run_steps(runner.clone(), &steps, &pr_context("42")).await;

    assert_execution_order(&runner, &["lint", "fmt"]);
    assert_statuses(&run, &[StepStatus::Failed, StepStatus::Success, StepStatus::Skipped]);
    assert_eq!(run.results[2].skip_reason, Some(SkipReason::PriorFailure));
    assert_eq!(run.outcome, RunOutcome::Failed);
}

/// A timeout gates exactly like a failing exit code
#[tokio::test]
async fn test_timeout_halts_like_failure() {
    let mut steps = iac_steps();
    steps[1] = steps[1].clone().with_timeout(Duration::from_millis(50));
    let runner = Arc::new(SpyRunner::new().script("init", Scripted::Hang));

    let run = run_steps(runner.clone(), &steps, &pr_context("42")).await;

    assert_eq!(run.results[1].failure, Some(FailureReason::Timeout));
    assert_statuses(
        &run,
        &[StepStatus::Success, StepStatus::Failed, StepStatus::Skipped, StepStatus::Skipped],
    );
    assert_eq!(run.outcome, RunOutcome::Failed);
    assert_eq!(runner.call_count(), 2);
}
