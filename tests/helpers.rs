//! Test utility functions for iac-verify
#![allow(dead_code)]

use async_trait::async_trait;
use iac_verify::core::{PipelineRun, RunCondition, Step, StepResult, StepStatus, TriggerContext};
use iac_verify::execution::Pipeline;
use iac_verify::runner::{RunnerError, StepRunner};
use iac_verify::VerifyConfig;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// What the spy runner does for a step
#[derive(Debug, Clone)]
pub enum Scripted {
    /// Exit with this code and no output
    Exit(i32),
    /// Succeed with this stdout
    Output(String),
    /// Fail to start the command
    Launch(String),
    /// Block until cancelled or timed out
    Hang,
    /// Hang on the first invocation only, succeed afterwards
    HangFirst,
}

/// Runner that records every invocation; unscripted steps succeed
#[derive(Default)]
pub struct SpyRunner {
    scripts: HashMap<String, Scripted>,
    calls: Mutex<Vec<String>>,
}

impl SpyRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(mut self, step: &str, scripted: Scripted) -> Self {
        self.scripts.insert(step.to_string(), scripted);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls_for(&self, step: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| *c == step).count()
    }

    /// Wait until `step` has been invoked at least `times` times
    pub async fn wait_for(&self, step: &str, times: usize) {
        while self.calls_for(step) < times {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

async fn hang(step: &Step, cancel: &CancellationToken) -> Result<StepResult, RunnerError> {
    tokio::select! {
        _ = cancel.cancelled() => Err(RunnerError::cancelled(&step.name)),
        _ = tokio::time::sleep(step.timeout) => Ok(StepResult::timed_out(
            &step.name,
            String::new(),
            String::new(),
            step.timeout.as_millis() as u64,
        )),
    }
}

#[async_trait]
impl StepRunner for SpyRunner {
    async fn run(
        &self,
        step: &Step,
        _workdir: &Path,
        _context: &TriggerContext,
        cancel: &CancellationToken,
    ) -> Result<StepResult, RunnerError> {
        let invocation = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(step.name.clone());
            calls.iter().filter(|c| **c == step.name).count()
        };

        match self.scripts.get(&step.name) {
            None => Ok(StepResult::success(&step.name, String::new(), String::new(), 1)),
            Some(Scripted::Exit(code)) => Ok(StepResult::failed(
                &step.name,
                Some(*code),
                String::new(),
                format!("{} exited with {}", step.name, code),
                1,
            )),
            Some(Scripted::Output(stdout)) => {
                Ok(StepResult::success(&step.name, stdout.clone(), String::new(), 1))
            }
            Some(Scripted::Launch(message)) => Err(RunnerError::launch(&step.name, message.clone())),
            Some(Scripted::Hang) => hang(step, cancel).await,
            Some(Scripted::HangFirst) if invocation == 1 => hang(step, cancel).await,
            Some(Scripted::HangFirst) => Ok(StepResult::success(&step.name, String::new(), String::new(), 1)),
        }
    }
}

fn command(name: &str) -> Vec<String> {
    vec!["terraform".to_string(), name.to_string()]
}

/// The canonical fmt → init → validate → plan pipeline
pub fn iac_steps() -> Vec<Step> {
    vec![
        Step::new("fmt", command("fmt")),
        Step::new("init", command("init")),
        Step::new("validate", command("validate")),
        Step::new("plan", command("plan"))
            .with_halt_on_failure(false)
            .with_requires_success(true)
            .with_run_if(RunCondition::EventIs(iac_verify::core::EventKind::PullRequest)),
    ]
}

pub fn push_context() -> TriggerContext {
    TriggerContext::push("main", "a1b2c3d")
}

pub fn pr_context(change_id: &str) -> TriggerContext {
    TriggerContext::pull_request("feature/vpc", "main", change_id)
}

/// Execute `steps` over a spy runner in the current directory
pub async fn run_steps(
    runner: Arc<SpyRunner>,
    steps: &[Step],
    context: &TriggerContext,
) -> PipelineRun {
    Pipeline::new(runner)
        .execute("full", steps, context, Path::new("."), &CancellationToken::new())
        .await
}

pub const TERRAFORM_CONFIG: &str = r#"
default_branch: main
defaults:
  timeout_secs: 30
pipelines:
  verify:
    steps:
      - name: fmt
        command: ["terraform", "fmt", "-check", "-recursive"]
        halt_on_failure: true
      - name: init
        command: ["terraform", "init", "-input=false"]
        halt_on_failure: true
      - name: validate
        command: ["terraform", "validate"]
        halt_on_failure: true
  full:
    steps:
      - name: fmt
        command: ["terraform", "fmt", "-check", "-recursive"]
        halt_on_failure: true
      - name: init
        command: ["terraform", "init", "-input=false"]
        halt_on_failure: true
      - name: validate
        command: ["terraform", "validate"]
        halt_on_failure: true
      - name: plan
        command: ["terraform", "plan", "-no-color", "-input=false"]
        run_if: "event == pull_request"
        requires_success: true
"#;

pub fn terraform_config() -> VerifyConfig {
    VerifyConfig::from_yaml(TERRAFORM_CONFIG).unwrap()
}

/// Assert the statuses of a run, in step order
pub fn assert_statuses(run: &PipelineRun, expected: &[StepStatus]) {
    assert_eq!(
        run.statuses(),
        expected.to_vec(),
        "unexpected statuses for pipeline {}",
        run.pipeline_name
    );
}

/// Assert the order the runner saw steps in
pub fn assert_execution_order(runner: &SpyRunner, expected: &[&str]) {
    assert_eq!(runner.calls(), expected, "unexpected execution order");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_spy_runner_records_calls() {
        let runner = Arc::new(SpyRunner::new().script("init", Scripted::Exit(1)));
        let run = run_steps(runner.clone(), &iac_steps(), &pr_context("1")).await;

        assert_execution_order(&runner, &["fmt", "init"]);
        assert_eq!(runner.calls_for("fmt"), 1);
        assert_eq!(run.results.len(), 4);
    }
}
