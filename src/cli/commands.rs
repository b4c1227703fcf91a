//! CLI command definitions

use crate::core::{EventKind, TriggerContext};
use anyhow::{bail, Context, Result};
use clap::Args;
use std::path::PathBuf;

/// Trigger description, given as flags or as a JSON file
#[derive(Debug, Args, Clone)]
pub struct ContextArgs {
    /// Read the trigger context from a JSON file instead of flags
    #[arg(long, conflicts_with_all = ["event", "source", "target", "change_id"])]
    pub context: Option<PathBuf>,

    /// Event kind (push or pull_request)
    #[arg(short, long)]
    pub event: Option<EventKind>,

    /// Branch being pushed, or the pull request's source branch
    #[arg(short, long)]
    pub source: Option<String>,

    /// Branch the pull request targets (defaults to the source for pushes)
    #[arg(short, long)]
    pub target: Option<String>,

    /// Change identifier the report is keyed by (PR number or commit)
    #[arg(long)]
    pub change_id: Option<String>,
}

impl ContextArgs {
    /// Build the trigger context, filling in the configured default branch
    pub fn to_context(&self, default_branch: &str) -> Result<TriggerContext> {
        if let Some(path) = &self.context {
            let ctx = TriggerContext::from_json_file(path)?;
            return Ok(ctx.with_default_branch(default_branch));
        }

        let event = self.event.context("--event is required without --context")?;
        let source = self
            .source
            .clone()
            .context("--source is required without --context")?;
        let change_id = self
            .change_id
            .clone()
            .context("--change-id is required without --context")?;

        let ctx = match event {
            EventKind::Push => {
                if self.target.as_ref().is_some_and(|t| *t != source) {
                    bail!("A push has no separate target branch");
                }
                TriggerContext::push(source, change_id)
            }
            EventKind::PullRequest => {
                let target = self
                    .target
                    .clone()
                    .context("--target is required for pull requests")?;
                TriggerContext::pull_request(source, target, change_id)
            }
        };

        Ok(ctx.with_default_branch(default_branch))
    }
}

/// Where reports are kept between runs
#[derive(Debug, Args, Clone)]
pub struct StoreArgs {
    /// Path to the report database (defaults to the user data directory)
    #[arg(long)]
    pub db: Option<PathBuf>,

    /// Keep reports in memory only
    #[arg(long, conflicts_with = "db")]
    pub in_memory: bool,
}

/// Run the pipeline selected for a trigger
#[derive(Debug, Args, Clone)]
pub struct RunCommand {
    #[command(flatten)]
    pub trigger: ContextArgs,

    #[command(flatten)]
    pub store: StoreArgs,

    /// Infrastructure configuration tree to verify
    #[arg(short, long, default_value = ".")]
    pub workdir: PathBuf,

    /// Run steps directly in the tree instead of a temporary copy
    #[arg(long)]
    pub in_place: bool,

    /// Directory the report is published to, one file per change
    #[arg(long)]
    pub report_dir: Option<PathBuf>,

    /// Skip storing and publishing the report
    #[arg(long, conflicts_with = "report_dir")]
    pub no_report: bool,

    /// Print the finished run as JSON
    #[arg(long)]
    pub json: bool,
}

/// Validate a configuration file
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Show which pipeline a trigger would run
#[derive(Debug, Args, Clone)]
pub struct SelectCommand {
    #[command(flatten)]
    pub trigger: ContextArgs,
}

/// Show stored reports
#[derive(Debug, Args, Clone)]
pub struct ReportCommand {
    /// Change to show; lists all reports when omitted
    #[arg(long)]
    pub change_id: Option<String>,

    #[command(flatten)]
    pub store: StoreArgs,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}
