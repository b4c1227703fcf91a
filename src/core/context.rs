//! Trigger context - the event metadata a run is started from

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Kind of version-control event that triggered a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A push to a branch
    Push,
    /// A pull request opened or updated
    PullRequest,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Push => "push",
            EventKind::PullRequest => "pull_request",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "push" => Ok(EventKind::Push),
            "pull_request" | "pull-request" | "pr" => Ok(EventKind::PullRequest),
            other => Err(format!("Unknown event kind: {}", other)),
        }
    }
}

/// Metadata describing the event that initiated a pipeline run
///
/// Created once per invocation and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerContext {
    /// Push or pull request
    pub event_kind: EventKind,

    /// Branch the change comes from
    pub source_ref: String,

    /// Branch the change targets (the pushed branch for push events)
    pub target_ref: String,

    /// Commit SHA or pull request number
    pub change_id: String,

    /// Repository default branch, used by gating and run conditions
    #[serde(default = "default_branch")]
    pub default_branch: String,
}

fn default_branch() -> String {
    "main".to_string()
}

impl TriggerContext {
    /// Context for a push to `branch`
    pub fn push(branch: impl Into<String>, change_id: impl Into<String>) -> Self {
        let branch = branch.into();
        Self {
            event_kind: EventKind::Push,
            source_ref: branch.clone(),
            target_ref: branch,
            change_id: change_id.into(),
            default_branch: default_branch(),
        }
    }

    /// Context for a pull request from `source` into `target`
    pub fn pull_request(
        source: impl Into<String>,
        target: impl Into<String>,
        change_id: impl Into<String>,
    ) -> Self {
        Self {
            event_kind: EventKind::PullRequest,
            source_ref: source.into(),
            target_ref: target.into(),
            change_id: change_id.into(),
            default_branch: default_branch(),
        }
    }

    pub fn with_default_branch(mut self, branch: impl Into<String>) -> Self {
        self.default_branch = branch.into();
        self
    }

    /// Load a context from a JSON event file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Whether the change targets the repository default branch
    pub fn targets_default_branch(&self) -> bool {
        self.target_ref == self.default_branch
    }

    /// Variables available to step command templates
    pub fn template_variables(&self) -> HashMap<String, String> {
        let mut vars = HashMap::new();
        vars.insert("event".to_string(), self.event_kind.to_string());
        vars.insert("source_ref".to_string(), self.source_ref.clone());
        vars.insert("target_ref".to_string(), self.target_ref.clone());
        vars.insert("change_id".to_string(), self.change_id.clone());
        vars.insert("default_branch".to_string(), self.default_branch.clone());
        vars
    }

    /// Environment exported to every step process
    pub fn environment(&self) -> Vec<(String, String)> {
        vec![
            ("IAC_VERIFY_EVENT".to_string(), self.event_kind.to_string()),
            ("IAC_VERIFY_SOURCE_REF".to_string(), self.source_ref.clone()),
            ("IAC_VERIFY_TARGET_REF".to_string(), self.target_ref.clone()),
            ("IAC_VERIFY_CHANGE_ID".to_string(), self.change_id.clone()),
        ]
    }
}
