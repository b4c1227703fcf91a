//! Trigger gate - picks the pipeline variant for an event

use crate::core::{
    context::{EventKind, TriggerContext},
    pipeline::{PipelineCatalog, PipelineDefinition},
    step::Step,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Which target branches a trigger rule applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetMatch {
    /// The repository default branch
    Default,
    /// Any branch other than the default
    Other,
    /// Every branch
    Any,
}

impl TargetMatch {
    fn matches(&self, targets_default: bool) -> bool {
        match self {
            TargetMatch::Default => targets_default,
            TargetMatch::Other => !targets_default,
            TargetMatch::Any => true,
        }
    }
}

/// One row of the trigger table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerRule {
    pub event: EventKind,
    pub target: TargetMatch,
    pub pipeline: String,
}

impl TriggerRule {
    pub fn new(event: EventKind, target: TargetMatch, pipeline: impl Into<String>) -> Self {
        Self {
            event,
            target,
            pipeline: pipeline.into(),
        }
    }
}

/// Pipeline used for pushes and for pull requests into other branches
pub const VERIFY_PIPELINE: &str = "verify";

/// Pipeline used for pull requests into the default branch
pub const FULL_PIPELINE: &str = "full";

/// Built-in trigger table
pub fn default_rules() -> Vec<TriggerRule> {
    vec![
        TriggerRule::new(EventKind::PullRequest, TargetMatch::Default, FULL_PIPELINE),
        TriggerRule::new(EventKind::PullRequest, TargetMatch::Other, VERIFY_PIPELINE),
        TriggerRule::new(EventKind::Push, TargetMatch::Any, VERIFY_PIPELINE),
    ]
}

/// Stateless lookup from (event kind, targets default branch?) to a pipeline
#[derive(Debug, Clone)]
pub struct TriggerGate {
    rules: Vec<TriggerRule>,
    catalog: Arc<PipelineCatalog>,
}

impl TriggerGate {
    pub fn new(rules: Vec<TriggerRule>, catalog: Arc<PipelineCatalog>) -> Self {
        Self { rules, catalog }
    }

    /// Gate using the built-in trigger table
    pub fn with_default_rules(catalog: Arc<PipelineCatalog>) -> Self {
        Self::new(default_rules(), catalog)
    }

    pub fn rules(&self) -> &[TriggerRule] {
        &self.rules
    }

    /// Name of the pipeline for this context; first matching rule wins
    pub fn select(&self, context: &TriggerContext) -> Option<&str> {
        let targets_default = context.targets_default_branch();
        self.rules
            .iter()
            .find(|rule| rule.event == context.event_kind && rule.target.matches(targets_default))
            .map(|rule| rule.pipeline.as_str())
    }

    /// Pipeline definition for this context
    pub fn select_definition(&self, context: &TriggerContext) -> Option<&PipelineDefinition> {
        self.select(context).and_then(|name| self.catalog.get(name))
    }

    /// Ordered steps for this context
    pub fn select_pipeline(&self, context: &TriggerContext) -> Option<&[Step]> {
        self.select_definition(context).map(|def| def.steps.as_slice())
    }
}
