//! Verification configuration from YAML

use crate::core::{
    condition::RunCondition,
    pipeline::{PipelineCatalog, PipelineDefinition},
    step::{Step, StepDefaults},
    trigger::{default_rules, TriggerGate, TriggerRule},
};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Top-level configuration loaded from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyConfig {
    /// Repository default branch
    #[serde(default = "default_branch")]
    pub default_branch: String,

    #[serde(default)]
    pub defaults: DefaultsConfig,

    #[serde(default)]
    pub report: ReportSettings,

    #[serde(default)]
    pub concurrency: ConcurrencySettings,

    /// Trigger table; the built-in table is used when absent
    #[serde(default)]
    pub triggers: Option<Vec<TriggerRule>>,

    /// Pipeline name → definition
    pub pipelines: BTreeMap<String, PipelineConfig>,
}

/// Defaults applied to every step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Default timeout for steps (in seconds)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Grace period after killing a step process (in seconds)
    #[serde(default = "default_kill_grace_secs")]
    pub kill_grace_secs: u64,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            kill_grace_secs: default_kill_grace_secs(),
        }
    }
}

/// How reports are rendered and committed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportSettings {
    /// Maximum output lines shown per step
    #[serde(default = "default_excerpt_lines")]
    pub excerpt_lines: usize,

    /// Maximum output bytes shown per step
    #[serde(default = "default_excerpt_bytes")]
    pub excerpt_bytes: usize,

    /// Re-read and retry attempts after a revision conflict
    #[serde(default = "default_max_conflict_retries")]
    pub max_conflict_retries: usize,

    /// Upsert a partial report for an aborted run with completed steps
    #[serde(default = "default_true")]
    pub publish_partial_on_abort: bool,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            excerpt_lines: default_excerpt_lines(),
            excerpt_bytes: default_excerpt_bytes(),
            max_conflict_retries: default_max_conflict_retries(),
            publish_partial_on_abort: true,
        }
    }
}

/// What happens when a new trigger arrives for a change with a run in flight
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SupersedePolicy {
    /// Cancel the in-flight run
    #[default]
    Cancel,
    /// Let both run; the last committed report wins
    Parallel,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ConcurrencySettings {
    #[serde(default)]
    pub on_superseded: SupersedePolicy,
}

/// Pipeline definition as written in YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Optional description
    #[serde(default)]
    pub description: Option<String>,

    /// Steps in execution order
    pub steps: Vec<StepConfig>,
}

/// Step configuration as defined in YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepConfig {
    /// Step name, unique within its pipeline
    pub name: String,

    /// Executable and arguments; arguments may use {{ variable }} templates
    pub command: Vec<String>,

    /// Run condition expression
    #[serde(default)]
    pub run_if: Option<String>,

    /// Stop the pipeline if this step fails
    #[serde(default)]
    pub halt_on_failure: bool,

    /// Skip this step if any earlier step failed
    #[serde(default)]
    pub requires_success: bool,

    /// Timeout for this step (overrides defaults)
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    /// Extra environment variables
    #[serde(default)]
    pub env: HashMap<String, String>,
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_timeout_secs() -> u64 {
    StepDefaults::default().timeout_secs
}

fn default_kill_grace_secs() -> u64 {
    5
}

fn default_excerpt_lines() -> usize {
    40
}

fn default_excerpt_bytes() -> usize {
    4000
}

fn default_max_conflict_retries() -> usize {
    3
}

fn default_true() -> bool {
    true
}

impl VerifyConfig {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: VerifyConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.pipelines.is_empty() {
            anyhow::bail!("No pipelines defined");
        }

        for (name, pipeline) in &self.pipelines {
            let mut seen = HashSet::new();
            for step in &pipeline.steps {
                if !seen.insert(&step.name) {
                    anyhow::bail!("Duplicate step name '{}' in pipeline '{}'", step.name, name);
                }

                if step.command.is_empty() || step.command[0].trim().is_empty() {
                    anyhow::bail!("Step '{}' in pipeline '{}' has an empty command", step.name, name);
                }

                if step.timeout_secs == Some(0) {
                    anyhow::bail!("Step '{}' in pipeline '{}' has a zero timeout", step.name, name);
                }

                if let Some(expr) = &step.run_if {
                    RunCondition::parse(expr).with_context(|| {
                        format!("Invalid run_if for step '{}' in pipeline '{}'", step.name, name)
                    })?;
                }
            }
        }

        for rule in self.trigger_rules() {
            if !self.pipelines.contains_key(&rule.pipeline) {
                anyhow::bail!(
                    "Trigger for {} events references non-existent pipeline '{}'",
                    rule.event,
                    rule.pipeline
                );
            }
        }

        if self.defaults.timeout_secs == 0 {
            anyhow::bail!("Default timeout must be greater than zero");
        }

        Ok(())
    }

    /// Trigger table in effect
    pub fn trigger_rules(&self) -> Vec<TriggerRule> {
        self.triggers.clone().unwrap_or_else(default_rules)
    }

    pub fn kill_grace(&self) -> Duration {
        Duration::from_secs(self.defaults.kill_grace_secs)
    }

    /// Build the pipeline catalog
    pub fn to_catalog(&self) -> Result<PipelineCatalog> {
        let defaults = StepDefaults {
            timeout_secs: self.defaults.timeout_secs,
        };

        let definitions = self
            .pipelines
            .iter()
            .map(|(name, pipeline)| {
                let steps = pipeline
                    .steps
                    .iter()
                    .map(|step| Step::from_config(step, &defaults))
                    .collect::<Result<Vec<_>>>()?;
                Ok(PipelineDefinition::new(name.clone(), steps))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(PipelineCatalog::new(definitions))
    }

    /// Build the trigger gate over a shared catalog
    pub fn to_gate(&self, catalog: Arc<PipelineCatalog>) -> TriggerGate {
        TriggerGate::new(self.trigger_rules(), catalog)
    }
}

impl Step {
    /// Create a step from a step config
    pub fn from_config(config: &StepConfig, defaults: &StepDefaults) -> Result<Self> {
        let run_if = match &config.run_if {
            Some(expr) => RunCondition::parse(expr)?,
            None => RunCondition::Always,
        };

        Ok(Step {
            name: config.name.clone(),
            command: config.command.clone(),
            run_if,
            halt_on_failure: config.halt_on_failure,
            requires_success: config.requires_success,
            timeout: Duration::from_secs(config.timeout_secs.unwrap_or(defaults.timeout_secs)),
            env: config.env.clone(),
        })
    }
}
