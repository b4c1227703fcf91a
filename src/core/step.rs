//! Step domain model

use crate::core::condition::RunCondition;
use std::collections::HashMap;
use std::time::Duration;

/// A single verification step in a pipeline
#[derive(Debug, Clone)]
pub struct Step {
    /// Step name, unique within its pipeline
    pub name: String,

    /// Command template: executable followed by its arguments
    pub command: Vec<String>,

    /// Predicate deciding whether the step runs for a trigger
    pub run_if: RunCondition,

    /// Stop the pipeline when this step fails
    pub halt_on_failure: bool,

    /// Skip this step if any earlier step failed
    pub requires_success: bool,

    /// Wall-clock budget for the command
    pub timeout: Duration,

    /// Extra environment variables for the command
    pub env: HashMap<String, String>,
}

impl Step {
    /// Create a step that always runs, halts on failure, and uses the default timeout
    pub fn new(name: impl Into<String>, command: Vec<String>) -> Self {
        Self {
            name: name.into(),
            command,
            run_if: RunCondition::Always,
            halt_on_failure: true,
            requires_success: false,
            timeout: Duration::from_secs(StepDefaults::default().timeout_secs),
            env: HashMap::new(),
        }
    }

    pub fn with_run_if(mut self, condition: RunCondition) -> Self {
        self.run_if = condition;
        self
    }

    pub fn with_halt_on_failure(mut self, halt: bool) -> Self {
        self.halt_on_failure = halt;
        self
    }

    pub fn with_requires_success(mut self, requires: bool) -> Self {
        self.requires_success = requires;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Render the command with variable substitution
    pub fn render_command(&self, variables: &HashMap<String, String>) -> Vec<String> {
        self.command
            .iter()
            .map(|arg| render_template(arg, variables))
            .collect()
    }
}

/// Replace variables in the form {{ variable_name }}
pub fn render_template(template: &str, variables: &HashMap<String, String>) -> String {
    let mut rendered = template.to_string();
    for (key, value) in variables {
        let placeholder = format!("{{{{ {} }}}}", key);
        rendered = rendered.replace(&placeholder, value);
    }
    rendered
}

#[derive(Debug, Clone)]
pub struct StepDefaults {
    pub timeout_secs: u64,
}

impl Default for StepDefaults {
    fn default() -> Self {
        Self {
            timeout_secs: 600, // 10 minutes
        }
    }
}
