//! Pipeline definitions and the process-wide catalog

use crate::core::step::Step;
use std::collections::BTreeMap;

/// An ordered list of steps under a name
#[derive(Debug, Clone)]
pub struct PipelineDefinition {
    pub name: String,
    pub steps: Vec<Step>,
}

impl PipelineDefinition {
    pub fn new(name: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            name: name.into(),
            steps,
        }
    }

    /// Get a step by name
    pub fn step(&self, name: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.name == name)
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name.as_str()).collect()
    }
}

/// Pipeline name → definition, built once from configuration
///
/// The catalog has no mutating methods; share it behind an `Arc`.
#[derive(Debug, Clone, Default)]
pub struct PipelineCatalog {
    pipelines: BTreeMap<String, PipelineDefinition>,
}

impl PipelineCatalog {
    pub fn new(definitions: impl IntoIterator<Item = PipelineDefinition>) -> Self {
        Self {
            pipelines: definitions
                .into_iter()
                .map(|def| (def.name.clone(), def))
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&PipelineDefinition> {
        self.pipelines.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.pipelines.contains_key(name)
    }

    /// Pipeline names in sorted order
    pub fn names(&self) -> Vec<&str> {
        self.pipelines.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }
}
