//! Run condition model
//!
//! A step's `run_if` expression is a list of clauses joined with `&&`:
//!
//! ```text
//! always | never
//! event == push | event == pull_request | event != <kind>
//! target == default | target != default
//! target =~ <regex> | source =~ <regex>
//! ```

use crate::core::context::{EventKind, TriggerContext};
use regex::Regex;
use std::fmt;
use thiserror::Error;

/// Error raised when a `run_if` expression cannot be parsed
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConditionError {
    #[error("Empty condition clause in '{0}'")]
    EmptyClause(String),

    #[error("Unrecognized condition clause: '{0}'")]
    Unrecognized(String),

    #[error("Invalid regex in '{clause}': {message}")]
    InvalidRegex { clause: String, message: String },
}

/// Predicate over a trigger context (not serializable due to Regex)
#[derive(Debug, Clone)]
pub enum RunCondition {
    Always,
    Never,
    EventIs(EventKind),
    EventIsNot(EventKind),
    /// `true` = target must be the default branch, `false` = must not be
    TargetIsDefault(bool),
    TargetMatches(Regex),
    SourceMatches(Regex),
    All(Vec<RunCondition>),
}

impl RunCondition {
    /// Parse a `run_if` expression
    pub fn parse(expr: &str) -> Result<Self, ConditionError> {
        let clauses: Vec<&str> = expr.split("&&").map(str::trim).collect();
        if clauses.len() == 1 {
            return Self::parse_clause(clauses[0], expr);
        }

        clauses
            .into_iter()
            .map(|clause| Self::parse_clause(clause, expr))
            .collect::<Result<Vec<_>, _>>()
            .map(RunCondition::All)
    }

    fn parse_clause(clause: &str, expr: &str) -> Result<Self, ConditionError> {
        if clause.is_empty() {
            return Err(ConditionError::EmptyClause(expr.to_string()));
        }

        match clause {
            "always" => return Ok(RunCondition::Always),
            "never" => return Ok(RunCondition::Never),
            _ => {}
        }

        let (field, op, value) = split_clause(clause)
            .ok_or_else(|| ConditionError::Unrecognized(clause.to_string()))?;

        match (field, op) {
            ("event", "==") | ("event", "!=") => {
                let kind: EventKind = value
                    .parse()
                    .map_err(|_| ConditionError::Unrecognized(clause.to_string()))?;
                Ok(if op == "==" {
                    RunCondition::EventIs(kind)
                } else {
                    RunCondition::EventIsNot(kind)
                })
            }
            ("target", "==") | ("target", "!=") if value == "default" => {
                Ok(RunCondition::TargetIsDefault(op == "=="))
            }
            ("target", "=~") | ("source", "=~") => {
                let regex = Regex::new(value).map_err(|e| ConditionError::InvalidRegex {
                    clause: clause.to_string(),
                    message: e.to_string(),
                })?;
                Ok(if field == "target" {
                    RunCondition::TargetMatches(regex)
                } else {
                    RunCondition::SourceMatches(regex)
                })
            }
            _ => Err(ConditionError::Unrecognized(clause.to_string())),
        }
    }

    /// Evaluate the condition for a trigger context
    pub fn evaluate(&self, context: &TriggerContext) -> bool {
        match self {
            RunCondition::Always => true,
            RunCondition::Never => false,
            RunCondition::EventIs(kind) => context.event_kind == *kind,
            RunCondition::EventIsNot(kind) => context.event_kind != *kind,
            RunCondition::TargetIsDefault(expected) => {
                context.targets_default_branch() == *expected
            }
            RunCondition::TargetMatches(regex) => regex.is_match(&context.target_ref),
            RunCondition::SourceMatches(regex) => regex.is_match(&context.source_ref),
            RunCondition::All(conditions) => conditions.iter().all(|c| c.evaluate(context)),
        }
    }

    /// Whether this condition can only hold for pull request events
    pub fn requires_pull_request(&self) -> bool {
        match self {
            RunCondition::EventIs(kind) => *kind == EventKind::PullRequest,
            RunCondition::EventIsNot(kind) => *kind == EventKind::Push,
            RunCondition::All(conditions) => conditions.iter().any(|c| c.requires_pull_request()),
            _ => false,
        }
    }
}

impl Default for RunCondition {
    fn default() -> Self {
        RunCondition::Always
    }
}

impl fmt::Display for RunCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunCondition::Always => f.write_str("always"),
            RunCondition::Never => f.write_str("never"),
            RunCondition::EventIs(kind) => write!(f, "event == {}", kind),
            RunCondition::EventIsNot(kind) => write!(f, "event != {}", kind),
            RunCondition::TargetIsDefault(true) => f.write_str("target == default"),
            RunCondition::TargetIsDefault(false) => f.write_str("target != default"),
            RunCondition::TargetMatches(r) => write!(f, "target =~ {}", r.as_str()),
            RunCondition::SourceMatches(r) => write!(f, "source =~ {}", r.as_str()),
            RunCondition::All(conditions) => {
                let parts: Vec<String> = conditions.iter().map(|c| c.to_string()).collect();
                f.write_str(&parts.join(" && "))
            }
        }
    }
}

/// Split `field op value` on the leftmost operator
fn split_clause(clause: &str) -> Option<(&str, &str, &str)> {
    let (idx, op) = ["==", "!=", "=~"]
        .into_iter()
        .filter_map(|op| clause.find(op).map(|idx| (idx, op)))
        .min_by_key(|(idx, _)| *idx)?;

    let field = clause[..idx].trim();
    let value = clause[idx + op.len()..].trim();
    if field.is_empty() || value.is_empty() {
        return None;
    }
    Some((field, op, value))
}
