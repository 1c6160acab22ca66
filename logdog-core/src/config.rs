//! Watchdog configuration types
//!
//! This module defines the rule set the tracker is built from: named workflow
//! rules, entry nodes, completion nodes and the node extraction patterns.
//! The configuration is assembled before the engine starts and is never
//! mutated while it runs.

use crate::extractor::Extractor;
use crate::types::{Result, WatchError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Default pattern for `[pipeline_data.name=X] | enter` lines
pub const DEFAULT_ENTER_PATTERN: &str = r"\[pipeline_data\.name=(.*?)\]\s*\|\s*enter";

/// Default pattern for `[pipeline_data.name=X] | complete` lines
pub const DEFAULT_COMPLETE_PATTERN: &str = r"\[pipeline_data\.name=(.*?)\]\s*\|\s*complete";

/// Default pattern for `[node_name=X]` and bare `[pipeline_data.name=X]` tokens
pub const DEFAULT_GENERAL_PATTERN: &str = r"\[(?:node_name|pipeline_data\.name)=(.*?)\]";

/// Default pattern of text that disqualifies a general match when it follows it
pub const DEFAULT_EXCLUDE_PATTERN: &str = r"list=|result\.name=";

/// Complete watchdog configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Named workflow rules, in declaration order
    #[serde(default)]
    pub rules: Vec<RuleConfig>,

    /// Entry nodes that always restart tracking
    #[serde(default)]
    pub entries: Vec<EntryConfig>,

    /// Nodes that close an active workflow as successful
    #[serde(default)]
    pub completion_nodes: Vec<String>,

    /// Node extraction patterns
    #[serde(default)]
    pub patterns: PatternConfig,
}

/// A named, ordered sequence of expected transitions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleConfig {
    /// Rule name, used to attribute events
    pub name: String,
    /// Node that starts the rule
    #[serde(rename = "start")]
    pub start_node: String,
    /// Steps in order; each must be reached within its timeout
    pub steps: Vec<StepConfig>,
    /// Human readable description
    #[serde(default)]
    pub description: String,
}

/// One expected transition of a rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepConfig {
    /// Node that completes this step
    pub node: String,
    /// Maximum time to reach the node, in milliseconds (negative = no timeout)
    pub timeout_ms: i64,
}

/// An entry node and its display information
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryConfig {
    /// Display name reported in events
    pub name: String,
    /// Node id that triggers the entry
    pub node: String,
    /// Human readable description
    #[serde(default)]
    pub description: String,
}

/// Regular expressions used to pull node ids out of log lines
///
/// Each pattern must have one capturing group holding the node id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternConfig {
    /// Highest precedence pattern
    #[serde(default = "default_enter")]
    pub enter: String,

    /// Second precedence pattern
    #[serde(default = "default_complete")]
    pub complete: String,

    /// Fallback pattern, subject to `exclude`
    #[serde(default = "default_general")]
    pub general: String,

    /// Matches rejected when this occurs later in the line than a general match
    #[serde(default = "default_exclude")]
    pub exclude: String,

    /// Substrings a line must contain at least one of before any regex runs
    #[serde(default = "default_markers")]
    pub markers: Vec<String>,
}

fn default_enter() -> String {
    DEFAULT_ENTER_PATTERN.to_string()
}

fn default_complete() -> String {
    DEFAULT_COMPLETE_PATTERN.to_string()
}

fn default_general() -> String {
    DEFAULT_GENERAL_PATTERN.to_string()
}

fn default_exclude() -> String {
    DEFAULT_EXCLUDE_PATTERN.to_string()
}

fn default_markers() -> Vec<String> {
    vec!["pipeline_data.name".to_string(), "node_name".to_string()]
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            enter: default_enter(),
            complete: default_complete(),
            general: default_general(),
            exclude: default_exclude(),
            markers: default_markers(),
        }
    }
}

impl RuleConfig {
    /// Create a rule with no steps
    pub fn new(
        name: impl Into<String>,
        start_node: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            start_node: start_node.into(),
            steps: Vec::new(),
            description: description.into(),
        }
    }

    /// Builder method: append a step
    pub fn step(mut self, node: impl Into<String>, timeout_ms: i64) -> Self {
        self.steps.push(StepConfig {
            node: node.into(),
            timeout_ms,
        });
        self
    }

    /// Builder method: append steps from (node, timeout) pairs
    pub fn with_steps<I, S>(mut self, steps: I) -> Self
    where
        I: IntoIterator<Item = (S, i64)>,
        S: Into<String>,
    {
        self.steps.extend(steps.into_iter().map(|(node, timeout_ms)| StepConfig {
            node: node.into(),
            timeout_ms,
        }));
        self
    }

    /// Path rendered as `a(1000ms) -> b(500ms)`
    pub fn path_summary(&self) -> String {
        self.steps
            .iter()
            .map(|s| format!("{}({}ms)", s.node, s.timeout_ms))
            .collect::<Vec<_>>()
            .join(" -> ")
    }
}

impl EntryConfig {
    /// Create a new entry node
    pub fn new(
        name: impl Into<String>,
        node: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            node: node.into(),
            description: description.into(),
        }
    }
}

impl WatchConfig {
    /// Create an empty configuration with default patterns
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: add a rule (validated later by [`WatchConfig::validate`])
    pub fn with_rule(mut self, rule: RuleConfig) -> Self {
        self.rules.push(rule);
        self
    }

    /// Builder method: add an entry node
    pub fn with_entry(mut self, entry: EntryConfig) -> Self {
        self.entries.push(entry);
        self
    }

    /// Builder method: set the completion nodes
    pub fn with_completion_nodes<I, S>(mut self, nodes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.completion_nodes = nodes.into_iter().map(Into::into).collect();
        self
    }

    /// Builder method: replace the extraction patterns
    pub fn with_patterns(mut self, patterns: PatternConfig) -> Self {
        self.patterns = patterns;
        self
    }

    /// Add a rule, rejecting duplicate names and rules without steps
    pub fn insert_rule(&mut self, rule: RuleConfig) -> Result<()> {
        Self::check_rule(&rule)?;
        if self.rule(&rule.name).is_some() {
            return Err(WatchError::DuplicateRule(rule.name));
        }
        self.rules.push(rule);
        Ok(())
    }

    /// Look up a rule by name
    pub fn rule(&self, name: &str) -> Option<&RuleConfig> {
        self.rules.iter().find(|r| r.name == name)
    }

    /// Check the whole rule set (used for configurations built with `with_rule`
    /// or deserialized from a file)
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for rule in &self.rules {
            Self::check_rule(rule)?;
            if !seen.insert(rule.name.as_str()) {
                return Err(WatchError::DuplicateRule(rule.name.clone()));
            }
        }
        Extractor::from_patterns(&self.patterns)?;
        Ok(())
    }

    fn check_rule(rule: &RuleConfig) -> Result<()> {
        if rule.steps.is_empty() {
            return Err(WatchError::EmptyRule(rule.name.clone()));
        }
        Ok(())
    }
}
