//! Core types for the LogDog watchdog library
//!
//! This module defines the events the engine emits to its observer and the
//! error type shared by every component. Events are plain data: the library
//! never prints or forwards them anywhere itself.

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::time::Instant;

/// Result type for watchdog operations
pub type Result<T> = std::result::Result<T, WatchError>;

/// Rule name attributed to completions reached through a completion node
pub const FINAL_RULE: &str = "Final";

/// Errors that can occur while configuring or running the watchdog
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("Failed to open log file {path:?}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Rule already defined: {0}")]
    DuplicateRule(String),

    #[error("Rule has no transitions: {0}")]
    EmptyRule(String),

    #[error("Invalid poll interval: {0} seconds")]
    InvalidInterval(f64),

    #[error("Invalid node pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Kind of a watchdog event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EventKind {
    /// A workflow position was entered (cold start or after a transition)
    Activated,
    /// A step finished, or a completion node closed the workflow
    Completed,
    /// No valid next node arrived within the allotted time
    Timeout,
    /// An entry node arrived while a workflow was in flight
    Interrupted,
    /// An entry node arrived and tracking restarted from it
    EntryDetected,
    /// A node was recognized in the log (trace only, independent of state)
    DiagnosticLog,
}

impl EventKind {
    /// Every kind, in declaration order
    pub const ALL: [EventKind; 6] = [
        EventKind::Activated,
        EventKind::Completed,
        EventKind::Timeout,
        EventKind::Interrupted,
        EventKind::EntryDetected,
        EventKind::DiagnosticLog,
    ];

    /// Stable name used in output and configuration files
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Activated => "Activated",
            EventKind::Completed => "Completed",
            EventKind::Timeout => "Timeout",
            EventKind::Interrupted => "Interrupted",
            EventKind::EntryDetected => "EntryDetected",
            EventKind::DiagnosticLog => "DiagnosticLog",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single event delivered to the observer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WatchEvent {
    /// What happened
    pub kind: EventKind,
    /// Owning rule name, entry display name, or [`FINAL_RULE`]
    pub name: String,
    /// Node the event refers to
    pub node: String,
    /// Rule or entry description
    pub description: String,
    /// Time spent in the position the event closes, in whole milliseconds
    pub elapsed_ms: u64,
    /// Nodes that would have satisfied the pending transition (timeouts only)
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub expected: Vec<String>,
}

impl WatchEvent {
    /// Create an event without expected nodes
    pub fn new(
        kind: EventKind,
        name: impl Into<String>,
        node: impl Into<String>,
        description: impl Into<String>,
        elapsed_ms: u64,
    ) -> Self {
        Self {
            kind,
            name: name.into(),
            node: node.into(),
            description: description.into(),
            elapsed_ms,
            expected: Vec::new(),
        }
    }

    /// Trace event emitted for every recognized node
    pub fn diagnostic(node: impl Into<String>) -> Self {
        Self::new(EventKind::DiagnosticLog, "", node, "Node Detected", 0)
    }

    /// Builder method: attach the nodes a timeout was waiting for
    pub fn with_expected(mut self, expected: Vec<String>) -> Self {
        self.expected = expected;
        self
    }
}

impl fmt::Display for WatchEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}] node={}", self.kind, self.name, self.node)?;
        if self.elapsed_ms > 0 {
            write!(f, " elapsed={}ms", self.elapsed_ms)?;
        }
        if !self.expected.is_empty() {
            write!(f, " expected=[{}]", self.expected.join(", "))?;
        }
        if !self.description.is_empty() {
            write!(f, " - {}", self.description)?;
        }
        Ok(())
    }
}

/// Whole milliseconds between two instants, truncated
pub(crate) fn elapsed_ms(since: Instant, now: Instant) -> u64 {
    let millis = now.saturating_duration_since(since).as_millis();
    u64::try_from(millis).unwrap_or(u64::MAX)
}
