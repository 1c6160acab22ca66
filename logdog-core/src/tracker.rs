//! Transition tracking state machine
//!
//! Rules are flattened into a graph: every step of a rule becomes an edge
//! from the previous node to the step's node, tagged with the rule name.
//! Edges leaving the same node keep declaration order (rule order first,
//! then step order), which is the tie-break when several edges share a
//! target.
//!
//! Only one position is tracked at a time. It is entered on an entry node
//! or, while idle, on any node with outgoing edges; it moves along matching
//! edges and is cleared by completion, interruption or timeout.

use crate::config::{EntryConfig, WatchConfig};
use crate::types::{elapsed_ms, EventKind, WatchEvent, FINAL_RULE};
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

/// A flattened transition between two nodes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    /// Node that completes the transition
    pub target: String,
    /// Allowed time in milliseconds (negative = no timeout)
    pub timeout_ms: i64,
    /// Rule that declared the transition
    pub rule: String,
    /// Description of that rule
    pub description: String,
}

/// The in-flight workflow position
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivePosition {
    /// Node most recently reached
    pub node: String,
    /// Rule (or entry name) the position is attributed to
    pub rule: String,
    /// Description reported alongside the position
    pub description: String,
    /// When the node was reached
    pub entered_at: Instant,
    /// Smallest timeout over the node's outgoing edges, if any
    pub threshold: Option<Duration>,
}

/// Tracker state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerState {
    Idle,
    Active(ActivePosition),
}

/// The transition tracker
#[derive(Debug, Clone)]
pub struct Tracker {
    /// Outgoing edges by source node
    graph: HashMap<String, Vec<Edge>>,
    completion_nodes: HashSet<String>,
    /// Entry nodes by node id
    entry_nodes: HashMap<String, EntryConfig>,
    state: TrackerState,
}

impl Tracker {
    /// Build a tracker from a configuration
    pub fn new(config: &WatchConfig) -> Self {
        let mut graph: HashMap<String, Vec<Edge>> = HashMap::new();

        for rule in &config.rules {
            let mut source = rule.start_node.as_str();
            for step in &rule.steps {
                graph.entry(source.to_string()).or_default().push(Edge {
                    target: step.node.clone(),
                    timeout_ms: step.timeout_ms,
                    rule: rule.name.clone(),
                    description: rule.description.clone(),
                });
                source = step.node.as_str();
            }
        }

        let entry_nodes = config
            .entries
            .iter()
            .map(|entry| (entry.node.clone(), entry.clone()))
            .collect();

        log::debug!(
            "Tracker built: {} source nodes, {} entry nodes, {} completion nodes",
            graph.len(),
            config.entries.len(),
            config.completion_nodes.len()
        );

        Self {
            graph,
            completion_nodes: config.completion_nodes.iter().cloned().collect(),
            entry_nodes,
            state: TrackerState::Idle,
        }
    }

    /// Current state
    pub fn state(&self) -> &TrackerState {
        &self.state
    }

    /// True while a position is being tracked
    pub fn is_active(&self) -> bool {
        matches!(self.state, TrackerState::Active(_))
    }

    /// Node of the active position
    pub fn current_node(&self) -> Option<&str> {
        match &self.state {
            TrackerState::Active(active) => Some(active.node.as_str()),
            TrackerState::Idle => None,
        }
    }

    /// Outgoing edges of a node, in declaration order
    pub fn edges_from(&self, node: &str) -> &[Edge] {
        self.graph.get(node).map(Vec::as_slice).unwrap_or_default()
    }

    /// Drop any active position
    pub fn reset(&mut self) {
        self.state = TrackerState::Idle;
    }

    /// Feed one node id observed at `now`
    ///
    /// Branches are tried in priority order and the first that applies is
    /// the only one evaluated: entry override, cold start, matched
    /// transition, completion node.
    pub fn process_node(&mut self, node: &str, now: Instant) -> Vec<WatchEvent> {
        // 1. Entry nodes override everything
        if let Some(entry) = self.entry_nodes.get(node).cloned() {
            let mut events = Vec::with_capacity(2);
            if let TrackerState::Active(active) = &self.state {
                log::info!("Workflow '{}' interrupted by entry '{}'", active.rule, entry.name);
                events.push(WatchEvent::new(
                    EventKind::Interrupted,
                    active.rule.as_str(),
                    node,
                    active.description.as_str(),
                    elapsed_ms(active.entered_at, now),
                ));
            }
            self.reset();
            self.enter(node, &entry.name, &entry.description, now);
            events.push(WatchEvent::new(
                EventKind::EntryDetected,
                entry.name,
                node,
                entry.description,
                0,
            ));
            return events;
        }

        // 2. Cold start on any node that leads somewhere
        if !self.is_active() {
            return self.cold_start(node, now);
        }
        let TrackerState::Active(active) = &self.state else {
            return Vec::new();
        };

        // 3. First declared edge that leads to this node
        let matched = self
            .edges_from(&active.node)
            .iter()
            .find(|e| e.target == node)
            .cloned();
        if let Some(edge) = matched {
            let completed = WatchEvent::new(
                EventKind::Completed,
                edge.rule.as_str(),
                active.node.as_str(),
                edge.description.as_str(),
                elapsed_ms(active.entered_at, now),
            );
            self.enter(node, &edge.rule, &edge.description, now);
            return vec![
                completed,
                WatchEvent::new(EventKind::Activated, edge.rule, node, edge.description, 0),
            ];
        }

        // 4. Completion node closes the workflow
        if self.completion_nodes.contains(node) {
            let completed = WatchEvent::new(
                EventKind::Completed,
                FINAL_RULE,
                node,
                active.description.as_str(),
                elapsed_ms(active.entered_at, now),
            );
            log::info!("Workflow '{}' reached completion node '{}'", active.rule, node);
            self.reset();
            return vec![completed];
        }

        Vec::new()
    }

    /// Emit a timeout if the active position has outlived its threshold
    pub fn check_timeouts(&mut self, now: Instant) -> Vec<WatchEvent> {
        let TrackerState::Active(active) = &self.state else {
            return Vec::new();
        };
        let Some(threshold) = active.threshold else {
            return Vec::new();
        };
        let elapsed = elapsed_ms(active.entered_at, now);
        if u128::from(elapsed) <= threshold.as_millis() {
            return Vec::new();
        }

        let edges = self.edges_from(&active.node);
        let mut expected: Vec<String> = Vec::with_capacity(edges.len());
        for edge in edges {
            if !expected.contains(&edge.target) {
                expected.push(edge.target.clone());
            }
        }

        // min_by_key keeps the first of equal minimums
        let event = match edges.iter().filter(|e| e.timeout_ms >= 0).min_by_key(|e| e.timeout_ms) {
            Some(edge) => WatchEvent::new(
                EventKind::Timeout,
                edge.rule.as_str(),
                edge.target.as_str(),
                edge.description.as_str(),
                elapsed,
            ),
            None => WatchEvent::new(
                EventKind::Timeout,
                active.rule.as_str(),
                active.node.as_str(),
                active.description.as_str(),
                elapsed,
            ),
        }
        .with_expected(expected);

        log::warn!("Timeout after {}ms waiting at '{}'", event.elapsed_ms, active.node);
        self.reset();
        vec![event]
    }

    fn cold_start(&mut self, node: &str, now: Instant) -> Vec<WatchEvent> {
        let Some(first) = self.edges_from(node).first().cloned() else {
            return Vec::new();
        };
        self.enter(node, &first.rule, &first.description, now);
        vec![WatchEvent::new(
            EventKind::Activated,
            first.rule,
            node,
            first.description,
            0,
        )]
    }

    fn enter(&mut self, node: &str, rule: &str, description: &str, now: Instant) {
        let threshold = self.threshold_for(node);
        self.state = TrackerState::Active(ActivePosition {
            node: node.to_string(),
            rule: rule.to_string(),
            description: description.to_string(),
            entered_at: now,
            threshold,
        });
    }

    /// Minimum non-negative timeout over the node's outgoing edges
    fn threshold_for(&self, node: &str) -> Option<Duration> {
        self.edges_from(node)
            .iter()
            .filter_map(|e| u64::try_from(e.timeout_ms).ok())
            .min()
            .map(Duration::from_millis)
    }
}
