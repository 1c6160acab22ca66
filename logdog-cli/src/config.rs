//! Configuration loading and parsing

use anyhow::{bail, Context, Result};
use logdog_core::{EntryConfig, EventKind, PatternConfig, RuleConfig, WatchConfig};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Main application configuration (loaded from a TOML file)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    pub monitoring: MonitoringConfig,
    #[serde(default)]
    pub notification: NotificationConfig,
    #[serde(default)]
    pub rules: Vec<RuleConfig>,
    #[serde(default)]
    pub legacy_rules: Vec<LegacyRuleConfig>,
    #[serde(default)]
    pub entries: Vec<EntryConfig>,
    #[serde(default)]
    pub completion: CompletionConfig,
    #[serde(default)]
    pub patterns: PatternConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MonitoringConfig {
    /// Log file to watch; relative paths are resolved against the config file
    pub log_file: PathBuf,
    #[serde(default = "default_interval")]
    pub interval_secs: f64,
}

fn default_interval() -> f64 {
    1.0
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct NotificationConfig {
    /// Event kinds to report; all state events when absent
    pub notify_when: Option<Vec<String>>,
}

/// Single-step rule shorthand: `start` must reach `end` within `timeout_ms`
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LegacyRuleConfig {
    pub name: String,
    pub start: String,
    pub timeout_ms: i64,
    pub end: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CompletionConfig {
    #[serde(default)]
    pub nodes: Vec<String>,
}

impl LegacyRuleConfig {
    fn to_rule(&self) -> RuleConfig {
        RuleConfig::new(&self.name, &self.start, &self.description).step(&self.end, self.timeout_ms)
    }
}

impl AppConfig {
    /// Rule set handed to the engine (legacy rules follow the regular ones)
    pub fn watch_config(&self) -> WatchConfig {
        let mut config = WatchConfig::new()
            .with_completion_nodes(self.completion.nodes.iter().cloned())
            .with_patterns(self.patterns.clone());
        config.rules = self
            .rules
            .iter()
            .cloned()
            .chain(self.legacy_rules.iter().map(LegacyRuleConfig::to_rule))
            .collect();
        config.entries = self.entries.clone();
        config
    }

    /// Event kinds that should be reported
    pub fn notify_events(&self) -> HashSet<EventKind> {
        let Some(names) = &self.notification.notify_when else {
            return EventKind::ALL
                .into_iter()
                .filter(|kind| *kind != EventKind::DiagnosticLog)
                .collect();
        };

        let mut events = HashSet::new();
        for name in names {
            match parse_event_kind(name) {
                Some(kind) => {
                    events.insert(kind);
                }
                None => log::warn!("Unknown notification event type: {}", name),
            }
        }
        events
    }

    fn resolve_paths(&mut self, config_path: &Path) {
        if self.monitoring.log_file.is_relative() {
            if let Some(base) = config_path.parent() {
                self.monitoring.log_file = base.join(&self.monitoring.log_file);
            }
        }
    }

    fn validate(&mut self) -> Result<()> {
        if self.monitoring.log_file.as_os_str().is_empty() {
            bail!("monitoring.log_file must not be empty");
        }
        if logdog_core::poll_interval(self.monitoring.interval_secs).is_err() {
            log::warn!(
                "Invalid interval_secs {}, using default {}",
                self.monitoring.interval_secs,
                default_interval()
            );
            self.monitoring.interval_secs = default_interval();
        }
        if self.rules.is_empty() && self.legacy_rules.is_empty() {
            bail!("No watchdog rules configured");
        }
        self.watch_config().validate()?;
        Ok(())
    }
}

/// Case-insensitive event name, accepting the `State*` spellings too
pub fn parse_event_kind(name: &str) -> Option<EventKind> {
    let name = name.trim().to_ascii_lowercase();
    let name = match name.as_str() {
        "stateactivated" => "activated",
        "statecompleted" => "completed",
        "stateinterrupted" => "interrupted",
        other => other,
    };
    EventKind::ALL
        .into_iter()
        .find(|kind| kind.as_str().eq_ignore_ascii_case(name))
}

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let mut config = parse_config(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    config.resolve_paths(path);
    config
        .validate()
        .with_context(|| format!("Invalid config file: {:?}", path))?;

    log::info!(
        "Loaded {} rules, {} entry nodes, {} completion nodes",
        config.rules.len() + config.legacy_rules.len(),
        config.entries.len(),
        config.completion.nodes.len()
    );
    Ok(config)
}

fn parse_config(content: &str) -> Result<AppConfig> {
    Ok(toml::from_str(content)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [monitoring]
        log_file = "logs/maa.log"
        interval_secs = 0.5

        [notification]
        notify_when = ["Timeout", "StateInterrupted", "Bogus"]

        [[rules]]
        name = "ingest"
        start = "read"
        description = "Ingest pipeline"
        steps = [{ node = "parse", timeout_ms = 1000 }, { node = "write", timeout_ms = 500 }]

        [[legacy_rules]]
        name = "quick"
        start = "ping"
        timeout_ms = 200
        end = "pong"

        [[entries]]
        name = "Daily"
        node = "StartDaily"
        description = "Daily routine"

        [completion]
        nodes = ["Finished"]
    "#;

    #[test]
    fn test_config_deserialization() {
        let config = parse_config(SAMPLE).unwrap();
        assert_eq!(config.monitoring.interval_secs, 0.5);
        assert_eq!(config.rules.len(), 1);
        assert_eq!(config.rules[0].start_node, "read");
        assert_eq!(config.rules[0].steps[1].timeout_ms, 500);
        assert_eq!(config.entries[0].node, "StartDaily");
        assert_eq!(config.completion.nodes, vec!["Finished".to_string()]);
        assert_eq!(config.patterns, PatternConfig::default());
    }

    #[test]
    fn test_watch_config_includes_legacy_rules() {
        let config = parse_config(SAMPLE).unwrap();
        let watch = config.watch_config();
        assert_eq!(watch.rules.len(), 2);

        let quick = watch.rule("quick").unwrap();
        assert_eq!(quick.start_node, "ping");
        assert_eq!(quick.steps[0].node, "pong");
        assert_eq!(quick.steps[0].timeout_ms, 200);
        assert_eq!(watch.entries.len(), 1);
        assert!(watch.validate().is_ok());
    }

    #[test]
    fn test_notify_filter() {
        let config = parse_config(SAMPLE).unwrap();
        let events = config.notify_events();
        assert_eq!(events.len(), 2);
        assert!(events.contains(&EventKind::Timeout));
        assert!(events.contains(&EventKind::Interrupted));
    }

    #[test]
    fn test_notify_filter_defaults_to_state_events() {
        let config = parse_config("[monitoring]\nlog_file = \"a.log\"\n").unwrap();
        let events = config.notify_events();
        assert_eq!(events.len(), 5);
        assert!(!events.contains(&EventKind::DiagnosticLog));
    }

    #[test]
    fn test_parse_event_kind() {
        assert_eq!(parse_event_kind("timeout"), Some(EventKind::Timeout));
        assert_eq!(parse_event_kind(" StateCompleted "), Some(EventKind::Completed));
        assert_eq!(parse_event_kind("ENTRYDETECTED"), Some(EventKind::EntryDetected));
        assert_eq!(parse_event_kind("nope"), None);
    }

    #[test]
    fn test_load_config_resolves_relative_log_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("watchdog.toml");
        fs::write(&path, SAMPLE).unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.monitoring.log_file, dir.path().join("logs/maa.log"));
    }

    #[test]
    fn test_load_config_rejects_missing_rules() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("watchdog.toml");
        fs::write(&path, "[monitoring]\nlog_file = \"a.log\"\n").unwrap();

        let err = load_config(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("No watchdog rules configured"));
    }

    #[test]
    fn test_load_config_rejects_duplicate_rules() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("watchdog.toml");
        let content = format!(
            "{}\n[[legacy_rules]]\nname = \"ingest\"\nstart = \"a\"\ntimeout_ms = 1\nend = \"b\"\n",
            SAMPLE
        );
        fs::write(&path, content).unwrap();

        let err = load_config(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("Rule already defined: ingest"));
    }

    #[test]
    fn test_invalid_interval_falls_back_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("watchdog.toml");
        fs::write(&path, SAMPLE.replace("interval_secs = 0.5", "interval_secs = -3.0")).unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.monitoring.interval_secs, 1.0);

        fs::write(&path, SAMPLE.replace("interval_secs = 0.5", "interval_secs = 1e20")).unwrap();
        let config = load_config(&path).unwrap();
        assert_eq!(config.monitoring.interval_secs, 1.0);
    }

    #[test]
    fn test_load_config_rejects_bad_pattern() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("watchdog.toml");
        let content = format!("{}\n[patterns]\ngeneral = \"(unclosed\"\n", SAMPLE);
        fs::write(&path, content).unwrap();

        let err = load_config(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("Invalid node pattern"));
    }
}
