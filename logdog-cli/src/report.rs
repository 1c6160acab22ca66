//! Event reporting
//!
//! Prints the events that pass the notification filter, either as text
//! lines or as JSON lines, plus the `--status` configuration summary.

use crate::config::AppConfig;
use logdog_core::{EventKind, Observer, WatchEvent};
use std::collections::HashSet;
use std::io::{self, Write};

/// Output format for reported events
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Observer that writes filtered events to stdout
pub struct EventReporter {
    format: OutputFormat,
    notify: HashSet<EventKind>,
}

impl EventReporter {
    pub fn new(format: OutputFormat, notify: HashSet<EventKind>) -> Self {
        Self { format, notify }
    }

    /// Line to print for `event`, or `None` when it is filtered out
    pub fn render(&self, event: &WatchEvent) -> Option<String> {
        if !self.notify.contains(&event.kind) {
            return None;
        }
        match self.format {
            OutputFormat::Text => Some(format!(
                "[{}] {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                event
            )),
            OutputFormat::Json => match serde_json::to_string(event) {
                Ok(json) => Some(json),
                Err(e) => {
                    log::error!("Failed to serialize event: {}", e);
                    None
                }
            },
        }
    }
}

impl Observer for EventReporter {
    fn on_event(&mut self, event: &WatchEvent) {
        if event.kind == EventKind::DiagnosticLog {
            log::debug!("Node detected: {}", event.node);
            return;
        }
        if let Some(line) = self.render(event) {
            let mut stdout = io::stdout().lock();
            if let Err(e) = writeln!(stdout, "{}", line).and_then(|_| stdout.flush()) {
                log::warn!("Failed to write event: {}", e);
            }
        }
    }
}

/// Print a summary of the loaded configuration
pub fn print_config_summary(config: &AppConfig) {
    let watch = config.watch_config();

    println!("═══════════════════════════════════════════════");
    println!("  LogDog - Configuration Summary");
    println!("═══════════════════════════════════════════════\n");
    println!("Log file:  {:?}", config.monitoring.log_file);
    println!("Interval:  {}s", config.monitoring.interval_secs);

    println!("\n[Rules] ({})", watch.rules.len());
    for rule in &watch.rules {
        println!("  - {}: {}", rule.name, rule.description);
        println!("    Start: {}", rule.start_node);
        println!("    Path:  {}", rule.path_summary());
    }

    println!("\n[Entry Points] ({})", watch.entries.len());
    for entry in &watch.entries {
        println!("  - {}: {} ({})", entry.name, entry.node, entry.description);
    }

    println!("\n[Completion Nodes] ({})", watch.completion_nodes.len());
    for node in &watch.completion_nodes {
        println!("  - {}", node);
    }

    let mut notify: Vec<&str> = config.notify_events().iter().map(EventKind::as_str).collect();
    notify.sort_unstable();
    println!("\nNotify when: {}", notify.join(", "));
}
