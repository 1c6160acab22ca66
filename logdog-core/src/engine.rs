//! Watch loop
//!
//! The [`Engine`] owns the configuration and, while running, a tailer and a
//! tracker. Each cycle reads the new lines, feeds every recognized node to
//! the tracker, checks timeouts once, and then sleeps until the next poll or
//! until [`StopHandle::stop`] is called.

use crate::config::{EntryConfig, RuleConfig, WatchConfig};
use crate::extractor::Extractor;
use crate::tailer::LogTailer;
use crate::tracker::Tracker;
use crate::types::{Result, WatchError, WatchEvent};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Receives every event, synchronously and in emission order
pub trait Observer {
    fn on_event(&mut self, event: &WatchEvent);
}

impl<F> Observer for F
where
    F: FnMut(&WatchEvent),
{
    fn on_event(&mut self, event: &WatchEvent) {
        self(event)
    }
}

/// Cloneable handle that stops a running engine from any thread
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    inner: Arc<StopSignal>,
}

#[derive(Debug, Default)]
struct StopSignal {
    stopped: Mutex<bool>,
    wake: Condvar,
}

impl StopHandle {
    /// Request shutdown and wake the sleeping loop. Safe to call repeatedly.
    pub fn stop(&self) {
        let mut stopped = self
            .inner
            .stopped
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *stopped = true;
        self.inner.wake.notify_all();
    }

    /// True once [`StopHandle::stop`] has been called
    pub fn is_stopped(&self) -> bool {
        *self
            .inner
            .stopped
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Sleep for up to `timeout`, returning early (with `true`) on stop
    fn wait(&self, timeout: Duration) -> bool {
        let stopped = self
            .inner
            .stopped
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let (stopped, _) = self
            .inner
            .wake
            .wait_timeout_while(stopped, timeout, |stopped| !*stopped)
            .unwrap_or_else(PoisonError::into_inner);
        *stopped
    }
}

/// Convert a poll interval in seconds, rejecting values that are not
/// representable or that round down to zero
pub fn poll_interval(secs: f64) -> Result<Duration> {
    match Duration::try_from_secs_f64(secs) {
        Ok(interval) if !interval.is_zero() => Ok(interval),
        _ => Err(WatchError::InvalidInterval(secs)),
    }
}

/// The watchdog engine
pub struct Engine {
    path: PathBuf,
    interval: Duration,
    config: WatchConfig,
    observer: Option<Box<dyn Observer + Send>>,
    diagnostics: bool,
    stop: StopHandle,
}

impl Engine {
    /// Create an engine watching `path`, polling every `interval_secs` seconds
    pub fn new(path: impl Into<PathBuf>, interval_secs: f64) -> Result<Self> {
        Self::with_config(path, interval_secs, WatchConfig::new())
    }

    /// Create an engine from a prepared configuration
    pub fn with_config(
        path: impl Into<PathBuf>,
        interval_secs: f64,
        config: WatchConfig,
    ) -> Result<Self> {
        let interval = poll_interval(interval_secs)?;
        config.validate()?;

        Ok(Self {
            path: path.into(),
            interval,
            config,
            observer: None,
            diagnostics: true,
            stop: StopHandle::default(),
        })
    }

    /// Add a named rule: start node, ordered (target, timeout ms) steps, description
    pub fn add_rule(
        &mut self,
        name: &str,
        start_node: &str,
        transitions: Vec<(String, i64)>,
        description: &str,
    ) -> Result<()> {
        let rule = RuleConfig::new(name, start_node, description).with_steps(transitions);
        self.config.insert_rule(rule)
    }

    /// Replace the completion node set
    pub fn set_completion_nodes<I, S>(&mut self, nodes: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.completion_nodes = nodes.into_iter().map(Into::into).collect();
    }

    /// Add an entry node with its display name and description
    pub fn add_entry_node(&mut self, name: &str, node: &str, description: &str) {
        self.config.entries.push(EntryConfig::new(name, node, description));
    }

    /// Register the event observer (replaces any previous one)
    pub fn set_observer(&mut self, observer: impl Observer + Send + 'static) {
        self.observer = Some(Box::new(observer));
    }

    /// Builder method: emit a `DiagnosticLog` event for every recognized node
    pub fn with_diagnostics(mut self, enabled: bool) -> Self {
        self.diagnostics = enabled;
        self
    }

    /// Handle for stopping the engine from another thread
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Request shutdown (same as [`StopHandle::stop`])
    pub fn stop(&self) {
        self.stop.stop();
    }

    /// Watched path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current configuration
    pub fn config(&self) -> &WatchConfig {
        &self.config
    }

    /// Run the watch loop on the calling thread until stopped
    ///
    /// Fails only when the log file cannot be opened at startup; every later
    /// I/O problem is retried on the next poll.
    pub fn run(&mut self) -> Result<()> {
        let extractor = Extractor::from_patterns(&self.config.patterns)?;
        let mut tracker = Tracker::new(&self.config);
        let mut tailer = LogTailer::new(&self.path);
        tailer.open()?;

        log::info!(
            "Engine started. Monitoring {:?} every {:?} ({} rules, {} entry nodes)",
            self.path,
            self.interval,
            self.config.rules.len(),
            self.config.entries.len()
        );

        while !self.stop.is_stopped() {
            self.poll_once(&extractor, &mut tailer, &mut tracker);
            if self.stop.wait(self.interval) {
                break;
            }
        }

        tailer.close();
        log::info!("Engine stopped");
        Ok(())
    }

    /// One cycle: new lines, then a single timeout check
    fn poll_once(&mut self, extractor: &Extractor, tailer: &mut LogTailer, tracker: &mut Tracker) {
        let lines = tailer.read_new_lines();
        self.process_lines(extractor, tracker, &lines);

        let timeouts = tracker.check_timeouts(Instant::now());
        self.emit_all(&timeouts);
    }

    fn process_lines(&mut self, extractor: &Extractor, tracker: &mut Tracker, lines: &[String]) {
        for line in lines {
            log::trace!("line: {}", line);
            let Some(node) = extractor.extract(line) else {
                continue;
            };
            log::trace!("Node detected: {}", node);

            if self.diagnostics {
                self.emit(&WatchEvent::diagnostic(node.as_str()));
            }
            let events = tracker.process_node(&node, Instant::now());
            self.emit_all(&events);
        }
    }

    fn emit_all(&mut self, events: &[WatchEvent]) {
        for event in events {
            self.emit(event);
        }
    }

    fn emit(&mut self, event: &WatchEvent) {
        if let Some(observer) = self.observer.as_mut() {
            observer.on_event(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EventKind;
    use std::sync::mpsc;
    use std::thread;

    fn collecting_engine(diagnostics: bool) -> (Engine, mpsc::Receiver<WatchEvent>) {
        let (tx, rx) = mpsc::channel();
        let mut engine = Engine::new("unused.log", 0.05).unwrap().with_diagnostics(diagnostics);
        engine
            .add_rule("ingest", "read", vec![("parse".to_string(), 1000)], "Ingest")
            .unwrap();
        engine.add_entry_node("Daily", "StartDaily", "Daily routine");
        engine.set_observer(move |event: &WatchEvent| {
            tx.send(event.clone()).unwrap();
        });
        (engine, rx)
    }

    fn lines(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|l| l.to_string()).collect()
    }

    #[test]
    fn test_invalid_interval() {
        assert!(matches!(Engine::new("a.log", 0.0), Err(WatchError::InvalidInterval(_))));
        assert!(matches!(Engine::new("a.log", -1.0), Err(WatchError::InvalidInterval(_))));
        assert!(matches!(Engine::new("a.log", f64::NAN), Err(WatchError::InvalidInterval(_))));
        assert!(matches!(Engine::new("a.log", 1e20), Err(WatchError::InvalidInterval(_))));
        assert!(matches!(Engine::new("a.log", 1e-12), Err(WatchError::InvalidInterval(_))));
        assert!(Engine::new("a.log", 0.25).is_ok());
    }

    #[test]
    fn test_duplicate_rule_rejected() {
        let mut engine = Engine::new("a.log", 1.0).unwrap();
        engine.add_rule("r", "a", vec![("b".to_string(), 10)], "").unwrap();
        assert!(matches!(
            engine.add_rule("r", "c", vec![("d".to_string(), 10)], ""),
            Err(WatchError::DuplicateRule(_))
        ));
        assert!(matches!(
            engine.add_rule("empty", "c", Vec::new(), ""),
            Err(WatchError::EmptyRule(_))
        ));
    }

    #[test]
    fn test_events_dispatched_in_order_with_diagnostics() {
        let (mut engine, rx) = collecting_engine(true);
        let extractor = Extractor::new().unwrap();
        let mut tracker = Tracker::new(engine.config());

        engine.process_lines(
            &extractor,
            &mut tracker,
            &lines(&[
                "[node_name=read]",
                "cost line without nodes",
                "[pipeline_data.name=StartDaily] | enter",
            ]),
        );

        let kinds: Vec<EventKind> = rx.try_iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                EventKind::DiagnosticLog,
                EventKind::Activated,
                EventKind::DiagnosticLog,
                EventKind::Interrupted,
                EventKind::EntryDetected,
            ]
        );
    }

    #[test]
    fn test_diagnostics_can_be_disabled() {
        let (mut engine, rx) = collecting_engine(false);
        let extractor = Extractor::new().unwrap();
        let mut tracker = Tracker::new(engine.config());

        engine.process_lines(&extractor, &mut tracker, &lines(&["[node_name=read]"]));

        let events: Vec<WatchEvent> = rx.try_iter().collect();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::Activated);
    }

    #[test]
    fn test_poll_interval_conversion() {
        assert_eq!(poll_interval(0.25).unwrap(), Duration::from_millis(250));
        assert!(poll_interval(f64::INFINITY).is_err());
        assert!(poll_interval(1e20).is_err());
    }

    #[test]
    fn test_invalid_pattern_rejected_at_construction() {
        let mut config = WatchConfig::new();
        config.patterns.general = "[node_name=(".to_string();
        assert!(matches!(
            Engine::with_config("a.log", 1.0, config),
            Err(WatchError::Pattern(_))
        ));
    }

    #[test]
    fn test_run_fails_when_file_missing() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = Engine::new(dir.path().join("missing.log"), 0.01).unwrap();
        assert!(matches!(engine.run(), Err(WatchError::Open { .. })));
    }

    #[test]
    fn test_stop_before_run_returns_immediately() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut engine = Engine::new(file.path(), 60.0).unwrap();
        engine.stop();
        engine.stop();
        assert!(engine.run().is_ok());
    }

    #[test]
    fn test_stop_wakes_sleeping_loop() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut engine = Engine::new(file.path(), 3600.0).unwrap();
        let handle = engine.stop_handle();

        let started = Instant::now();
        let worker = thread::spawn(move || engine.run());
        thread::sleep(Duration::from_millis(50));
        handle.stop();

        assert!(worker.join().unwrap().is_ok());
        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(handle.is_stopped());
    }
}
