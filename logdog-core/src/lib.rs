//! LogDog Core Library
//!
//! A single-process workflow watchdog for line-oriented pipeline logs. The
//! engine tails a growing log file, extracts node ids from lines such as
//! `[node_name=X]` or `[pipeline_data.name=X] | enter`, and tracks whether
//! the configured node transitions happen within their time windows.
//!
//! # Architecture
//!
//! - [`Extractor`]: pure line -> node id matching with a substring pre-filter
//! - [`Tracker`]: the transition state machine (one active position at a time)
//! - [`LogTailer`]: offset-tracking reader that survives truncation/rotation
//! - [`Engine`]: the poll loop that ties them together and feeds an [`Observer`]
//!
//! The library does NOT:
//! - Persist any history beyond the in-flight position
//! - Parse structured (JSON, syslog) logs
//! - Deliver notifications anywhere (that is the observer's job)
//!
//! # Example Usage
//!
//! ```no_run
//! use logdog_core::{Engine, WatchEvent};
//!
//! let mut engine = Engine::new("pipeline.log", 1.0).unwrap();
//! engine
//!     .add_rule(
//!         "ingest",
//!         "read",
//!         vec![("parse".to_string(), 1000), ("write".to_string(), 1000)],
//!         "Ingest pipeline",
//!     )
//!     .unwrap();
//! engine.set_completion_nodes(["Finished"]);
//! engine.add_entry_node("Daily", "StartDaily", "Daily routine");
//! engine.set_observer(|event: &WatchEvent| println!("{}", event));
//!
//! let stop = engine.stop_handle();
//! std::thread::spawn(move || {
//!     std::thread::sleep(std::time::Duration::from_secs(60));
//!     stop.stop();
//! });
//!
//! engine.run().unwrap();
//! ```

// Public modules
pub mod config;
pub mod engine;
pub mod extractor;
pub mod tailer;
pub mod tracker;
pub mod types;

// Re-export main types for convenience
pub use config::{EntryConfig, PatternConfig, RuleConfig, StepConfig, WatchConfig};
pub use engine::{poll_interval, Engine, Observer, StopHandle};
pub use extractor::Extractor;
pub use tailer::LogTailer;
pub use tracker::{ActivePosition, Edge, Tracker, TrackerState};
pub use types::{EventKind, Result, WatchError, WatchEvent, FINAL_RULE};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
