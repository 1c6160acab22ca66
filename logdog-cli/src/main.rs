//! LogDog CLI Application
//!
//! Command-line front end for the logdog-core watchdog. It adds:
//! - TOML configuration loading (rules, entries, completion nodes, patterns)
//! - Logging setup
//! - Ctrl+C handling that stops the engine
//! - Filtered event output (text or JSON lines)

use anyhow::{Context, Result};
use clap::Parser;
use logdog_core::Engine;
use std::path::PathBuf;

mod config;
mod report;

use report::{EventReporter, OutputFormat};

/// LogDog - watch a pipeline log for stalled or interrupted workflows
#[derive(Parser, Debug)]
#[command(name = "logdog")]
#[command(about = "Watch a pipeline log for stalled or interrupted workflows", long_about = None)]
#[command(version)]
struct Args {
    /// Path to configuration file (TOML)
    #[arg(short, long, value_name = "FILE", default_value = "watchdog.toml")]
    config: PathBuf,

    /// Show the loaded configuration and exit
    #[arg(long)]
    status: bool,

    /// Event output format
    #[arg(long, value_enum, default_value = "text")]
    format: OutputFormat,

    /// Do not emit a diagnostic event for every recognized node
    #[arg(long)]
    no_diagnostics: bool,

    /// Verbosity level (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging
    init_logging(args.verbose, args.quiet);

    log::info!("LogDog CLI v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Using core library v{}", logdog_core::VERSION);

    log::info!("Loading configuration from: {:?}", args.config);
    let config = config::load_config(&args.config)?;

    if args.status {
        report::print_config_summary(&config);
        return Ok(());
    }

    watch(&args, &config)
}

/// Build the engine from the configuration and block until Ctrl+C
fn watch(args: &Args, config: &config::AppConfig) -> Result<()> {
    let log_file = &config.monitoring.log_file;

    let mut engine = Engine::with_config(
        log_file,
        config.monitoring.interval_secs,
        config.watch_config(),
    )
    .context("Failed to create watchdog engine")?
    .with_diagnostics(!args.no_diagnostics);

    engine.set_observer(EventReporter::new(args.format, config.notify_events()));

    let stop = engine.stop_handle();
    ctrlc::set_handler(move || {
        log::info!("Interrupt received, shutting down...");
        stop.stop();
    })
    .context("Failed to install Ctrl+C handler")?;

    log::info!(
        "Watching {:?} since {} (press Ctrl+C to stop)",
        log_file,
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );

    engine
        .run()
        .with_context(|| format!("Watchdog failed for {:?}", log_file))?;

    log::info!("Watchdog service stopped");
    Ok(())
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: u8, quiet: bool) {
    use env_logger::Builder;
    use log::LevelFilter;
    use std::io::Write;

    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}
