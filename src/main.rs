//! midi-frame - MIDI channel state monitor
//!
//! Opens the machine's MIDI inputs, tracks note and controller state frame by
//! frame, and prints what it sees.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::Path;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod monitor;

use midi_frame::{AppConfig, MidirBackend};

/// midi-frame - Frame-synchronized MIDI state monitor
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: String,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Also write JSON logs to this file
    #[arg(long, env = "LOG_FILE")]
    log_file: Option<String>,

    /// List available MIDI ports
    #[arg(long)]
    list_ports: bool,

    /// Echo notes and controllers to the first output whose name contains this pattern
    #[arg(long)]
    echo: Option<String>,

    /// Print the exit summary as JSON
    #[arg(long)]
    json: bool,

    /// Tick on the wall clock (engine.poll_interval_ms) instead of once per frame
    #[arg(long)]
    interval_clock: bool,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Monitor MIDI input (default)
    Monitor,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging; the guard flushes the file writer on exit
    let _log_guard = init_logging(&args.log_level, args.log_file.as_deref())?;

    info!("Starting midi-frame v{}...", env!("CARGO_PKG_VERSION"));

    let mut config = load_config(&args.config).await?;
    if let Some(pattern) = args.echo.clone() {
        config.monitor.echo_output = Some(pattern);
    }
    if args.interval_clock {
        config.monitor.interval_clock = true;
    }

    // Handle list ports
    if args.list_ports {
        let directory = MidirBackend::new(config.monitor.client_name.clone());
        return monitor::list_ports_formatted(&directory);
    }

    match args.command.unwrap_or(Command::Monitor) {
        Command::Monitor => monitor::run_monitor(config, args.json).await?,
    }

    info!("midi-frame shutdown complete");
    Ok(())
}

/// Load the config file, or fall back to defaults when it does not exist
async fn load_config(path: &str) -> Result<AppConfig> {
    if !Path::new(path).exists() {
        info!("Configuration file {} not found, using defaults", path);
        return Ok(AppConfig::default());
    }

    let config = AppConfig::load(path).await?;
    info!("Configuration loaded from {}", path);
    Ok(config)
}

fn init_logging(level: &str, log_file: Option<&str>) -> Result<Option<WorkerGuard>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let path = Path::new(path);
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let file_name = path
                .file_name()
                .with_context(|| format!("Invalid log file path: {}", path.display()))?;

            let appender = tracing_appender::rolling::never(dir, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false),
        )
        .with(file_layer)
        .init();

    Ok(guard)
}
