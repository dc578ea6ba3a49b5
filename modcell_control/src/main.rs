//! # Modcell Station Binary
//!
//! Runs one station against the simulated process image and reads station
//! inputs from stdin, one per line, optionally followed by parameters.
//!
//! # Usage
//!
//! ```bash
//! # Assembly station, initialize right away
//! modcell --config config/assembly.toml --auto-init
//!
//! # Storage station with debug logging in JSON
//! modcell --config config/storage.toml -v --json
//! ```
//!
//! ```text
//! Initialize
//! ProvideMaterial 1 Red 2
//! Ack
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use modcell_common::config::{ConfigLoader, LogLevel};
use modcell_common::consts::DEFAULT_CONFIG_PATH;
use modcell_common::station::config::StationConfig;
use modcell_control::runtime::message::{ActorId, Parameters, StationCommand, TopicMessage, Value};
use modcell_control::station::{Cell, CellBuilder, STATION_TOPICS};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

/// Modcell station controller
#[derive(Parser, Debug)]
#[command(name = "modcell")]
#[command(version)]
#[command(about = "Event-driven controller for one modular cell station")]
#[command(long_about = None)]
struct Args {
    /// Station configuration file.
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long)]
    json: bool,

    /// Post `Initialize` once the station is up.
    #[arg(long)]
    auto_init: bool,
}

fn main() {
    if let Err(e) = run() {
        error!("Station failed: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let loaded = StationConfig::load(&args.config);
    let level = loaded
        .as_ref()
        .map(|c| c.shared.log_level)
        .unwrap_or_default();
    setup_tracing(&args, level);
    let config = loaded.map_err(|e| format!("{}: {}", args.config.display(), e))?;

    info!("Modcell v{} starting...", env!("CARGO_PKG_VERSION"));
    info!(
        "Loaded {} ({:?} layout, {} I/O points)",
        config.shared.service_name,
        config.station.layout,
        config.io.points.len()
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(serve(config, args.auto_init))?;

    info!("Modcell shutdown complete");
    Ok(())
}

async fn serve(config: StationConfig, auto_init: bool) -> Result<(), Box<dyn std::error::Error>> {
    let (builder, _image) = CellBuilder::simulated(config)?;
    let cell = builder.start()?;
    cell.observe(Arc::new(mirror))?;

    if auto_init {
        cell.command(StationCommand::Initialize, None)?;
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    error!("Unable to listen for shutdown signal: {}", e);
                }
                info!("Received shutdown signal");
                break;
            }
            line = lines.next_line() => match line? {
                Some(line) => submit(&cell, &line),
                None => {
                    info!("Input closed");
                    break;
                }
            },
        }
    }

    cell.shutdown().await;
    Ok(())
}

fn submit(cell: &Cell, line: &str) {
    match parse_input(line) {
        Ok(Some((command, parameters))) => {
            debug!("Input {} {:?}", command, parameters);
            if let Err(e) = cell.command(command, parameters) {
                error!("{}", e);
            }
        }
        Ok(None) => {}
        Err(e) => warn!("{}", e),
    }
}

/// Station input identifier followed by whitespace separated parameters.
fn parse_input(line: &str) -> Result<Option<(StationCommand, Option<Parameters>)>, String> {
    let mut tokens = line.split_whitespace();
    let Some(name) = tokens.next() else {
        return Ok(None);
    };
    let command: StationCommand = name.parse()?;
    let parameters: Parameters = tokens.map(Value::parse).collect();
    Ok(Some((
        command,
        (!parameters.is_empty()).then_some(parameters),
    )))
}

/// Log every publication; the station surface at info, the rest at debug.
fn mirror(message: &TopicMessage) {
    let topic = message.external_topic();
    if message.sender == ActorId::Station || STATION_TOPICS.contains(&message.topic) {
        info!(sender = %message.sender, "{} = {}", topic, message.value);
    } else {
        debug!(sender = %message.sender, "{} = {}", topic, message.value);
    }
}

/// Setup tracing subscriber based on CLI arguments and the configured level.
fn setup_tracing(args: &Args, level: LogLevel) {
    let directive = if args.verbose {
        LogLevel::Debug.as_directive()
    } else {
        level.as_directive()
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}
