//! Stepforge Node - engine process.
//!
//! Connects to a host over a Unix socket, announces itself, and executes
//! contract invokes until the host closes the session.

pub mod config;
pub mod runtime;
pub mod telemetry;

use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info};

/// Command-line arguments.
#[derive(Parser, Debug)]
#[command(name = "stepforge-node")]
#[command(about = "Stepforge - step-metered contract execution engine")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Args {
    /// Host socket path
    #[arg(short, long, value_name = "PATH", env = "STEPFORGE_SOCKET")]
    socket: Option<PathBuf>,

    /// Session identifier announced to the host
    #[arg(short, long)]
    uuid: Option<String>,

    /// Log level or filter directive
    #[arg(short, long)]
    log_level: Option<String>,

    /// Config file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => config::EngineConfig::from_file(path)?,
        None => config::EngineConfig::default(),
    };

    // Override with CLI args
    if let Some(socket) = args.socket {
        config.ipc.socket = socket;
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    if args.json_logs {
        config.logging.json = true;
    }

    match &config.logging.file {
        Some(file) => telemetry::init_telemetry_with_file(&config.logging.level, config.logging.json, file)?,
        None => telemetry::init_telemetry(&config.logging.level, config.logging.json)?,
    }

    config.validate()?;

    let uuid = args.uuid.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    info!(
        version = env!("CARGO_PKG_VERSION"),
        socket = %config.ipc.socket.display(),
        max_call_depth = config.engine.max_call_depth,
        verify_package = config.engine.verify_package,
        "starting engine"
    );

    let runtime = runtime::EngineRuntime::new(config, uuid);
    if let Err(e) = runtime.run() {
        error!("Engine error: {}", e);
        return Err(e);
    }

    info!("Stepforge engine shutdown complete");
    Ok(())
}
