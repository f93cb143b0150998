//! Coedit server - WebSocket backend for real-time collaborative editing.

use anyhow::Result;
use clap::Parser;
use coedit_server::logging::{self, LogConfig, LogFormat};
use coedit_server::{config::Config, router, state::AppState};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

/// Coedit server - collaborative text editing over WebSockets.
#[derive(Parser, Debug)]
#[command(name = "coedit-server")]
#[command(about = "WebSocket server for real-time collaborative editing")]
#[command(version)]
struct Cli {
    /// Path to config file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override port from config
    #[arg(short, long)]
    port: Option<u16>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Enable trace logging (TRACE level for everything)
    #[arg(long)]
    trace: bool,

    /// Quiet mode (WARN and ERROR only)
    #[arg(short, long)]
    quiet: bool,

    /// Set log level for specific targets (e.g., "session=debug").
    /// Targets are prefixed with "coedit::" automatically.
    #[arg(long = "log", value_name = "TARGET=LEVEL")]
    log_overrides: Vec<String>,

    /// Log output format
    #[arg(long = "log-format", value_name = "FORMAT", default_value = "text")]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = LogConfig::from_cli(
        cli.debug,
        cli.trace,
        cli.quiet,
        cli.log_overrides,
        cli.log_format,
    );
    logging::init(&log_config);

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(port) = cli.port {
        config.port = port;
    }

    tracing::info!(
        target: "coedit::startup",
        "Loaded configuration (port: {}, store: {})",
        config.port,
        config.store_url
    );

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let state = Arc::new(AppState::new(config)?);
    let app = router(state);

    tracing::info!(target: "coedit::startup", "Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
