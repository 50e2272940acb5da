//! glbridge model server
//!
//! Serves the latest uploaded GLB for browser previews until interrupted.

use anyhow::{Context, Result};
use clap::Parser;
use glbridge_server::{ModelServer, ModelStore, ServerConfig, DEFAULT_PORT};
use std::sync::Arc;

/// Local model server for web 3D previews
#[derive(Parser)]
#[command(name = "glbridge-server")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Address to bind
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on (0 picks a free port)
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Largest accepted upload in megabytes
    #[arg(long, default_value_t = 512)]
    max_upload_mb: usize,

    /// Log filter, e.g. "debug" or "glbridge_server=trace" (overrides RUST_LOG)
    #[arg(long)]
    log: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match &cli.log {
        Some(directives) => tracing_subscriber::EnvFilter::try_new(directives)
            .with_context(|| format!("Invalid log filter '{}'", directives))?,
        None => tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let max_upload_bytes = cli
        .max_upload_mb
        .checked_mul(1024 * 1024)
        .context("--max-upload-mb is too large")?;
    let config = ServerConfig::new(cli.host, cli.port).with_max_upload_bytes(max_upload_bytes);

    ModelServer::run(config, Arc::new(ModelStore::new())).context("Model server failed")?;
    Ok(())
}
