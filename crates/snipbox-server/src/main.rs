//! HTTP server exposing the snipbox execution engine.

use anyhow::Result;
use clap::Parser;
use log::LevelFilter;
use snipbox_core::config::ConfigLoader;
use snipbox_core::ExecutionEngine;
use snipbox_server::{serve, shutdown_signal};
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(author, version, about = "snipbox server - run code snippets over HTTP")]
struct Cli {
    #[clap(long, short, default_value = "snipbox.yaml", help = "YAML configuration file")]
    config: PathBuf,

    #[clap(long, default_value = "127.0.0.1:3002")]
    bind_addr: String,

    #[clap(long, short, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level_filter = cli.log_level.parse().unwrap_or(LevelFilter::Info);
    env_logger::Builder::new()
        .filter_level(log_level_filter)
        .init();

    log::info!("Loading configuration from file: {}", cli.config.display());
    let config = ConfigLoader::from_file(&cli.config).await?;
    log::info!(
        "Configuration loaded: backend {:?}, network {}, timeout {}s, memory {}",
        config.runtime.backend,
        config.network,
        config.limits.timeout_secs,
        config.limits.memory
    );

    let engine = ExecutionEngine::from_config(&config)?;

    let bind_socket_addr: SocketAddr = cli
        .bind_addr
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid bind address '{}': {}", cli.bind_addr, e))?;

    if let Err(e) = serve(engine, bind_socket_addr, shutdown_signal()).await {
        log::error!("Server failed: {}", e);
        return Err(e);
    }

    log::info!("snipbox server shut down gracefully.");
    Ok(())
}
