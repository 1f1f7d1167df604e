//! # switchboard-agent
//!
//! Relay server binary: loads configuration, registers the built-in
//! tools, and runs the HTTP/WebSocket relay until ctrl-c.

#![deny(unsafe_code)]

mod tools;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use switchboard_core::tools::ToolRegistry;
use switchboard_server::{RelayServer, ServerConfig};

/// Switchboard relay server.
#[derive(Parser, Debug)]
#[command(name = "switchboard", about = "Realtime console/simulation relay")]
struct Cli {
    /// Host to bind (overrides config and environment).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind.
    #[arg(long)]
    port: Option<u16>,

    /// Upstream model identifier.
    #[arg(long)]
    model: Option<String>,

    /// Log filter (overrides `RUST_LOG`).
    #[arg(long)]
    log: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let filter = match &args.log {
        Some(spec) => EnvFilter::new(spec),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // The upstream credential is the one fatal startup requirement.
    let api_key =
        std::env::var("OPENAI_API_KEY").context("OPENAI_API_KEY environment variable is not set")?;

    let mut config = ServerConfig::default();
    config.apply_env_overrides();
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(model) = args.model {
        config.upstream.model = model;
    }

    let registry = ToolRegistry::new();
    tools::register_builtin(&registry);
    tracing::info!(tools = registry.len(), "registered built-in tools");

    let server = RelayServer::new(config, api_key, registry);

    let token = server.shutdown().token();
    let _ = tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            return;
        }
        tracing::info!("shutdown requested");
        token.cancel();
    });

    server.run().await.context("relay server failed")?;
    tracing::info!("shutdown complete");
    Ok(())
}
