//! # Steadfast Gateway Binary
//!
//! Entry point for the gateway server.
//!
//! ```bash
//! # Default configuration file (config.toml)
//! steadfast-gateway
//!
//! # Custom configuration, host and port
//! steadfast-gateway --config gateway.toml --host 0.0.0.0 --port 8080
//!
//! # Debug logging
//! steadfast-gateway --log-level debug
//! ```
//!
//! Environment overrides (`GATEWAY_ACCOUNT_ID`, `GATEWAY_GATEWAY_ID`,
//! `OPENAI_API_TOKEN`, `ANTHROPIC_API_TOKEN`, `GEMINI_API_TOKEN`,
//! `GATEWAY_REDIS_URL`, …) are applied on top of the file; see the
//! configuration module for the full list.

use clap::Parser;
use std::net::SocketAddr;
use steadfast_gateway::{config::Config, server::create_server};

/// Command line arguments for the Steadfast gateway server.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Host address to bind the server to; overrides the config file
    #[arg(long)]
    host: Option<String>,

    /// Port for the HTTP server; overrides the config file
    #[arg(short, long)]
    port: Option<u16>,

    /// Logging filter (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(&args.log_level)
        .init();

    let mut config = Config::load(&args.config)?;
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    config.validate()?;

    let addr = SocketAddr::new(config.server.host.parse()?, config.server.port);
    let app = create_server(config).await?;

    tracing::info!("starting steadfast gateway on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
