//! heimdalld — Heimdall daemon.
//!
//! Serves the four proxy endpoints over HTTP, fronting the Gemini
//! generative-language API with the shared caching/coalescing/rate-limit
//! pipeline.

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use heimdall::{Config, GeminiClient};

/// Heimdall daemon — Gemini proxy gateway.
#[derive(Parser)]
#[command(name = "heimdalld")]
#[command(version)]
#[command(about = "Gemini proxy gateway daemon")]
struct Args {
    /// Address to bind to.
    #[arg(short, long, env = "HEIMDALL_ADDR")]
    address: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();

    // Fails fast on a missing API key, before any listener exists.
    let mut config = Config::from_env()?;
    if let Some(address) = args.address {
        config.address = address;
    }

    let backend = Arc::new(GeminiClient::new(config.api_key.clone()));
    let app = heimdall::server::router(&config, backend);

    let listener = tokio::net::TcpListener::bind(&config.address).await?;
    info!(address = %config.address, "heimdalld starting");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install ctrl-c handler");
    info!("shutdown signal received");
}
