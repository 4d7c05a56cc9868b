use anyhow::Result;
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};

mod api;
mod config;
mod model;
mod predict;
mod service;

use api::AppState;
use config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise tracing / logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();
    config.validate()?;

    let state = Arc::new(AppState::new(&config.model_path));

    // Load the model up front so the first request doesn't pay for it.
    // A failure here is reported per request as 503, not fatal.
    if config.eager_load {
        if let Err(e) = state.service().await {
            error!("Prediction service unavailable at startup: {}", e);
        }
    } else {
        info!("Model will be loaded on first request: {}", config.model_path);
    }

    let app = api::router(state);
    let addr: SocketAddr = config.listen_addr.parse()?;
    info!("Prediction API listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app).await?;

    Ok(())
}
