// src/main.rs - Delivery OMS Entry Point
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]

use anyhow::{anyhow, Context, Result};
use delivery_oms::{
    transport::{start_server, ApiState},
    AppConfig, LoggingConfig,
};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true);

    if logging.format == "json" {
        subscriber.json().init();
    } else {
        subscriber.pretty().init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    info!("Shutdown signal received, shutting down gracefully...");
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install().map_err(|e| anyhow!("Failed to install color_eyre: {e}"))?;

    let (config, load_error) = match AppConfig::load() {
        Ok(config) => (config, None),
        Err(e) => (AppConfig::default(), Some(e)),
    };

    init_tracing(&config.logging);
    if let Some(e) = load_error {
        warn!("Failed to load config, using defaults: {}", e);
    }

    info!("Starting {} v{}", delivery_oms::NAME, delivery_oms::VERSION);
    info!(
        gateway = if config.payments.secret_key.is_some() { "paystack" } else { "mock" },
        strict_transitions = config.lifecycle.enforce_sequential_transitions,
        "Configuration loaded"
    );

    let state = ApiState::new(config).context("Failed to build application state")?;
    start_server(state, shutdown_signal()).await?;

    info!("Server shutdown complete");
    Ok(())
}
