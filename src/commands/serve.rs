use anyhow::{Context, Result};
use std::path::PathBuf;

use autopost::config::Config;
use autopost::metrics;
use autopost::server::{AppState, ControlServer};

use super::Components;

/// Parameters for the control server
pub struct ServeParams {
    pub config: Option<PathBuf>,
    pub host: Option<String>,
    pub port: Option<u16>,
}

/// Run the control server until Ctrl-C
pub async fn serve(params: ServeParams) -> Result<()> {
    let mut config = Config::load(params.config.as_deref()).context("Failed to load configuration")?;

    if params.host.is_some() || params.port.is_some() {
        let host = params
            .host
            .unwrap_or_else(|| config.server.bind_address.ip().to_string());
        let port = params.port.unwrap_or(config.server.bind_address.port());
        config.server.bind_address = format!("{host}:{port}")
            .parse()
            .context("Invalid bind address")?;
    }

    if let Err(e) = metrics::init_metrics() {
        tracing::warn!(error = %e, "Metrics initialization failed");
    }

    let components = Components::build(&config, config.channel.kind)?;
    components.attach_console_input();

    let state = AppState::new(
        components.queue.clone(),
        Some(components.inbox.clone()),
        config.schedule.clone(),
    );
    let server = ControlServer::new(config.server.clone(), state);

    println!("{}", server.info().display());
    println!();

    let queue = components.queue.clone();
    let shutdown = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for shutdown signal");
        }
        tracing::info!("Shutdown signal received");
        if queue.cancel().await.is_ok() {
            tracing::info!("Active batch cancelled on shutdown");
        }
    };

    server
        .start_with_shutdown(shutdown)
        .await
        .context("Control server failed")?;

    Ok(())
}
