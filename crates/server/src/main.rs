mod api;
mod bootstrap;
mod chatwoot;
mod health;
mod transport;

use std::time::Duration;

use anyhow::Result;
use zapwoot_core::config::{AppConfig, LoadOptions};

use crate::api::ApiState;
use crate::health::HealthState;

fn init_logging(config: &AppConfig) {
    use tracing::Level;
    use zapwoot_core::config::LogFormat::*;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let bootstrap::Application {
        config,
        db_pool,
        sessions,
        bridge,
        transport_mode,
        event_sender,
        event_loop,
    } = bootstrap::bootstrap_with_config(config).await?;

    tracing::info!(
        event_name = "system.server.transport_mode",
        transport_mode,
        correlation_id = "bootstrap",
        "whatsapp transport initialized"
    );

    let router = health::router(HealthState::new(db_pool.clone(), transport_mode)).merge(
        api::router(ApiState {
            sessions,
            bridge: bridge.clone(),
            webhook_secret: config.chatwoot.webhook_secret.clone(),
        }),
    );

    let address = format!("{}:{}", config.server.bind_address, config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        bind_address = %address,
        "zapwoot-server listening"
    );

    axum::serve(listener, router).with_graceful_shutdown(wait_for_shutdown()).await?;

    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "zapwoot-server stopping"
    );

    // Closing the sender lets the event loop drain and exit.
    drop(event_sender);
    let grace = Duration::from_secs(config.server.graceful_shutdown_secs);
    let drained = tokio::time::timeout(grace, async move {
        bridge.flush().await;
        let _ = event_loop.await;
    })
    .await;
    if drained.is_err() {
        tracing::warn!(
            event_name = "system.server.shutdown_timeout",
            correlation_id = "shutdown",
            grace_secs = grace.as_secs(),
            "background work still pending at shutdown"
        );
    }
    db_pool.close().await;

    Ok(())
}

async fn wait_for_shutdown() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(
            event_name = "system.server.signal_error",
            correlation_id = "shutdown",
            error = %error,
            "failed to listen for shutdown signal"
        );
        std::future::pending::<()>().await;
    }
}
