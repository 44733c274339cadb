use std::sync::Arc;

use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::info;

use zapwoot_bridge::{
    run_event_loop, BridgeService, BridgeSettings, SessionService, SessionSettings,
};
use zapwoot_core::config::{AppConfig, ConfigError};
use zapwoot_core::crm::{CrmDirectory, CrmError};
use zapwoot_core::transport::{event_channel, TransportEventSender, DEFAULT_EVENT_BUFFER};
use zapwoot_db::repositories::{SqlMessageMappingStore, SqlSessionRepository};
use zapwoot_db::{connect_with_config, migrations, DbPool};

use crate::chatwoot::{ChatwootClient, DisabledCrm};
use crate::transport::DetachedTransport;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub sessions: Arc<SessionService>,
    pub bridge: Arc<BridgeService>,
    pub transport_mode: &'static str,
    /// A protocol driver publishes session events here; dropping it ends the event loop.
    pub event_sender: TransportEventSender,
    pub event_loop: JoinHandle<()>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("chatwoot client setup failed: {0}")]
    Chatwoot(#[source] CrmError),
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool =
        connect_with_config(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let transport = Arc::new(DetachedTransport::default());
    let transport_mode = transport.mode();

    let sessions = Arc::new(SessionService::new(
        Arc::new(SqlSessionRepository::new(db_pool.clone())),
        transport.clone(),
        SessionSettings::from(&config.sessions),
    ));

    let mappings = Arc::new(SqlMessageMappingStore::new(db_pool.clone()));
    let bridge_settings = BridgeSettings::from(&config.bridge);
    let bridge = if config.chatwoot.enabled {
        let client = Arc::new(
            ChatwootClient::from_config(&config.chatwoot).map_err(BootstrapError::Chatwoot)?,
        );
        BridgeService::new(transport.clone(), mappings, client.clone(), bridge_settings)
            .with_inbox(client)
    } else {
        let directory: Arc<dyn CrmDirectory> = Arc::new(DisabledCrm);
        BridgeService::new(transport.clone(), mappings, directory, bridge_settings)
    };
    let bridge = Arc::new(bridge);
    info!(
        event_name = "system.bootstrap.chatwoot",
        correlation_id = "bootstrap",
        chatwoot_enabled = config.chatwoot.enabled,
        "chatwoot integration configured"
    );

    let (event_sender, events) = event_channel(DEFAULT_EVENT_BUFFER);
    let event_loop = tokio::spawn(run_event_loop(events, sessions.clone(), Some(bridge.clone())));

    Ok(Application {
        config,
        db_pool,
        sessions,
        bridge,
        transport_mode,
        event_sender,
        event_loop,
    })
}
