//! HTTP server entry point: load settings, connect storage, wire
//! collaborators, serve.

use std::sync::Arc;

use wallet_coord_api::{AppState, Server, ServerConfig, ServerSettings};
use wallet_coord_chain_monitor::explorer_client::ExplorerClient;
use wallet_coord_chain_monitor::hub_client::HubClient;
use wallet_coord_core::notify::InProcessBroker;
use wallet_coord_core::EngineConfig;
use wallet_coord_storage_postgres::PostgresStorage;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    wallet_coord_api::telemetry::init();

    let settings = ServerSettings::load()?;

    let storage = PostgresStorage::connect(&settings.database_url, settings.db_max_connections).await?;
    storage.migrate().await?;
    let storage = Arc::new(storage);

    let explorer = Arc::new(ExplorerClient::new(settings.explorer_url.clone()));
    let hub = Arc::new(HubClient::new(settings.hub_url.clone()));

    let broker = Arc::new(InProcessBroker::default());
    let push_notifier = Arc::new(wallet_coord_api::adapters::NullPushNotifier);
    let fiat_rates = Arc::new(wallet_coord_api::adapters::NullFiatRateProvider);

    let state = AppState::new(storage, explorer, hub, broker, push_notifier, fiat_rates, EngineConfig::default());

    let server_config = ServerConfig {
        host: settings.api_host.clone(),
        port: settings.api_port,
        enable_cors: settings.enable_cors,
    };

    Server::new(server_config, Arc::new(state)).start().await?;

    Ok(())
}
