//! Chain-monitor binary: connects storage, wires the explorer/hub HTTP
//! clients, and runs the blockchain-event pipeline (`spec.md` §4.6).

use std::process;
use std::sync::Arc;

use tracing::{error, info};

use wallet_coord_chain_monitor::config::MonitorConfig;
use wallet_coord_chain_monitor::explorer_client::ExplorerClient;
use wallet_coord_chain_monitor::monitor::ChainMonitor;
use wallet_coord_core::notify::{InProcessBroker, Ticker};
use wallet_coord_storage_postgres::PostgresStorage;

#[tokio::main]
async fn main() {
    wallet_coord_chain_monitor::telemetry::init();

    let config = match MonitorConfig::load() {
        Ok(config) => config,
        Err(e) => {
            error!("failed to load configuration: {e}");
            process::exit(1);
        }
    };

    let storage = match PostgresStorage::connect(&config.database_url, config.db_max_connections).await {
        Ok(storage) => storage,
        Err(e) => {
            error!("failed to connect to database: {e}");
            process::exit(1);
        }
    };
    if let Err(e) = storage.migrate().await {
        error!("failed to run migrations: {e}");
        process::exit(1);
    }
    let storage = Arc::new(storage);

    let explorer = Arc::new(ExplorerClient::new(&config.explorer_url));

    // A standalone chain-monitor process cannot share the API server's
    // in-process broker across the process boundary; it runs its own and
    // relies only on `core::chain_pipeline`'s storage-side effects
    // (proposal status transitions, tx-note/confirmation bookkeeping). A
    // networked broker adapter would remove this gap.
    let broker = Arc::new(InProcessBroker::default());
    let address_rx = broker.subscribe_addresses();
    let ticker = Arc::new(Ticker::default());

    let monitor = Arc::new(ChainMonitor::new(
        explorer,
        storage,
        broker,
        address_rx,
        ticker,
        std::time::Duration::from_secs(config.poll_interval_secs),
        config.event_page_limit,
    ));

    info!("starting chain-monitor event pipeline");
    if let Err(e) = monitor.run().await {
        error!("chain-monitor exited: {e}");
        process::exit(1);
    }
}
