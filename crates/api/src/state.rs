//! Shared application state handed to every route handler via `axum`'s
//! `State` extractor.

use std::sync::Arc;

use wallet_coord_core::lock::WalletLocks;
use wallet_coord_core::notify::Ticker;
use wallet_coord_core::traits::{Explorer, FiatRateProvider, HubClient, MessageBroker, PushNotifier, Storage};
use wallet_coord_core::EngineConfig;

/// Everything a route handler needs beyond the request itself: the engine
/// config and every external collaborator, each behind a trait object so
/// the binary entry point is the only place that picks concrete adapters.
pub struct AppState {
    pub storage: Arc<dyn Storage>,
    pub explorer: Arc<dyn Explorer>,
    pub hub: Arc<dyn HubClient>,
    pub broker: Arc<dyn MessageBroker>,
    pub push_notifier: Arc<dyn PushNotifier>,
    pub fiat_rates: Arc<dyn FiatRateProvider>,
    pub locks: WalletLocks,
    pub ticker: Arc<Ticker>,
    pub config: EngineConfig,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        storage: Arc<dyn Storage>,
        explorer: Arc<dyn Explorer>,
        hub: Arc<dyn HubClient>,
        broker: Arc<dyn MessageBroker>,
        push_notifier: Arc<dyn PushNotifier>,
        fiat_rates: Arc<dyn FiatRateProvider>,
        config: EngineConfig,
    ) -> Self {
        Self {
            storage,
            explorer,
            hub,
            broker,
            push_notifier,
            fiat_rates,
            locks: WalletLocks::default(),
            ticker: Arc::new(Ticker::default()),
            config,
        }
    }
}
