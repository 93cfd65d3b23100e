//! The chain-monitor event loop (`spec.md` §4.6): polls the explorer's
//! `new_joint` and `mci_became_stable` feeds, resolves each affected address
//! to a wallet via a live watch-set, and dispatches into
//! `wallet_coord_core::chain_pipeline`.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;

use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use wallet_coord_core::chain_pipeline::asset_registry::{self, AssetCandidate};
use wallet_coord_core::chain_pipeline::{reconcile_new_joint, reconcile_stable_unit, JointOutput, NewJointEvent};
use wallet_coord_core::model::wallet::WalletId;
use wallet_coord_core::notify::Ticker;
use wallet_coord_core::traits::{MessageBroker, Storage};

use crate::error::{MonitorError, Result};
use crate::explorer_client::ExplorerClient;

/// Address-to-wallet watch set. Seeded from `MessageBroker::announce_address`
/// calls; the engine announces every address it creates
/// (`crates/core/src/address_service.rs`), so a freshly started monitor
/// catches up as soon as each wallet's copayers resume activity.
#[derive(Default)]
struct WatchSet {
    by_address: HashMap<String, WalletId>,
}

impl WatchSet {
    fn announce(&mut self, wallet_id: WalletId, address: String) {
        self.by_address.insert(address, wallet_id);
    }

    fn wallet_for(&self, address: &str) -> Option<WalletId> {
        self.by_address.get(address).copied()
    }
}

pub struct ChainMonitor {
    explorer: Arc<ExplorerClient>,
    storage: Arc<dyn Storage>,
    broker: Arc<dyn MessageBroker>,
    ticker: Arc<Ticker>,
    watch: Mutex<WatchSet>,
    // Wrapped so `run_address_watcher` can take ownership of the receiver
    // without requiring `&mut self` through the shared `Arc<Self>`.
    address_rx: tokio::sync::Mutex<Option<broadcast::Receiver<(WalletId, String)>>>,
    poll_interval: std::time::Duration,
    event_page_limit: u32,
}

impl ChainMonitor {
    /// `address_rx` comes from the same `InProcessBroker` instance the
    /// binary hands to `core`'s services as `Arc<dyn MessageBroker>` — its
    /// `subscribe_addresses()` is not part of the trait, so the caller
    /// subscribes once up front and passes the receiver in directly.
    pub fn new(
        explorer: Arc<ExplorerClient>,
        storage: Arc<dyn Storage>,
        broker: Arc<dyn MessageBroker>,
        address_rx: broadcast::Receiver<(WalletId, String)>,
        ticker: Arc<Ticker>,
        poll_interval: std::time::Duration,
        event_page_limit: u32,
    ) -> Self {
        Self {
            explorer,
            storage,
            broker,
            ticker,
            watch: Mutex::new(WatchSet::default()),
            address_rx: tokio::sync::Mutex::new(Some(address_rx)),
            poll_interval,
            event_page_limit,
        }
    }

    /// Runs the address-announcement subscriber and the three polling loops
    /// concurrently. Returns only if one of them exits, which only happens
    /// on an unrecoverable broker failure.
    pub async fn run(self: Arc<Self>) -> Result<()> {
        let watcher = self.clone().run_address_watcher();
        let joints = self.clone().run_new_joint_loop();
        let stable = self.clone().run_stable_unit_loop();
        let assets = self.clone().run_asset_registry_loop();

        tokio::select! {
            r = watcher => r,
            r = joints => r,
            r = stable => r,
            r = assets => r,
        }
    }

    async fn run_address_watcher(self: Arc<Self>) -> Result<()> {
        let mut rx = self.address_rx.lock().await.take().expect("run_address_watcher called more than once");
        loop {
            match rx.recv().await {
                Ok((wallet_id, address)) => {
                    debug!(%wallet_id, %address, "watching new address");
                    self.watch.lock().unwrap().announce(wallet_id, address);
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "address-announcement subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    error!("address-announcement channel closed");
                    return Ok(());
                }
            }
        }
    }

    async fn run_new_joint_loop(self: Arc<Self>) -> Result<()> {
        let mut cursor: Option<String> = None;
        loop {
            match self.explorer.poll_new_joints(cursor.as_deref(), self.event_page_limit).await {
                Ok(page) => {
                    for record in page.records {
                        if let Err(e) = self.handle_new_joint(&record).await {
                            warn!(error = %e, unit = %record.unit, "failed to reconcile new joint");
                        }
                    }
                    if page.next_cursor.is_some() {
                        cursor = page.next_cursor;
                        continue;
                    }
                }
                Err(e) => warn!(error = %e, "new_joint poll failed"),
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn run_stable_unit_loop(self: Arc<Self>) -> Result<()> {
        let mut cursor: Option<String> = None;
        loop {
            match self.explorer.poll_stable_units(cursor.as_deref(), self.event_page_limit).await {
                Ok(page) => {
                    for record in page.records {
                        if let Err(e) = self.handle_stable_unit(&record).await {
                            warn!(error = %e, unit = %record.unit, "failed to reconcile stable unit");
                        }
                    }
                    if page.next_cursor.is_some() {
                        cursor = page.next_cursor;
                        continue;
                    }
                }
                Err(e) => warn!(error = %e, "mci_became_stable poll failed"),
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn run_asset_registry_loop(self: Arc<Self>) -> Result<()> {
        let mut cursor: Option<String> = None;
        loop {
            match self.explorer.poll_asset_candidates(cursor.as_deref(), self.event_page_limit).await {
                Ok(page) => {
                    for record in page.records {
                        let candidate = AssetCandidate {
                            asset: record.asset.clone(),
                            name: record.name,
                            registry: record.registry,
                            decimals: record.decimals,
                        };
                        if let Err(e) = asset_registry::upsert(self.storage.as_ref(), candidate, Utc::now()).await {
                            warn!(error = %e, asset = %record.asset, "failed to upsert asset metadata");
                        }
                    }
                    if page.next_cursor.is_some() {
                        cursor = page.next_cursor;
                        continue;
                    }
                }
                Err(e) => warn!(error = %e, "asset_registry poll failed"),
            }
            // Asset metadata changes far less often than units; poll at a
            // calmer cadence than the joint/stability feeds.
            tokio::time::sleep(self.poll_interval * 12).await;
        }
    }

    async fn handle_new_joint(&self, record: &crate::models::events::NewJointRecord) -> Result<()> {
        let unit = decode_unit(&record.unit)?;
        let now = Utc::now();

        let mut affected: Vec<WalletId> = Vec::new();
        {
            let watch = self.watch.lock().unwrap();
            for output in &record.outputs {
                if let Some(wallet_id) = watch.wallet_for(&output.address) {
                    if !affected.contains(&wallet_id) {
                        affected.push(wallet_id);
                    }
                }
            }
        }

        let event = NewJointEvent {
            unit,
            outputs: record.outputs.iter().map(|o| JointOutput { address: o.address.clone(), amount: o.amount }).collect(),
        };

        for wallet_id in affected {
            reconcile_new_joint(self.storage.as_ref(), self.broker.as_ref(), &self.ticker, wallet_id, &event, now)
                .await
                .map_err(MonitorError::Engine)?;
        }

        Ok(())
    }

    async fn handle_stable_unit(&self, record: &crate::models::events::StableUnitRecord) -> Result<()> {
        let unit = decode_unit(&record.unit)?;
        let now = Utc::now();

        // A stable unit may belong to any wallet that owns one of its
        // inputs or outputs; `reconcile_stable_unit` is a no-op for a
        // wallet that has no matching proposal or subscription, so it's
        // safe (if broader than strictly necessary) to fan this out to
        // every wallet currently in the watch set.
        let wallets: Vec<WalletId> = {
            let watch = self.watch.lock().unwrap();
            let mut seen = std::collections::HashSet::new();
            watch.by_address.values().filter(|w| seen.insert(**w)).copied().collect()
        };

        for wallet_id in wallets {
            reconcile_stable_unit(self.storage.as_ref(), self.broker.as_ref(), &self.ticker, wallet_id, unit, now)
                .await
                .map_err(MonitorError::Engine)?;
        }

        info!(unit = %record.unit, "reconciled stable unit");
        Ok(())
    }
}

fn decode_unit(hex_unit: &str) -> Result<[u8; 32]> {
    let bytes = hex::decode(hex_unit).map_err(|_| MonitorError::MissingField {
        field: "unit".to_string(),
        context: "unit is not valid hex".to_string(),
    })?;
    bytes.try_into().map_err(|_| MonitorError::MissingField {
        field: "unit".to_string(),
        context: "unit must be exactly 32 bytes".to_string(),
    })
}
