//! External collaborators (`spec.md` §1, §5, §6): the engine depends only on
//! these traits. Concrete adapters (a Postgres-backed `Storage`, an
//! HTTP-based `Explorer`/`HubClient`) live in other crates; `core::testutil`
//! ships in-memory reference implementations for tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::model::notification::Notification;
use crate::model::proposal::{ProposalId, ProposalStatus, TxProposal, UtxoRef};
use crate::model::wallet::{Copayer, CopayerId, CopayerIndexEntry, Wallet, WalletId};
use crate::model::{Address, AssetMetadata, Preferences, PushSubscription, Session, TxConfirmationSubscription, TxNote};

/// One observed UTXO, as returned by the ledger explorer (`spec.md` §6).
#[derive(Debug, Clone)]
pub struct ExplorerUtxo {
    pub utxo: UtxoRef,
    pub address: String,
    pub amount: u64,
    pub asset: Option<String>,
    pub stable: bool,
    pub time: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct Balance {
    pub stable: u64,
    pub pending: u64,
    pub stable_outputs_count: u32,
    pub pending_outputs_count: u32,
}

#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub unit: [u8; 32],
    pub row_id: i64,
    pub amount: i64,
    pub time: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct LedgerTransaction {
    pub unit: [u8; 32],
    pub stable: bool,
}

/// Read API over ledger state (`spec.md` GLOSSARY: "Explorer").
#[async_trait]
pub trait Explorer: Send + Sync {
    async fn get_utxos(&self, addresses: &[String], asset: Option<&str>) -> Result<Vec<ExplorerUtxo>>;
    async fn get_balance(&self, addresses: &[String], asset: Option<&str>) -> Result<Balance>;
    async fn get_tx_history(
        &self,
        addresses: &[String],
        asset: Option<&str>,
        limit: u32,
        last_row_id: Option<i64>,
    ) -> Result<Vec<HistoryEntry>>;
    async fn get_address_activity(&self, address: &str) -> Result<bool>;
    async fn get_transaction(&self, unit: [u8; 32]) -> Result<Option<LedgerTransaction>>;
}

/// Write-authoritative broadcast surface (`spec.md` GLOSSARY: "Hub").
#[async_trait]
pub trait HubClient: Send + Sync {
    /// Submits `joint` to the hub. `Ok(())` means accepted; `Err` carries a
    /// retryable hub-side failure.
    async fn broadcast_joint(&self, joint: &[u8]) -> Result<()>;
}

/// Write-fanout notification surface (`spec.md` §4.7).
#[async_trait]
pub trait MessageBroker: Send + Sync {
    async fn publish(&self, notification: Notification) -> Result<()>;
    /// Announces a new address to the broker so subscribers (the chain
    /// monitor) can extend their watch set.
    async fn announce_address(&self, wallet_id: WalletId, address: &str) -> Result<()>;
}

/// Push-notification delivery (`spec.md` §1: out of scope beyond its
/// interface).
#[async_trait]
pub trait PushNotifier: Send + Sync {
    async fn notify(&self, subscription: &PushSubscription, notification: &Notification) -> Result<()>;
}

/// Fiat-rate scraping (`spec.md` §1: out of scope beyond its interface).
#[async_trait]
pub trait FiatRateProvider: Send + Sync {
    async fn get_rate(&self, code: &str, provider: Option<&str>, ts: Option<DateTime<Utc>>) -> Result<Option<f64>>;
}

/// Persistent storage (`spec.md` §1, §6 "Persisted schema"). Every method
/// corresponds to one collection named in `spec.md` §3/§6; the engine never
/// talks to a database directly.
#[async_trait]
pub trait Storage: Send + Sync {
    // --- wallets & copayers ---
    async fn insert_wallet(&self, wallet: &Wallet) -> Result<()>;
    async fn get_wallet(&self, id: WalletId) -> Result<Option<Wallet>>;
    async fn update_wallet(&self, wallet: &Wallet) -> Result<()>;

    async fn insert_copayer(&self, copayer: &Copayer) -> Result<()>;
    async fn get_copayer(&self, id: &str) -> Result<Option<Copayer>>;
    async fn update_copayer(&self, copayer: &Copayer) -> Result<()>;
    async fn list_copayers_by_device(&self, device_id: &str) -> Result<Vec<Copayer>>;

    async fn register_copayer_index(&self, entry: &CopayerIndexEntry) -> Result<()>;
    async fn lookup_copayer_index(&self, copayer_id: &str) -> Result<Option<CopayerIndexEntry>>;

    // --- addresses ---
    async fn insert_address(&self, address: &Address) -> Result<()>;
    async fn get_address(&self, wallet_id: WalletId, address: &str) -> Result<Option<Address>>;
    async fn find_address_by_path(
        &self,
        wallet_id: WalletId,
        is_change: bool,
        index: u32,
    ) -> Result<Option<Address>>;
    async fn list_addresses(
        &self,
        wallet_id: WalletId,
        is_change: Option<bool>,
        limit: Option<u32>,
        reverse: bool,
    ) -> Result<Vec<Address>>;
    async fn mark_address_active(&self, wallet_id: WalletId, address: &str) -> Result<()>;

    // --- proposals ---
    async fn insert_proposal(&self, proposal: &TxProposal) -> Result<()>;
    async fn get_proposal(&self, wallet_id: WalletId, id: ProposalId) -> Result<Option<TxProposal>>;
    async fn update_proposal(&self, proposal: &TxProposal) -> Result<()>;
    async fn find_proposal_by_txid(&self, wallet_id: WalletId, txid: [u8; 32]) -> Result<Option<TxProposal>>;
    async fn list_proposals(
        &self,
        wallet_id: WalletId,
        status: Option<ProposalStatus>,
        limit: Option<u32>,
    ) -> Result<Vec<TxProposal>>;
    async fn list_proposals_by_creator(
        &self,
        wallet_id: WalletId,
        creator_copayer_id: &str,
        limit: u32,
    ) -> Result<Vec<TxProposal>>;
    async fn delete_proposal(&self, wallet_id: WalletId, id: ProposalId) -> Result<()>;

    // --- broadcast-tx log (spec.md §6) ---
    async fn record_broadcast(&self, wallet_id: WalletId, proposal_id: ProposalId, inputs: &[UtxoRef], at: DateTime<Utc>) -> Result<()>;
    async fn list_recent_broadcasts(&self, wallet_id: WalletId, since: DateTime<Utc>, limit: usize) -> Result<Vec<(ProposalId, Vec<UtxoRef>)>>;

    // --- notifications ---
    async fn append_notification(&self, notification: Notification) -> Result<Notification>;
    async fn list_notifications(
        &self,
        wallet_id: WalletId,
        after_id: Option<i64>,
        min_ts: Option<DateTime<Utc>>,
    ) -> Result<Vec<Notification>>;

    // --- sessions ---
    async fn get_session_by_copayer(&self, copayer_id: &str) -> Result<Option<Session>>;
    async fn upsert_session(&self, session: &Session) -> Result<()>;

    // --- ancillary records ---
    async fn get_tx_note(&self, wallet_id: WalletId, txid: [u8; 32]) -> Result<Option<TxNote>>;
    async fn upsert_tx_note(&self, note: &TxNote) -> Result<()>;
    async fn list_tx_notes(&self, wallet_id: WalletId, min_ts: Option<DateTime<Utc>>) -> Result<Vec<TxNote>>;

    // --- tx-confirmation subscriptions ---
    async fn upsert_tx_confirmation(&self, sub: &TxConfirmationSubscription) -> Result<()>;
    async fn list_active_tx_confirmations(
        &self,
        wallet_id: WalletId,
        txid: [u8; 32],
    ) -> Result<Vec<TxConfirmationSubscription>>;
    /// Deactivates the caller's own subscription; a no-op if none exists.
    async fn deactivate_tx_confirmation(&self, wallet_id: WalletId, copayer_id: &str, txid: [u8; 32]) -> Result<()>;

    async fn get_preferences(&self, copayer_id: &str) -> Result<Preferences>;
    async fn upsert_preferences(&self, copayer_id: &str, prefs: &Preferences) -> Result<()>;
    async fn upsert_asset_metadata(&self, asset: &AssetMetadata) -> Result<()>;
    async fn get_asset_metadata(&self, asset: &str) -> Result<Option<AssetMetadata>>;
    async fn list_asset_metadata(&self) -> Result<Vec<AssetMetadata>>;

    // --- push-notification subscriptions ---
    async fn upsert_push_subscription(&self, sub: &PushSubscription) -> Result<()>;
    async fn delete_push_subscription(&self, copayer_id: &str, token: &str) -> Result<()>;
}
