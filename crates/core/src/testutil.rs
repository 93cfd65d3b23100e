//! In-memory reference implementations of the external-collaborator traits
//! (`spec.md` §6), used by this crate's own tests and exposed to downstream
//! crates under the `test-utils` feature.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::model::notification::Notification;
use crate::model::proposal::{ProposalId, ProposalStatus, TxProposal, UtxoRef};
use crate::model::wallet::{Copayer, CopayerIndexEntry, Wallet, WalletId};
use crate::model::{Address, AssetMetadata, Preferences, PushSubscription, Session, TxConfirmationSubscription, TxNote};
use crate::traits::{Balance, Explorer, ExplorerUtxo, HistoryEntry, HubClient, LedgerTransaction, Storage};

/// A single-process, `Mutex`-guarded `Storage` implementation. Not meant for
/// production use — `crates/storage-postgres` provides the real adapter —
/// but sufficient to drive every engine invariant deterministically.
#[derive(Default)]
pub struct InMemoryStorage {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    wallets: HashMap<WalletId, Wallet>,
    copayers: HashMap<String, Copayer>,
    copayer_index: HashMap<String, CopayerIndexEntry>,
    addresses: HashMap<(WalletId, String), Address>,
    proposals: HashMap<(WalletId, ProposalId), TxProposal>,
    broadcasts: HashMap<WalletId, Vec<(ProposalId, Vec<UtxoRef>, DateTime<Utc>)>>,
    notifications: HashMap<WalletId, Vec<Notification>>,
    next_notification_id: HashMap<WalletId, i64>,
    sessions: HashMap<String, Session>,
    tx_notes: HashMap<(WalletId, [u8; 32]), TxNote>,
    tx_confirmations: HashMap<(WalletId, [u8; 32]), Vec<TxConfirmationSubscription>>,
    preferences: HashMap<String, Preferences>,
    assets: HashMap<String, AssetMetadata>,
    push_subscriptions: HashMap<(String, String), PushSubscription>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn insert_wallet(&self, wallet: &Wallet) -> Result<()> {
        self.inner.lock().unwrap().wallets.insert(wallet.id, wallet.clone());
        Ok(())
    }

    async fn get_wallet(&self, id: WalletId) -> Result<Option<Wallet>> {
        Ok(self.inner.lock().unwrap().wallets.get(&id).cloned())
    }

    async fn update_wallet(&self, wallet: &Wallet) -> Result<()> {
        self.inner.lock().unwrap().wallets.insert(wallet.id, wallet.clone());
        Ok(())
    }

    async fn insert_copayer(&self, copayer: &Copayer) -> Result<()> {
        self.inner
            .lock()
            .unwrap()
            .copayers
            .insert(copayer.id.clone(), copayer.clone());
        Ok(())
    }

    async fn get_copayer(&self, id: &str) -> Result<Option<Copayer>> {
        Ok(self.inner.lock().unwrap().copayers.get(id).cloned())
    }

    async fn update_copayer(&self, copayer: &Copayer) -> Result<()> {
        self.inner
            .lock()
            .unwrap()
            .copayers
            .insert(copayer.id.clone(), copayer.clone());
        Ok(())
    }

    async fn list_copayers_by_device(&self, device_id: &str) -> Result<Vec<Copayer>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .copayers
            .values()
            .filter(|c| c.device_id == device_id)
            .cloned()
            .collect())
    }

    async fn register_copayer_index(&self, entry: &CopayerIndexEntry) -> Result<()> {
        self.inner
            .lock()
            .unwrap()
            .copayer_index
            .insert(entry.copayer_id.clone(), entry.clone());
        Ok(())
    }

    async fn lookup_copayer_index(&self, copayer_id: &str) -> Result<Option<CopayerIndexEntry>> {
        Ok(self.inner.lock().unwrap().copayer_index.get(copayer_id).cloned())
    }

    async fn insert_address(&self, address: &Address) -> Result<()> {
        self.inner
            .lock()
            .unwrap()
            .addresses
            .insert((address.wallet_id, address.address.clone()), address.clone());
        Ok(())
    }

    async fn get_address(&self, wallet_id: WalletId, address: &str) -> Result<Option<Address>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .addresses
            .get(&(wallet_id, address.to_string()))
            .cloned())
    }

    async fn find_address_by_path(
        &self,
        wallet_id: WalletId,
        is_change: bool,
        index: u32,
    ) -> Result<Option<Address>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .addresses
            .values()
            .find(|a| a.wallet_id == wallet_id && a.path.is_change == is_change && a.path.index == index)
            .cloned())
    }

    async fn list_addresses(
        &self,
        wallet_id: WalletId,
        is_change: Option<bool>,
        limit: Option<u32>,
        reverse: bool,
    ) -> Result<Vec<Address>> {
        let inner = self.inner.lock().unwrap();
        let mut addrs: Vec<Address> = inner
            .addresses
            .values()
            .filter(|a| a.wallet_id == wallet_id)
            .filter(|a| is_change.map(|ic| ic == a.path.is_change).unwrap_or(true))
            .cloned()
            .collect();
        addrs.sort_by_key(|a| a.path.index);
        if reverse {
            addrs.reverse();
        }
        if let Some(limit) = limit {
            addrs.truncate(limit as usize);
        }
        Ok(addrs)
    }

    async fn mark_address_active(&self, wallet_id: WalletId, address: &str) -> Result<()> {
        if let Some(addr) = self
            .inner
            .lock()
            .unwrap()
            .addresses
            .get_mut(&(wallet_id, address.to_string()))
        {
            addr.has_activity = true;
        }
        Ok(())
    }

    async fn insert_proposal(&self, proposal: &TxProposal) -> Result<()> {
        self.inner
            .lock()
            .unwrap()
            .proposals
            .insert((proposal.wallet_id, proposal.id), proposal.clone());
        Ok(())
    }

    async fn get_proposal(&self, wallet_id: WalletId, id: ProposalId) -> Result<Option<TxProposal>> {
        Ok(self.inner.lock().unwrap().proposals.get(&(wallet_id, id)).cloned())
    }

    async fn update_proposal(&self, proposal: &TxProposal) -> Result<()> {
        self.inner
            .lock()
            .unwrap()
            .proposals
            .insert((proposal.wallet_id, proposal.id), proposal.clone());
        Ok(())
    }

    async fn find_proposal_by_txid(&self, wallet_id: WalletId, txid: [u8; 32]) -> Result<Option<TxProposal>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .proposals
            .values()
            .find(|p| p.wallet_id == wallet_id && p.txid == Some(txid))
            .cloned())
    }

    async fn list_proposals(
        &self,
        wallet_id: WalletId,
        status: Option<ProposalStatus>,
        limit: Option<u32>,
    ) -> Result<Vec<TxProposal>> {
        let inner = self.inner.lock().unwrap();
        let mut proposals: Vec<TxProposal> = inner
            .proposals
            .values()
            .filter(|p| p.wallet_id == wallet_id)
            .filter(|p| status.map(|s| s == p.status).unwrap_or(true))
            .cloned()
            .collect();
        proposals.sort_by_key(|p| p.created_at);
        if let Some(limit) = limit {
            proposals.truncate(limit as usize);
        }
        Ok(proposals)
    }

    async fn list_proposals_by_creator(
        &self,
        wallet_id: WalletId,
        creator_copayer_id: &str,
        limit: u32,
    ) -> Result<Vec<TxProposal>> {
        let inner = self.inner.lock().unwrap();
        let mut proposals: Vec<TxProposal> = inner
            .proposals
            .values()
            .filter(|p| p.wallet_id == wallet_id && p.creator_copayer_id == creator_copayer_id)
            .cloned()
            .collect();
        proposals.sort_by_key(|p| p.created_at);
        proposals.reverse();
        proposals.truncate(limit as usize);
        Ok(proposals)
    }

    async fn delete_proposal(&self, wallet_id: WalletId, id: ProposalId) -> Result<()> {
        self.inner.lock().unwrap().proposals.remove(&(wallet_id, id));
        Ok(())
    }

    async fn record_broadcast(
        &self,
        wallet_id: WalletId,
        proposal_id: ProposalId,
        inputs: &[UtxoRef],
        at: DateTime<Utc>,
    ) -> Result<()> {
        self.inner
            .lock()
            .unwrap()
            .broadcasts
            .entry(wallet_id)
            .or_default()
            .push((proposal_id, inputs.to_vec(), at));
        Ok(())
    }

    async fn list_recent_broadcasts(
        &self,
        wallet_id: WalletId,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<(ProposalId, Vec<UtxoRef>)>> {
        let inner = self.inner.lock().unwrap();
        let mut entries: Vec<_> = inner
            .broadcasts
            .get(&wallet_id)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter(|(_, _, at)| *at >= since)
            .collect();
        entries.sort_by_key(|(_, _, at)| std::cmp::Reverse(*at));
        entries.truncate(limit);
        Ok(entries.into_iter().map(|(id, inputs, _)| (id, inputs)).collect())
    }

    async fn append_notification(&self, mut notification: Notification) -> Result<Notification> {
        let mut inner = self.inner.lock().unwrap();
        let next_id = inner.next_notification_id.entry(notification.wallet_id).or_insert(1);
        notification.id = *next_id;
        *next_id += 1;
        inner
            .notifications
            .entry(notification.wallet_id)
            .or_default()
            .push(notification.clone());
        Ok(notification)
    }

    async fn list_notifications(
        &self,
        wallet_id: WalletId,
        after_id: Option<i64>,
        min_ts: Option<DateTime<Utc>>,
    ) -> Result<Vec<Notification>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .notifications
            .get(&wallet_id)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter(|n| after_id.map(|a| n.id > a).unwrap_or(true))
            .filter(|n| min_ts.map(|t| n.created_at >= t).unwrap_or(true))
            .collect())
    }

    async fn get_session_by_copayer(&self, copayer_id: &str) -> Result<Option<Session>> {
        Ok(self.inner.lock().unwrap().sessions.get(copayer_id).cloned())
    }

    async fn upsert_session(&self, session: &Session) -> Result<()> {
        self.inner
            .lock()
            .unwrap()
            .sessions
            .insert(session.copayer_id.clone(), session.clone());
        Ok(())
    }

    async fn get_tx_note(&self, wallet_id: WalletId, txid: [u8; 32]) -> Result<Option<TxNote>> {
        Ok(self.inner.lock().unwrap().tx_notes.get(&(wallet_id, txid)).cloned())
    }

    async fn upsert_tx_note(&self, note: &TxNote) -> Result<()> {
        self.inner
            .lock()
            .unwrap()
            .tx_notes
            .insert((note.wallet_id, note.txid), note.clone());
        Ok(())
    }

    async fn list_tx_notes(&self, wallet_id: WalletId, min_ts: Option<DateTime<Utc>>) -> Result<Vec<TxNote>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .tx_notes
            .values()
            .filter(|n| n.wallet_id == wallet_id)
            .filter(|n| min_ts.map(|t| n.edited_at >= t).unwrap_or(true))
            .cloned()
            .collect())
    }

    async fn upsert_tx_confirmation(&self, sub: &TxConfirmationSubscription) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let subs = inner.tx_confirmations.entry((sub.wallet_id, sub.txid)).or_default();
        subs.retain(|s| s.copayer_id != sub.copayer_id);
        subs.push(sub.clone());
        Ok(())
    }

    async fn list_active_tx_confirmations(
        &self,
        wallet_id: WalletId,
        txid: [u8; 32],
    ) -> Result<Vec<TxConfirmationSubscription>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .tx_confirmations
            .get(&(wallet_id, txid))
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter(|s| s.active)
            .collect())
    }

    async fn deactivate_tx_confirmation(&self, wallet_id: WalletId, copayer_id: &str, txid: [u8; 32]) -> Result<()> {
        if let Some(subs) = self.inner.lock().unwrap().tx_confirmations.get_mut(&(wallet_id, txid)) {
            for sub in subs.iter_mut().filter(|s| s.copayer_id == copayer_id) {
                sub.active = false;
            }
        }
        Ok(())
    }

    async fn upsert_push_subscription(&self, sub: &PushSubscription) -> Result<()> {
        self.inner
            .lock()
            .unwrap()
            .push_subscriptions
            .insert((sub.copayer_id.clone(), sub.token.clone()), sub.clone());
        Ok(())
    }

    async fn delete_push_subscription(&self, copayer_id: &str, token: &str) -> Result<()> {
        self.inner
            .lock()
            .unwrap()
            .push_subscriptions
            .remove(&(copayer_id.to_string(), token.to_string()));
        Ok(())
    }

    async fn get_preferences(&self, copayer_id: &str) -> Result<Preferences> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .preferences
            .get(copayer_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn upsert_preferences(&self, copayer_id: &str, prefs: &Preferences) -> Result<()> {
        self.inner
            .lock()
            .unwrap()
            .preferences
            .insert(copayer_id.to_string(), prefs.clone());
        Ok(())
    }

    async fn upsert_asset_metadata(&self, asset: &AssetMetadata) -> Result<()> {
        self.inner.lock().unwrap().assets.insert(asset.asset.clone(), asset.clone());
        Ok(())
    }

    async fn get_asset_metadata(&self, asset: &str) -> Result<Option<AssetMetadata>> {
        Ok(self.inner.lock().unwrap().assets.get(asset).cloned())
    }

    async fn list_asset_metadata(&self) -> Result<Vec<AssetMetadata>> {
        Ok(self.inner.lock().unwrap().assets.values().cloned().collect())
    }
}

/// An `Explorer` double whose activity and UTXO views are set up by the
/// test. `inactive()` reports no activity and no UTXOs anywhere, the
/// baseline for gap-limit tests.
pub struct StubExplorer {
    active_addresses: Mutex<std::collections::HashSet<String>>,
    utxos: Mutex<Vec<ExplorerUtxo>>,
    transactions: Mutex<HashMap<[u8; 32], LedgerTransaction>>,
}

impl StubExplorer {
    pub fn inactive() -> Self {
        Self {
            active_addresses: Mutex::new(Default::default()),
            utxos: Mutex::new(Vec::new()),
            transactions: Mutex::new(HashMap::new()),
        }
    }

    pub fn mark_active(&self, address: &str) {
        self.active_addresses.lock().unwrap().insert(address.to_string());
    }

    pub fn add_utxo(&self, utxo: ExplorerUtxo) {
        self.utxos.lock().unwrap().push(utxo);
    }

    pub fn set_transaction(&self, unit: [u8; 32], tx: LedgerTransaction) {
        self.transactions.lock().unwrap().insert(unit, tx);
    }
}

#[async_trait]
impl Explorer for StubExplorer {
    async fn get_utxos(&self, addresses: &[String], asset: Option<&str>) -> Result<Vec<ExplorerUtxo>> {
        Ok(self
            .utxos
            .lock()
            .unwrap()
            .iter()
            .filter(|u| addresses.contains(&u.address))
            .filter(|u| asset.map(|a| u.asset.as_deref() == Some(a)).unwrap_or(true))
            .cloned()
            .collect())
    }

    async fn get_balance(&self, addresses: &[String], asset: Option<&str>) -> Result<Balance> {
        let utxos = self.get_utxos(addresses, asset).await?;
        let mut balance = Balance::default();
        for u in utxos {
            if u.stable {
                balance.stable += u.amount;
                balance.stable_outputs_count += 1;
            } else {
                balance.pending += u.amount;
                balance.pending_outputs_count += 1;
            }
        }
        Ok(balance)
    }

    async fn get_tx_history(
        &self,
        _addresses: &[String],
        _asset: Option<&str>,
        _limit: u32,
        _last_row_id: Option<i64>,
    ) -> Result<Vec<HistoryEntry>> {
        Ok(Vec::new())
    }

    async fn get_address_activity(&self, address: &str) -> Result<bool> {
        Ok(self.active_addresses.lock().unwrap().contains(address))
    }

    async fn get_transaction(&self, unit: [u8; 32]) -> Result<Option<LedgerTransaction>> {
        Ok(self.transactions.lock().unwrap().get(&unit).cloned())
    }
}

/// A `HubClient` double that either always succeeds or always fails,
/// configurable per test.
pub struct StubHub {
    should_fail: bool,
}

impl StubHub {
    pub fn succeeding() -> Self {
        Self { should_fail: false }
    }

    pub fn failing() -> Self {
        Self { should_fail: true }
    }
}

#[async_trait]
impl HubClient for StubHub {
    async fn broadcast_joint(&self, _joint: &[u8]) -> Result<()> {
        if self.should_fail {
            Err(crate::error::Error::Storage(anyhow::anyhow!("hub rejected broadcast")))
        } else {
            Ok(())
        }
    }
}
