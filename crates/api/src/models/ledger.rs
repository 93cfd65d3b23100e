//! Response shapes for the read-only ledger surface (`spec.md` §4.5, §6).
//! `core::traits::{Balance, ExplorerUtxo, HistoryEntry}` carry no `Serialize`
//! impl of their own (only `core`-internal adapters touch them), so the
//! wire format is defined here, hex-encoding binary fields the same way the
//! rest of this crate's request bodies do.

use chrono::{DateTime, Utc};
use serde::Serialize;

use wallet_coord_core::traits::{Balance, ExplorerUtxo, HistoryEntry};
use wallet_coord_core::utxo::UtxoState;

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub stable: u64,
    pub pending: u64,
    pub stable_outputs_count: u32,
    pub pending_outputs_count: u32,
}

impl From<Balance> for BalanceResponse {
    fn from(b: Balance) -> Self {
        Self {
            stable: b.stable,
            pending: b.pending,
            stable_outputs_count: b.stable_outputs_count,
            pending_outputs_count: b.pending_outputs_count,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UtxoResponse {
    pub unit: String,
    pub message_index: u32,
    pub output_index: u32,
    pub address: String,
    pub amount: u64,
    pub asset: Option<String>,
    pub stable: bool,
    pub time: DateTime<Utc>,
    /// `"unlocked"`, `"locked"` (referenced by a pending proposal), or
    /// `"spent"` (referenced by a recent broadcast) — `spec.md` §4.5's
    /// reservation view.
    pub state: &'static str,
}

impl UtxoResponse {
    pub fn from_explorer(u: ExplorerUtxo, state: UtxoState) -> Self {
        let state = match state {
            UtxoState::Unlocked => "unlocked",
            UtxoState::Locked => "locked",
            UtxoState::Spent => "spent",
        };
        Self {
            unit: hex::encode(u.utxo.unit),
            message_index: u.utxo.message_index,
            output_index: u.utxo.output_index,
            address: u.address,
            amount: u.amount,
            asset: u.asset,
            stable: u.stable,
            time: u.time,
            state,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HistoryEntryResponse {
    pub unit: String,
    pub row_id: i64,
    pub amount: i64,
    pub time: DateTime<Utc>,
}

impl From<HistoryEntry> for HistoryEntryResponse {
    fn from(h: HistoryEntry) -> Self {
        Self {
            unit: hex::encode(h.unit),
            row_id: h.row_id,
            amount: h.amount,
            time: h.time,
        }
    }
}
