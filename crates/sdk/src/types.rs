//! Wire request/response shapes for the HTTP surface (`spec.md` §6).
//!
//! Persisted entities (`Wallet`, `Copayer`, `TxProposal`, ...) already carry
//! `serde` derives in `wallet_coord_core::model`, so responses that echo a
//! stored record back verbatim are re-exported here rather than duplicated.
//! Only request bodies and the handful of response shapes the API crate
//! builds just for the wire (balances, UTXOs, scan counts, ...) get their
//! own type.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use wallet_coord_core::model::proposal::{AppParams, ProposalId, ProposalStatus, TxProposal, UtxoRef};
pub use wallet_coord_core::model::wallet::{
    Copayer, DerivationStrategy, Network, ScanStatus, Wallet, WalletId, WalletStatus,
};
pub use wallet_coord_core::model::{Address, AssetMetadata, Notification, Preferences, Session, TxNote};

#[derive(Debug, Clone, Serialize)]
pub struct CreateWalletRequest {
    pub id: Option<WalletId>,
    pub name: String,
    pub m: u8,
    pub n: u8,
    pub coin: String,
    pub network: Network,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub derivation_strategy: Option<DerivationStrategy>,
    #[serde(default)]
    pub single_address: bool,
    /// Hex-encoded secp256k1 public key.
    pub creation_pub_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateWalletResponse {
    pub wallet_id: WalletId,
}

#[derive(Debug, Clone, Serialize)]
pub struct JoinWalletRequest {
    pub wallet_id: WalletId,
    pub device_id: String,
    pub account: u32,
    pub name: String,
    pub x_pub_key: String,
    /// Hex-encoded secp256k1 public key.
    pub request_pub_key: String,
    /// Hex-encoded signature over `(name, xPubKey, requestPubKey)`.
    pub copayer_signature: String,
    pub coin: String,
    pub network: Network,
    #[serde(default)]
    pub custom_data: Option<serde_json::Value>,
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JoinWalletResponse {
    #[serde(flatten)]
    pub wallet: Wallet,
    pub copayer: Copayer,
}

#[derive(Debug, Clone, Serialize)]
pub struct AddAccessRequest {
    /// Hex-encoded secp256k1 public key.
    pub new_request_pub_key: String,
    /// Hex-encoded signature.
    pub signature: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpdateNameRequest {
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ListAddressesQuery {
    pub limit: Option<u32>,
    #[serde(default)]
    pub reverse: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanResponse {
    pub receive_created: u32,
    pub change_created: u32,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AddressSetQuery {
    pub addresses: Option<String>,
    pub asset: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BalanceResponse {
    pub stable: u64,
    pub pending: u64,
    pub stable_outputs_count: u32,
    pub pending_outputs_count: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UtxoResponse {
    pub unit: String,
    pub message_index: u32,
    pub output_index: u32,
    pub address: String,
    pub amount: u64,
    pub asset: Option<String>,
    pub stable: bool,
    pub time: DateTime<Utc>,
    pub state: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TxHistoryQuery {
    pub addresses: Option<String>,
    pub asset: Option<String>,
    pub limit: Option<u32>,
    pub last_row_id: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HistoryEntryResponse {
    pub unit: String,
    pub row_id: i64,
    pub amount: i64,
    pub time: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ListProposalsQuery {
    pub status: Option<ProposalStatus>,
    pub min_ts: Option<DateTime<Utc>>,
    pub max_ts: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
    pub is_pending: Option<bool>,
    pub app: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateProposalRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_proposal_id: Option<ProposalId>,
    #[serde(flatten)]
    pub params: AppParams,
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PublishProposalRequest {
    /// Hex-encoded signature over the draft joint.
    pub signature: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SignatureEntry {
    pub utxo: UtxoRef,
    /// Hex-encoded signature for this input.
    pub signature: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SignProposalRequest {
    pub signatures: Vec<SignatureEntry>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RejectProposalRequest {
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BroadcastRawRequest {
    /// Hex-encoded joint bytes.
    pub joint: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawJointResponse {
    pub joint: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TxNoteRequest {
    pub body: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TxNotesQuery {
    pub min_ts: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TxConfirmationRequest {
    /// Hex-encoded transaction id.
    pub txid: String,
    #[serde(default)]
    pub coin: Option<String>,
    #[serde(default)]
    pub network: Option<Network>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PushSubscriptionRequest {
    pub token: String,
    pub platform: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FiatRateQuery {
    pub code: Option<String>,
    pub ts: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FiatRateResponse {
    pub code: String,
    pub rate: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct NotificationsQuery {
    pub time_span: Option<i64>,
    pub notification_id: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}
