//! Supporting records referenced by `spec.md` §3/§6: tx notes, push
//! subscriptions, confirmation subscriptions, preferences, asset metadata.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::wallet::{CopayerId, Network, WalletId};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxNote {
    pub wallet_id: WalletId,
    pub txid: [u8; 32],
    pub body: String,
    pub edited_by: CopayerId,
    pub edited_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxConfirmationSubscription {
    pub wallet_id: WalletId,
    pub copayer_id: CopayerId,
    pub txid: [u8; 32],
    /// Single-shot: deactivated the moment the notification fires.
    pub active: bool,
    /// Captured at subscription time so the eventual `TxConfirmation`
    /// notification can report the coin/network the subscriber asked
    /// about, falling back to the wallet's own values if unset.
    pub coin: Option<String>,
    pub network: Option<Network>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushSubscription {
    pub copayer_id: CopayerId,
    pub token: String,
    pub platform: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Preferences {
    pub email: Option<String>,
    pub language: Option<String>,
    pub unit: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetMetadata {
    pub asset: String,
    pub name: String,
    /// Registry unit that published this metadata.
    pub registry: String,
    pub decimals: u8,
    pub created_at: DateTime<Utc>,
}
