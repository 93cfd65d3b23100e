//! Append-only per-wallet notification log (`spec.md` §3, §4.7).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::wallet::{CopayerId, WalletId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum NotificationType {
    WalletComplete,
    NewTxProposal,
    TxProposalAcceptedBy,
    TxProposalFinallyAccepted,
    TxProposalRejectedBy,
    TxProposalFinallyRejected,
    TxProposalRemoved,
    NewOutgoingTx,
    NewOutgoingTxByThirdParty,
    NewIncomingTx,
    TxConfirmation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    /// Storage-assigned id, strictly increasing per wallet.
    pub id: i64,
    /// Per-process monotonic counter, combined with `id` to break ties
    /// within the same millisecond (`spec.md` §9).
    pub ticker: u64,
    pub wallet_id: WalletId,
    pub notification_type: NotificationType,
    pub creator_id: Option<CopayerId>,
    pub data: serde_json::Value,
    pub created_at: DateTime<Utc>,
}
