//! Request/response shapes for the transaction-proposal surface
//! (`spec.md` §4.4, §6). `TxProposal` itself is returned verbatim from
//! `core`; only request bodies and list-query parameters live here.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use wallet_coord_core::model::proposal::{AppParams, ProposalId, ProposalStatus, UtxoRef};

#[derive(Debug, Deserialize)]
pub struct CreateProposalBody {
    #[serde(default)]
    pub tx_proposal_id: Option<ProposalId>,
    #[serde(flatten)]
    pub params: AppParams,
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Debug, Deserialize)]
pub struct PublishProposalBody {
    /// Hex-encoded signature over the draft joint.
    pub signature: String,
}

#[derive(Debug, Deserialize)]
pub struct SignatureEntry {
    pub utxo: UtxoRef,
    /// Hex-encoded signature for this input.
    pub signature: String,
}

#[derive(Debug, Deserialize)]
pub struct SignProposalBody {
    pub signatures: Vec<SignatureEntry>,
}

#[derive(Debug, Deserialize)]
pub struct RejectProposalBody {
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ListProposalsQuery {
    pub status: Option<ProposalStatus>,
    pub min_ts: Option<DateTime<Utc>>,
    pub max_ts: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
    pub is_pending: Option<bool>,
    pub app: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BroadcastRawBody {
    /// Hex-encoded joint bytes.
    pub joint: String,
}
