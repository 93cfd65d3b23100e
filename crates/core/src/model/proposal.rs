//! Transaction proposal records and the twelve `app` kinds (`spec.md` §3, §4.4, §9).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::wallet::{CopayerId, WalletId};

pub type ProposalId = uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProposalStatus {
    Temporary,
    Pending,
    Accepted,
    Broadcasted,
    Rejected,
    Stable,
}

/// The twelve `app` kinds a proposal can carry (`spec.md` §3). Only
/// `Payment` drives input selection; the rest are validated payloads stored
/// and relayed unmodified, per `spec.md` §9's polymorphism note.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "app", rename_all = "snake_case")]
pub enum AppParams {
    Payment(PaymentParams),
    Data(serde_json::Value),
    Text(serde_json::Value),
    Profile(serde_json::Value),
    Poll(serde_json::Value),
    Vote(serde_json::Value),
    DataFeed(serde_json::Value),
    Attestation(serde_json::Value),
    Asset(serde_json::Value),
    AssetAttestors(serde_json::Value),
    AddressDefinitionChange(serde_json::Value),
    DefinitionTemplate(serde_json::Value),
}

impl AppParams {
    pub fn kind(&self) -> &'static str {
        match self {
            AppParams::Payment(_) => "payment",
            AppParams::Data(_) => "data",
            AppParams::Text(_) => "text",
            AppParams::Profile(_) => "profile",
            AppParams::Poll(_) => "poll",
            AppParams::Vote(_) => "vote",
            AppParams::DataFeed(_) => "data_feed",
            AppParams::Attestation(_) => "attestation",
            AppParams::Asset(_) => "asset",
            AppParams::AssetAttestors(_) => "asset_attestors",
            AppParams::AddressDefinitionChange(_) => "address_definition_change",
            AppParams::DefinitionTemplate(_) => "definition_template",
        }
    }

    pub fn is_payment(&self) -> bool {
        matches!(self, AppParams::Payment(_))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentOutput {
    pub to_address: String,
    /// Amount in the ledger's indivisible base unit.
    pub amount: u64,
    pub message: Option<String>,
}

/// Maximum whole-unit supply used to bound a single output amount
/// (`spec.md` §4.4: "positive integer amount within the maximum whole-unit
/// supply"). Modeled on Obyte's total issuance of 1e15 base units.
pub const MAX_OUTPUT_AMOUNT: u64 = 1_000_000_000_000_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentParams {
    pub outputs: Vec<PaymentOutput>,
}

impl PaymentParams {
    /// `spec.md` §4.4: "validates outputs (non-empty, each with a valid
    /// address, positive integer amount within the maximum whole-unit
    /// supply)".
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.outputs.is_empty() {
            return Err(crate::error::Error::Validation {
                field: "outputs".into(),
                reason: "payment must have at least one output".into(),
            });
        }
        for out in &self.outputs {
            if out.to_address.trim().is_empty() {
                return Err(crate::error::Error::InvalidAddress(out.to_address.clone()));
            }
            if out.amount == 0 || out.amount > MAX_OUTPUT_AMOUNT {
                return Err(crate::error::Error::Validation {
                    field: "amount".into(),
                    reason: "amount must be a positive integer within supply bounds".into(),
                });
            }
        }
        Ok(())
    }

    pub fn total(&self) -> u64 {
        self.outputs.iter().map(|o| o.amount).sum()
    }
}

/// One UTXO reference, `(unit, message_index, output_index)` per the
/// GLOSSARY.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Hash)]
pub struct UtxoRef {
    pub unit: [u8; 32],
    pub message_index: u32,
    pub output_index: u32,
}

/// Per-author signing info, keyed by author address (`spec.md` §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SigningInfo {
    pub wallet_id: WalletId,
    pub derivation_path: String,
    /// `pubkey -> signing path`, mirroring `Address::signing_paths`.
    pub signing_paths: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProposalActionType {
    Accept,
    Reject,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposalAction {
    pub copayer_id: CopayerId,
    pub action_type: ProposalActionType,
    /// `input -> signature`, present only for `Accept` actions.
    pub signatures: BTreeMap<UtxoRef, Vec<u8>>,
    pub creator_xpub: String,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxProposal {
    pub id: ProposalId,
    pub wallet_id: WalletId,
    pub creator_copayer_id: CopayerId,
    pub params: AppParams,
    pub change_address: Option<String>,
    /// The raw unit being built, with placeholder signatures. Opaque to the
    /// engine beyond its canonical hash.
    pub draft_joint: Vec<u8>,
    pub inputs: Vec<UtxoRef>,
    /// `input -> source address`, needed to look up the right entry in
    /// `signing_info` when verifying a per-input signature.
    pub input_addresses: BTreeMap<UtxoRef, String>,
    pub signing_info: BTreeMap<String, SigningInfo>,
    pub required_signatures: u8,
    pub required_rejections: u8,
    pub status: ProposalStatus,
    pub actions: Vec<ProposalAction>,
    /// Set once `accepted`.
    pub txid: Option<[u8; 32]>,
    pub broadcast_at: Option<DateTime<Utc>>,
    pub stable: bool,
    pub stable_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl TxProposal {
    pub fn accept_count(&self) -> u8 {
        self.actions
            .iter()
            .filter(|a| a.action_type == ProposalActionType::Accept)
            .count() as u8
    }

    pub fn reject_count(&self) -> u8 {
        self.actions
            .iter()
            .filter(|a| a.action_type == ProposalActionType::Reject)
            .count() as u8
    }

    pub fn has_copayer_voted(&self, copayer_id: &str) -> bool {
        self.actions.iter().any(|a| a.copayer_id == copayer_id)
    }

    /// `spec.md` §4.4 "Remove": creator-only, immediate unless another
    /// copayer has already acted.
    pub fn has_foreign_actions(&self) -> bool {
        self.actions
            .iter()
            .any(|a| a.copayer_id != self.creator_copayer_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payment_rejects_empty_outputs() {
        let p = PaymentParams { outputs: vec![] };
        assert!(p.validate().is_err());
    }

    #[test]
    fn payment_rejects_zero_amount() {
        let p = PaymentParams {
            outputs: vec![PaymentOutput {
                to_address: "ADDR".into(),
                amount: 0,
                message: None,
            }],
        };
        assert!(p.validate().is_err());
    }

    #[test]
    fn payment_accepts_valid_output() {
        let p = PaymentParams {
            outputs: vec![PaymentOutput {
                to_address: "ADDR".into(),
                amount: 100,
                message: None,
            }],
        };
        assert!(p.validate().is_ok());
        assert_eq!(p.total(), 100);
    }
}
