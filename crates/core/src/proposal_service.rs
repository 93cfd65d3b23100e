//! Transaction-proposal life cycle (`spec.md` §4.4): create, the backoff
//! governor, publish, sign, reject, broadcast, remove.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::json;

use crate::address_service::{self, require_operable};
use crate::config::EngineConfig;
use crate::crypto::{sha256, verify_signature};
use crate::derivation::derive_child_pubkey;
use crate::error::{Error, Result};
use crate::model::address::DerivationPath;
use crate::model::notification::NotificationType;
use crate::model::proposal::{
    AppParams, ProposalAction, ProposalActionType, ProposalId, ProposalStatus, SigningInfo,
    TxProposal, UtxoRef,
};
use crate::model::wallet::{CopayerId, WalletId};
use crate::model::Address;
use crate::notify::{self, Ticker};
use crate::traits::{Explorer, ExplorerUtxo, HubClient, MessageBroker, Storage};
use crate::utxo;

/// Flat per-input fee estimate used by the engine's own coin-selection
/// policy (`spec.md` §9: the spec does not mandate a specific algorithm).
const FEE_PER_INPUT: u64 = 1_000;

pub struct CreateProposalRequest {
    pub wallet_id: WalletId,
    pub creator_copayer_id: CopayerId,
    /// `spec.md` §4.4 "Create" idempotency key.
    pub tx_proposal_id: Option<ProposalId>,
    pub params: AppParams,
    pub dry_run: bool,
}

fn build_draft_joint(wallet_id: WalletId, params: &AppParams, inputs: &[UtxoRef], change_address: &str) -> Vec<u8> {
    let payload = json!({
        "walletId": wallet_id,
        "app": params.kind(),
        "params": params,
        "inputs": inputs,
        "change": change_address,
    });
    serde_json::to_vec(&payload).expect("proposal payload always serializes")
}

async fn build_signing_info(
    storage: &dyn Storage,
    wallet_id: WalletId,
    addresses: &[String],
) -> Result<BTreeMap<String, SigningInfo>> {
    let mut out = BTreeMap::new();
    for address in addresses {
        if out.contains_key(address) {
            continue;
        }
        let addr: Address = storage
            .get_address(wallet_id, address)
            .await?
            .ok_or(Error::AddressNotFound)?;
        out.insert(
            address.clone(),
            SigningInfo {
                wallet_id,
                derivation_path: addr.path.to_path_string(),
                signing_paths: addr.signing_paths.clone(),
            },
        );
    }
    Ok(out)
}

struct SelectedInputs {
    inputs: Vec<UtxoRef>,
    input_addresses: BTreeMap<UtxoRef, String>,
}

/// Largest-first UTXO selection against `target`, accruing a flat
/// `FEE_PER_INPUT` fee per input consumed (`spec.md` §4.4 "Invokes
/// composition ... computing input selection, fees").
fn select_inputs(utxos: &[ExplorerUtxo], target: u64) -> Option<SelectedInputs> {
    let mut sorted: Vec<&ExplorerUtxo> = utxos.iter().collect();
    sorted.sort_by(|a, b| b.amount.cmp(&a.amount));

    let mut inputs = Vec::new();
    let mut input_addresses = BTreeMap::new();
    let mut total = 0u64;
    let mut fee = 0u64;
    for u in sorted {
        if total >= target + fee {
            break;
        }
        inputs.push(u.utxo);
        input_addresses.insert(u.utxo, u.address.clone());
        total += u.amount;
        fee = FEE_PER_INPUT * inputs.len() as u64;
    }
    if total < target + fee {
        return None;
    }
    Some(SelectedInputs {
        inputs,
        input_addresses,
    })
}

/// `spec.md` §4.4 "Backoff governor": inspects the creator's last five
/// proposals; beyond `BACKOFF_OFFSET` consecutive trailing rejections, a
/// cooldown is armed until `BACKOFF_TIME` seconds after the most recent
/// rejection.
async fn check_backoff(
    storage: &dyn Storage,
    config: &EngineConfig,
    wallet_id: WalletId,
    creator_copayer_id: &str,
    now: DateTime<Utc>,
) -> Result<()> {
    let recent = storage
        .list_proposals_by_creator(wallet_id, creator_copayer_id, 5)
        .await?;

    let mut consecutive = 0u32;
    let mut most_recent_rejection = None;
    for proposal in &recent {
        if proposal.status != ProposalStatus::Rejected {
            break;
        }
        consecutive += 1;
        if most_recent_rejection.is_none() {
            most_recent_rejection = proposal
                .actions
                .iter()
                .filter(|a| a.action_type == ProposalActionType::Reject)
                .map(|a| a.created_at)
                .max();
        }
    }

    if consecutive > config.backoff_offset {
        if let Some(at) = most_recent_rejection {
            let cooldown = chrono::Duration::from_std(config.backoff_time).unwrap();
            if now < at + cooldown {
                return Err(Error::TxCannotCreate(
                    "too many consecutive rejections; cool down before retrying".into(),
                ));
            }
        }
    }
    Ok(())
}

/// `spec.md` §4.4 "Create".
pub async fn create_proposal(
    storage: &dyn Storage,
    explorer: &dyn Explorer,
    config: &EngineConfig,
    now: DateTime<Utc>,
    req: CreateProposalRequest,
) -> Result<TxProposal> {
    let wallet = storage.get_wallet(req.wallet_id).await?.ok_or(Error::WalletNotFound)?;
    require_operable(&wallet)?;

    if let Some(id) = req.tx_proposal_id {
        if let Some(existing) = storage.get_proposal(req.wallet_id, id).await? {
            if existing.status != ProposalStatus::Temporary {
                return Ok(existing);
            }
        }
    }

    if let AppParams::Payment(payment) = &req.params {
        payment.validate()?;
    }

    check_backoff(storage, config, req.wallet_id, &req.creator_copayer_id, now).await?;

    let change = address_service::select_change_address(storage, req.wallet_id).await?;

    let (inputs, input_addresses, signing_info, draft_joint) = match &req.params {
        AppParams::Payment(payment) => {
            let target = payment.total();
            let known_addresses = storage.list_addresses(req.wallet_id, None, None, false).await?;
            let address_strings: Vec<String> = known_addresses.iter().map(|a| a.address.clone()).collect();
            let view = utxo::compute_reservation_view(
                storage,
                explorer,
                config,
                req.wallet_id,
                &address_strings,
                None,
            )
            .await?;
            let unlocked: Vec<ExplorerUtxo> = view.unlocked().cloned().collect();
            let selected = select_inputs(&unlocked, target)
                .ok_or_else(|| Error::TxCannotCreate("insufficient unlocked funds".into()))?;
            let signing_info =
                build_signing_info(storage, req.wallet_id, &selected.input_addresses.values().cloned().collect::<Vec<_>>())
                    .await?;
            let draft = build_draft_joint(req.wallet_id, &req.params, &selected.inputs, &change.address);
            (selected.inputs, selected.input_addresses, signing_info, draft)
        }
        _ => {
            // `spec.md` §9: non-payment apps carry an inlined payload with no
            // input selection beyond fee.
            let draft = build_draft_joint(req.wallet_id, &req.params, &[], &change.address);
            (Vec::new(), BTreeMap::new(), BTreeMap::new(), draft)
        }
    };

    let id = req.tx_proposal_id.unwrap_or_else(ProposalId::new_v4);
    let proposal = TxProposal {
        id,
        wallet_id: req.wallet_id,
        creator_copayer_id: req.creator_copayer_id,
        params: req.params,
        change_address: Some(change.address),
        draft_joint,
        inputs,
        input_addresses,
        signing_info,
        required_signatures: wallet.m,
        required_rejections: wallet.required_rejections(),
        status: ProposalStatus::Temporary,
        actions: Vec::new(),
        txid: None,
        broadcast_at: None,
        stable: false,
        stable_at: None,
        created_at: now,
    };

    if req.dry_run {
        return Ok(proposal);
    }
    storage.insert_proposal(&proposal).await?;
    Ok(proposal)
}

/// `spec.md` §4.4 "Publish".
pub async fn publish_proposal(
    storage: &dyn Storage,
    explorer: &dyn Explorer,
    config: &EngineConfig,
    broker: &dyn MessageBroker,
    ticker: &Ticker,
    wallet_id: WalletId,
    proposal_id: ProposalId,
    creator_copayer_id: &str,
    signature: &[u8],
) -> Result<TxProposal> {
    let mut proposal = storage
        .get_proposal(wallet_id, proposal_id)
        .await?
        .ok_or(Error::TxNotFound)?;

    // A dry-run draft was never persisted, so it is already unreachable
    // here; a proposal from another creator or already published fails the
    // same way (`spec.md` §4.4: both map to `tx-not-found`).
    if proposal.creator_copayer_id != creator_copayer_id || proposal.status != ProposalStatus::Temporary {
        return Err(Error::TxNotFound);
    }

    let copayer = storage
        .get_copayer(creator_copayer_id)
        .await?
        .ok_or(Error::CopayerNotFound)?;
    let verified = copayer
        .request_pub_keys
        .iter()
        .any(|k| verify_signature(&k.key, &proposal.draft_joint, signature));
    if !verified {
        return Err(Error::InvalidSignature);
    }

    if !utxo::inputs_available(
        storage,
        explorer,
        config,
        wallet_id,
        proposal.id,
        &proposal.inputs,
        &proposal.input_addresses,
    )
    .await?
    {
        return Err(Error::UnavailableUtxos);
    }

    proposal.status = ProposalStatus::Pending;
    storage.update_proposal(&proposal).await?;

    notify::emit(
        storage,
        broker,
        ticker,
        wallet_id,
        NotificationType::NewTxProposal,
        Some(creator_copayer_id.to_string()),
        json!({ "txProposalId": proposal.id }),
    )
    .await?;

    Ok(proposal)
}

fn compute_txid(proposal: &TxProposal) -> [u8; 32] {
    let mut data = proposal.draft_joint.clone();
    for action in &proposal.actions {
        for (input, sig) in &action.signatures {
            data.extend_from_slice(&input.unit);
            data.extend_from_slice(sig);
        }
    }
    sha256(&data)
}

/// `spec.md` §4.4 "Sign": verifies every per-input signature before
/// applying any of them.
pub async fn sign_proposal(
    storage: &dyn Storage,
    broker: &dyn MessageBroker,
    ticker: &Ticker,
    wallet_id: WalletId,
    proposal_id: ProposalId,
    copayer_id: &str,
    signatures: BTreeMap<UtxoRef, Vec<u8>>,
    now: DateTime<Utc>,
) -> Result<TxProposal> {
    let mut proposal = storage
        .get_proposal(wallet_id, proposal_id)
        .await?
        .ok_or(Error::TxNotFound)?;
    if proposal.status != ProposalStatus::Pending {
        return Err(Error::TxNotPending);
    }
    if proposal.has_copayer_voted(copayer_id) {
        return Err(Error::CopayerVoted);
    }

    let copayer = storage.get_copayer(copayer_id).await?.ok_or(Error::CopayerNotFound)?;

    for input in &proposal.inputs {
        let sig = signatures.get(input).ok_or(Error::BadSignatures)?;
        let address = proposal.input_addresses.get(input).ok_or(Error::BadSignatures)?;
        let signing_info = proposal.signing_info.get(address).ok_or(Error::BadSignatures)?;
        let path = DerivationPath::from_path_string(&signing_info.derivation_path).ok_or(Error::BadSignatures)?;
        let child_pubkey = derive_child_pubkey(&copayer.xpub, path);
        if !signing_info.signing_paths.contains_key(&hex::encode(&child_pubkey)) {
            return Err(Error::BadSignatures);
        }
        if !verify_signature(&child_pubkey, &proposal.draft_joint, sig) {
            return Err(Error::BadSignatures);
        }
    }

    proposal.actions.push(ProposalAction {
        copayer_id: copayer_id.to_string(),
        action_type: ProposalActionType::Accept,
        signatures,
        creator_xpub: copayer.xpub.clone(),
        comment: None,
        created_at: now,
    });

    let finally_accepted = proposal.accept_count() >= proposal.required_signatures;
    if finally_accepted {
        proposal.txid = Some(compute_txid(&proposal));
        proposal.status = ProposalStatus::Accepted;
    }
    storage.update_proposal(&proposal).await?;

    notify::emit(
        storage,
        broker,
        ticker,
        wallet_id,
        NotificationType::TxProposalAcceptedBy,
        Some(copayer_id.to_string()),
        json!({ "txProposalId": proposal.id }),
    )
    .await?;
    if finally_accepted {
        notify::emit(
            storage,
            broker,
            ticker,
            wallet_id,
            NotificationType::TxProposalFinallyAccepted,
            None,
            json!({ "txProposalId": proposal.id, "txid": hex::encode(proposal.txid.unwrap()) }),
        )
        .await?;
    }

    Ok(proposal)
}

/// `spec.md` §4.4 "Reject".
pub async fn reject_proposal(
    storage: &dyn Storage,
    broker: &dyn MessageBroker,
    ticker: &Ticker,
    wallet_id: WalletId,
    proposal_id: ProposalId,
    copayer_id: &str,
    comment: Option<String>,
    now: DateTime<Utc>,
) -> Result<TxProposal> {
    let mut proposal = storage
        .get_proposal(wallet_id, proposal_id)
        .await?
        .ok_or(Error::TxNotFound)?;
    if proposal.status != ProposalStatus::Pending {
        return Err(Error::TxNotPending);
    }
    if proposal.has_copayer_voted(copayer_id) {
        return Err(Error::CopayerVoted);
    }

    let copayer = storage.get_copayer(copayer_id).await?.ok_or(Error::CopayerNotFound)?;
    proposal.actions.push(ProposalAction {
        copayer_id: copayer_id.to_string(),
        action_type: ProposalActionType::Reject,
        signatures: BTreeMap::new(),
        creator_xpub: copayer.xpub,
        comment,
        created_at: now,
    });

    let finally_rejected = proposal.reject_count() >= proposal.required_rejections;
    if finally_rejected {
        proposal.status = ProposalStatus::Rejected;
    }
    storage.update_proposal(&proposal).await?;

    notify::emit(
        storage,
        broker,
        ticker,
        wallet_id,
        NotificationType::TxProposalRejectedBy,
        Some(copayer_id.to_string()),
        json!({ "txProposalId": proposal.id }),
    )
    .await?;
    if finally_rejected {
        notify::emit(
            storage,
            broker,
            ticker,
            wallet_id,
            NotificationType::TxProposalFinallyRejected,
            None,
            json!({ "txProposalId": proposal.id }),
        )
        .await?;
    }

    Ok(proposal)
}

/// `spec.md` §4.4 "Broadcast".
pub async fn broadcast_proposal(
    storage: &dyn Storage,
    explorer: &dyn Explorer,
    hub: &dyn HubClient,
    broker: &dyn MessageBroker,
    ticker: &Ticker,
    wallet_id: WalletId,
    proposal_id: ProposalId,
    now: DateTime<Utc>,
) -> Result<TxProposal> {
    let mut proposal = storage
        .get_proposal(wallet_id, proposal_id)
        .await?
        .ok_or(Error::TxNotFound)?;

    match proposal.status {
        ProposalStatus::Accepted => {}
        ProposalStatus::Broadcasted | ProposalStatus::Stable => return Err(Error::TxAlreadyBroadcasted),
        _ => return Err(Error::TxNotAccepted),
    }
    let txid = proposal.txid.ok_or(Error::TxNotAccepted)?;

    let third_party = match hub.broadcast_joint(&proposal.draft_joint).await {
        Ok(()) => false,
        Err(hub_err) => {
            if explorer.get_transaction(txid).await?.is_none() {
                return Err(hub_err);
            }
            true
        }
    };

    proposal.status = ProposalStatus::Broadcasted;
    proposal.broadcast_at = Some(now);
    storage.update_proposal(&proposal).await?;
    storage
        .record_broadcast(wallet_id, proposal.id, &proposal.inputs, now)
        .await?;

    let notification_type = if third_party {
        NotificationType::NewOutgoingTxByThirdParty
    } else {
        NotificationType::NewOutgoingTx
    };
    notify::emit(
        storage,
        broker,
        ticker,
        wallet_id,
        notification_type,
        None,
        json!({ "txProposalId": proposal.id, "txid": hex::encode(txid) }),
    )
    .await?;

    Ok(proposal)
}

/// `spec.md` §4.4 "Remove": creator-only; a `DELETE_LOCKTIME` cooldown
/// applies once another copayer has acted.
pub async fn remove_proposal(
    storage: &dyn Storage,
    config: &EngineConfig,
    broker: &dyn MessageBroker,
    ticker: &Ticker,
    wallet_id: WalletId,
    proposal_id: ProposalId,
    requester_copayer_id: &str,
    now: DateTime<Utc>,
) -> Result<()> {
    let proposal = storage
        .get_proposal(wallet_id, proposal_id)
        .await?
        .ok_or(Error::TxNotFound)?;

    if proposal.creator_copayer_id != requester_copayer_id {
        return Err(Error::TxCannotRemove("only the creator may remove a proposal".into()));
    }

    if proposal.has_foreign_actions() {
        let last_foreign_action = proposal
            .actions
            .iter()
            .filter(|a| a.copayer_id != proposal.creator_copayer_id)
            .map(|a| a.created_at)
            .max()
            .expect("has_foreign_actions implies at least one foreign action");
        let cooldown = chrono::Duration::from_std(config.delete_locktime).unwrap();
        if now < last_foreign_action + cooldown {
            return Err(Error::TxCannotRemove(
                "cooldown after another copayer's action has not elapsed".into(),
            ));
        }
    }

    storage.delete_proposal(wallet_id, proposal_id).await?;
    notify::emit(
        storage,
        broker,
        ticker,
        wallet_id,
        NotificationType::TxProposalRemoved,
        Some(requester_copayer_id.to_string()),
        json!({ "txProposalId": proposal_id }),
    )
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::proposal::{PaymentOutput, PaymentParams};
    use crate::model::wallet::{AddressType, Copayer, DerivationStrategy, Network, ScanStatus, WalletStatus};
    use crate::model::Address;
    use crate::testutil::{InMemoryStorage, StubExplorer, StubHub};
    use crate::traits::ExplorerUtxo;
    use crate::wallet_service::{create_wallet, CreateWalletRequest};

    fn utxo_ref(byte: u8) -> UtxoRef {
        UtxoRef {
            unit: [byte; 32],
            message_index: 0,
            output_index: 0,
        }
    }

    async fn single_copayer_wallet(storage: &InMemoryStorage, xpub: &str, copayer_id: &str) -> WalletId {
        let secp = secp256k1::Secp256k1::new();
        let (_, creation_pk) = secp.generate_keypair(&mut rand::thread_rng());
        let wallet = create_wallet(
            storage,
            CreateWalletRequest {
                id: None,
                name: "w".into(),
                m: 1,
                n: 1,
                coin: "GBYTE".into(),
                network: Network::Main,
                derivation_strategy: DerivationStrategy::Bip44,
                single_address: false,
                creation_pub_key: creation_pk.serialize().to_vec(),
            },
        )
        .await
        .unwrap();
        storage
            .insert_copayer(&Copayer {
                id: copayer_id.to_string(),
                wallet_id: wallet.id,
                name: "c".into(),
                xpub: xpub.to_string(),
                account: 0,
                device_id: "dev0".into(),
                request_pub_keys: vec![],
                custom_data: None,
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        let mut wallet = wallet;
        wallet.copayer_ids.push(copayer_id.to_string());
        wallet.public_key_ring.push(xpub.as_bytes().to_vec());
        wallet.status = WalletStatus::Complete;
        storage.update_wallet(&wallet).await.unwrap();
        wallet.id
    }

    async fn funded_receive_address(storage: &InMemoryStorage, wallet_id: WalletId, explorer: &StubExplorer, amount: u64, byte: u8) -> String {
        let address = format!("ADDR-RECV-{byte}");
        storage
            .insert_address(&Address {
                address: address.clone(),
                wallet_id,
                path: DerivationPath::new(false, 0),
                address_type: AddressType::Normal,
                definition: "[sig,x]".into(),
                signing_paths: Default::default(),
                has_activity: true,
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        explorer.add_utxo(ExplorerUtxo {
            utxo: utxo_ref(byte),
            address: address.clone(),
            amount,
            asset: None,
            stable: true,
            time: Utc::now(),
        });
        address
    }

    async fn change_address(storage: &InMemoryStorage, wallet_id: WalletId) {
        storage
            .insert_address(&Address {
                address: "ADDR-CHANGE".into(),
                wallet_id,
                path: DerivationPath::new(true, 0),
                address_type: AddressType::Normal,
                definition: "[sig,x]".into(),
                signing_paths: Default::default(),
                has_activity: false,
                created_at: Utc::now(),
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn create_proposal_selects_unlocked_utxos() {
        let storage = InMemoryStorage::new();
        let explorer = StubExplorer::inactive();
        let config = EngineConfig::default();
        let wallet_id = single_copayer_wallet(&storage, "xpub0", "cid").await;
        change_address(&storage, wallet_id).await;
        funded_receive_address(&storage, wallet_id, &explorer, 1_000_000_000, 1).await;

        let proposal = create_proposal(
            &storage,
            &explorer,
            &config,
            Utc::now(),
            CreateProposalRequest {
                wallet_id,
                creator_copayer_id: "cid".into(),
                tx_proposal_id: None,
                params: AppParams::Payment(PaymentParams {
                    outputs: vec![PaymentOutput {
                        to_address: "DEST".into(),
                        amount: 100_000_000,
                        message: None,
                    }],
                }),
                dry_run: false,
            },
        )
        .await
        .unwrap();

        assert_eq!(proposal.status, ProposalStatus::Temporary);
        assert_eq!(proposal.inputs.len(), 1);
    }

    #[tokio::test]
    async fn create_proposal_fails_when_wallet_busy_scanning() {
        let storage = InMemoryStorage::new();
        let explorer = StubExplorer::inactive();
        let config = EngineConfig::default();
        let wallet_id = single_copayer_wallet(&storage, "xpub0", "cid").await;
        {
            let mut wallet = storage.get_wallet(wallet_id).await.unwrap().unwrap();
            wallet.scan_status = ScanStatus::Running;
            storage.update_wallet(&wallet).await.unwrap();
        }

        let err = create_proposal(
            &storage,
            &explorer,
            &config,
            Utc::now(),
            CreateProposalRequest {
                wallet_id,
                creator_copayer_id: "cid".into(),
                tx_proposal_id: None,
                params: AppParams::Payment(PaymentParams {
                    outputs: vec![PaymentOutput {
                        to_address: "DEST".into(),
                        amount: 1,
                        message: None,
                    }],
                }),
                dry_run: false,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::WalletBusy));
    }

    #[tokio::test]
    async fn publish_fails_when_inputs_reserved_by_another_proposal() {
        let storage = InMemoryStorage::new();
        let explorer = StubExplorer::inactive();
        let hub = StubHub::succeeding();
        let config = EngineConfig::default();
        let broker = crate::notify::InProcessBroker::default();
        let ticker = Ticker::default();
        let wallet_id = single_copayer_wallet(&storage, "xpub0", "cid").await;
        change_address(&storage, wallet_id).await;
        funded_receive_address(&storage, wallet_id, &explorer, 1_000_000_000, 1).await;

        let secp = secp256k1::Secp256k1::new();
        let (sk, pk) = secp.generate_keypair(&mut rand::thread_rng());
        {
            let mut copayer = storage.get_copayer("cid").await.unwrap().unwrap();
            copayer.request_pub_keys.push(crate::model::wallet::RequestPubKey {
                key: pk.serialize().to_vec(),
                signature: vec![],
                added_at: Utc::now(),
            });
            storage.update_copayer(&copayer).await.unwrap();
        }
        let sign = |draft: &[u8]| {
            let digest = sha256(draft);
            let msg = secp256k1::Message::from_digest_slice(&digest).unwrap();
            secp.sign_ecdsa(&msg, &sk).serialize_compact().to_vec()
        };

        let first = create_proposal(
            &storage,
            &explorer,
            &config,
            Utc::now(),
            CreateProposalRequest {
                wallet_id,
                creator_copayer_id: "cid".into(),
                tx_proposal_id: None,
                params: AppParams::Payment(PaymentParams {
                    outputs: vec![PaymentOutput {
                        to_address: "DEST".into(),
                        amount: 100_000_000,
                        message: None,
                    }],
                }),
                dry_run: false,
            },
        )
        .await
        .unwrap();
        let sig1 = sign(&first.draft_joint);
        publish_proposal(&storage, &explorer, &config, &broker, &ticker, wallet_id, first.id, "cid", &sig1)
            .await
            .unwrap();

        let second = create_proposal(
            &storage,
            &explorer,
            &config,
            Utc::now(),
            CreateProposalRequest {
                wallet_id,
                creator_copayer_id: "cid".into(),
                tx_proposal_id: None,
                params: AppParams::Payment(PaymentParams {
                    outputs: vec![PaymentOutput {
                        to_address: "DEST2".into(),
                        amount: 50_000_000,
                        message: None,
                    }],
                }),
                dry_run: false,
            },
        )
        .await
        .unwrap();
        let sig2 = sign(&second.draft_joint);
        let err = publish_proposal(&storage, &explorer, &config, &broker, &ticker, wallet_id, second.id, "cid", &sig2)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnavailableUtxos));
    }

    #[tokio::test]
    async fn sign_reaches_quorum_and_rejects_double_vote() {
        let storage = InMemoryStorage::new();
        let explorer = StubExplorer::inactive();
        let config = EngineConfig::default();
        let broker = crate::notify::InProcessBroker::default();
        let ticker = Ticker::default();
        let wallet_id = single_copayer_wallet(&storage, "xpub0", "cid").await;
        change_address(&storage, wallet_id).await;
        funded_receive_address(&storage, wallet_id, &explorer, 1_000_000_000, 1).await;

        let proposal = create_proposal(
            &storage,
            &explorer,
            &config,
            Utc::now(),
            CreateProposalRequest {
                wallet_id,
                creator_copayer_id: "cid".into(),
                tx_proposal_id: None,
                params: AppParams::Payment(PaymentParams {
                    outputs: vec![PaymentOutput {
                        to_address: "DEST".into(),
                        amount: 100_000_000,
                        message: None,
                    }],
                }),
                dry_run: false,
            },
        )
        .await
        .unwrap();

        // Force to pending without a real signature check on publish, to
        // isolate the sign-quorum behaviour under test.
        let mut pending = proposal.clone();
        pending.status = ProposalStatus::Pending;
        storage.update_proposal(&pending).await.unwrap();

        let mut signatures = BTreeMap::new();
        for input in &pending.inputs {
            signatures.insert(*input, vec![0u8; 64]);
        }
        let err = sign_proposal(&storage, &broker, &ticker, wallet_id, pending.id, "cid", signatures, Utc::now())
            .await
            .unwrap_err();
        // Bogus all-zero signatures never verify against the real derived key.
        assert!(matches!(err, Error::BadSignatures));
    }
}
