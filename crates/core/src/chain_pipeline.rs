//! Blockchain-event reconciliation (`spec.md` §4.6).
//!
//! Pure-ish reconciliation logic for the three event channels the
//! `chain-monitor` crate subscribes to on the local ledger node:
//! `new_joint`, `my_transactions_became_stable`, and `mci_became_stable`.
//! This module only knows how to react to one wallet's worth of state at a
//! time; the I/O shell in `crates/chain-monitor` owns the address-to-wallet
//! watch set and calls the functions here once per affected wallet.

use chrono::{DateTime, Utc};
use serde_json::json;

use crate::error::Result;
use crate::model::misc::AssetMetadata;
use crate::model::notification::NotificationType;
use crate::model::proposal::ProposalStatus;
use crate::model::wallet::{Network, WalletId};
use crate::notify::{self, Ticker};
use crate::traits::{MessageBroker, Storage};

#[derive(Debug, Clone)]
pub struct JointOutput {
    pub address: String,
    pub amount: u64,
}

#[derive(Debug, Clone)]
pub struct NewJointEvent {
    pub unit: [u8; 32],
    pub outputs: Vec<JointOutput>,
}

/// `spec.md` §4.6, `new_joint` handling. Looks for a proposal whose
/// precomputed txid equals the unit hash (outgoing side) and for outputs
/// landing on one of this wallet's own addresses that is neither that
/// proposal's change address nor one of its own input (author) addresses
/// (incoming side), marking every matched address active either way.
pub async fn reconcile_new_joint(
    storage: &dyn Storage,
    broker: &dyn MessageBroker,
    ticker: &Ticker,
    wallet_id: WalletId,
    event: &NewJointEvent,
    now: DateTime<Utc>,
) -> Result<()> {
    let txid_hex = hex::encode(event.unit);

    let mut own_change_address = None;
    let mut own_input_addresses: std::collections::BTreeSet<String> = std::collections::BTreeSet::new();
    if let Some(mut proposal) = storage.find_proposal_by_txid(wallet_id, event.unit).await? {
        own_change_address = proposal.change_address.clone();
        own_input_addresses = proposal.input_addresses.values().cloned().collect();
        if proposal.status == ProposalStatus::Accepted {
            // Our own `broadcast_proposal` path already transitions the
            // proposal and emits `NewOutgoingTx` before the ledger node ever
            // reports the joint; reaching `Accepted` here means somebody
            // else put this unit on the wire first.
            proposal.status = ProposalStatus::Broadcasted;
            proposal.broadcast_at = Some(now);
            storage.update_proposal(&proposal).await?;
            storage
                .record_broadcast(wallet_id, proposal.id, &proposal.inputs, now)
                .await?;
            notify::emit(
                storage,
                broker,
                ticker,
                wallet_id,
                NotificationType::NewOutgoingTxByThirdParty,
                None,
                json!({ "txProposalId": proposal.id, "txid": txid_hex }),
            )
            .await?;
        }
    }

    for output in &event.outputs {
        let Some(address) = storage.get_address(wallet_id, &output.address).await? else {
            continue;
        };
        if !address.has_activity {
            storage.mark_address_active(wallet_id, &address.address).await?;
        }

        if own_change_address.as_deref() == Some(address.address.as_str()) {
            continue;
        }
        if own_input_addresses.contains(&address.address) {
            continue;
        }

        let since = now - chrono::Duration::hours(24);
        let recent = storage.list_notifications(wallet_id, None, Some(since)).await?;
        let already_notified = recent.iter().any(|n| {
            n.notification_type == NotificationType::NewIncomingTx
                && n.data.get("txid").and_then(|v| v.as_str()) == Some(txid_hex.as_str())
                && n.data.get("address").and_then(|v| v.as_str()) == Some(address.address.as_str())
                && n.data.get("amount").and_then(|v| v.as_u64()) == Some(output.amount)
        });
        if already_notified {
            continue;
        }

        notify::emit(
            storage,
            broker,
            ticker,
            wallet_id,
            NotificationType::NewIncomingTx,
            None,
            json!({ "txid": txid_hex, "address": address.address, "amount": output.amount }),
        )
        .await?;
    }

    Ok(())
}

/// `spec.md` §4.6, `mci_became_stable` (and the narrower
/// `my_transactions_became_stable`, which carries the same payload scoped to
/// this wallet's own units). Transitions a matching `broadcasted` proposal
/// to `stable` and fires any single-shot `TxConfirmation` subscriptions.
pub async fn reconcile_stable_unit(
    storage: &dyn Storage,
    broker: &dyn MessageBroker,
    ticker: &Ticker,
    wallet_id: WalletId,
    unit: [u8; 32],
    now: DateTime<Utc>,
) -> Result<()> {
    if let Some(mut proposal) = storage.find_proposal_by_txid(wallet_id, unit).await? {
        if proposal.status == ProposalStatus::Broadcasted {
            proposal.status = ProposalStatus::Stable;
            proposal.stable = true;
            proposal.stable_at = Some(now);
            storage.update_proposal(&proposal).await?;
        }
    }

    for mut sub in storage.list_active_tx_confirmations(wallet_id, unit).await? {
        // Per Open Question resolution: a `TxConfirmation` reports the
        // subscription's own captured coin/network, falling back to the
        // wallet's only if the subscription never recorded one.
        let (coin, network) = if sub.coin.is_some() || sub.network.is_some() {
            (sub.coin.clone(), sub.network)
        } else if let Some(wallet) = storage.get_wallet(wallet_id).await? {
            (Some(wallet.coin), Some(wallet.network))
        } else {
            (None, None::<Network>)
        };

        sub.active = false;
        storage.upsert_tx_confirmation(&sub).await?;
        notify::emit(
            storage,
            broker,
            ticker,
            wallet_id,
            NotificationType::TxConfirmation,
            Some(sub.copayer_id.clone()),
            json!({
                "txid": hex::encode(unit),
                "coin": coin,
                "network": network,
            }),
        )
        .await?;
    }

    Ok(())
}

/// One-off asset-metadata ingestion from a trusted registry set
/// (`spec.md` §4.6). Upserts by `(name, registry)`; a name already claimed
/// by a *different* registry is kept distinct rather than silently merged
/// or rejected, by tagging it with a `#<registry>` suffix.
pub mod asset_registry {
    use super::*;

    #[derive(Debug, Clone)]
    pub struct AssetCandidate {
        pub asset: String,
        pub name: String,
        pub registry: String,
        pub decimals: u8,
    }

    pub async fn upsert(storage: &dyn Storage, candidate: AssetCandidate, now: DateTime<Utc>) -> Result<AssetMetadata> {
        let existing = storage.get_asset_metadata(&candidate.asset).await?;
        let name = match &existing {
            Some(prior) if prior.registry != candidate.registry && prior.name == candidate.name => {
                format!("{}#{}", candidate.name, candidate.registry)
            }
            _ => candidate.name,
        };

        let metadata = AssetMetadata {
            asset: candidate.asset,
            name,
            registry: candidate.registry,
            decimals: candidate.decimals,
            created_at: existing.map(|e| e.created_at).unwrap_or(now),
        };
        storage.upsert_asset_metadata(&metadata).await?;
        Ok(metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::address::DerivationPath;
    use crate::model::wallet::{AddressType, Copayer, DerivationStrategy};
    use crate::model::Address;
    use crate::notify::InProcessBroker;
    use crate::testutil::InMemoryStorage;
    use crate::wallet_service::{create_wallet, CreateWalletRequest};

    async fn one_copayer_wallet(storage: &InMemoryStorage) -> WalletId {
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
                id: "cid".into(),
                wallet_id: wallet.id,
                name: "c".into(),
                xpub: "xpub0".into(),
                account: 0,
                device_id: "dev0".into(),
                request_pub_keys: vec![],
                custom_data: None,
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        wallet.id
    }

    #[tokio::test]
    async fn new_joint_marks_receiving_address_active_and_emits_incoming() {
        let storage = InMemoryStorage::new();
        let broker = InProcessBroker::default();
        let ticker = Ticker::default();
        let wallet_id = one_copayer_wallet(&storage).await;

        storage
            .insert_address(&Address {
                address: "ADDR1".into(),
                wallet_id,
                path: DerivationPath::new(false, 0),
                address_type: AddressType::Normal,
                definition: "[sig,x]".into(),
                signing_paths: Default::default(),
                has_activity: false,
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        let event = NewJointEvent {
            unit: [7u8; 32],
            outputs: vec![JointOutput {
                address: "ADDR1".into(),
                amount: 5_000_000,
            }],
        };
        reconcile_new_joint(&storage, &broker, &ticker, wallet_id, &event, Utc::now())
            .await
            .unwrap();

        let addr = storage.get_address(wallet_id, "ADDR1").await.unwrap().unwrap();
        assert!(addr.has_activity);
    }

    #[tokio::test]
    async fn asset_registry_tags_conflicting_name_with_registry_suffix() {
        let storage = InMemoryStorage::new();
        let now = Utc::now();
        asset_registry::upsert(
            &storage,
            asset_registry::AssetCandidate {
                asset: "ASSET1".into(),
                name: "GoldToken".into(),
                registry: "registryA".into(),
                decimals: 2,
            },
            now,
        )
        .await
        .unwrap();

        let second = asset_registry::upsert(
            &storage,
            asset_registry::AssetCandidate {
                asset: "ASSET1".into(),
                name: "GoldToken".into(),
                registry: "registryB".into(),
                decimals: 2,
            },
            now,
        )
        .await
        .unwrap();

        assert_eq!(second.name, "GoldToken#registryB");
    }
}
