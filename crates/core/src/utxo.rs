//! UTXO reservation (`spec.md` §4.5).
//!
//! The engine holds no persistent UTXO table; the explorer is the source of
//! truth. `compute_reservation_view` fuses a live explorer read with the
//! wallet's pending proposals and recently-broadcast log to answer one
//! question: is this input safe to spend right now?

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};

use crate::config::EngineConfig;
use crate::error::Result;
use crate::model::proposal::{ProposalStatus, UtxoRef};
use crate::model::wallet::WalletId;
use crate::traits::{Explorer, ExplorerUtxo, Storage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UtxoState {
    /// Free to reference from a new proposal.
    Unlocked,
    /// Referenced by a pending proposal of this wallet.
    Locked,
    /// Referenced by a proposal broadcast within the recent window.
    Spent,
}

#[derive(Debug, Clone)]
pub struct ReservationView {
    pub utxos: Vec<(ExplorerUtxo, UtxoState)>,
}

impl ReservationView {
    pub fn unlocked(&self) -> impl Iterator<Item = &ExplorerUtxo> {
        self.utxos
            .iter()
            .filter(|(_, state)| *state == UtxoState::Unlocked)
            .map(|(u, _)| u)
    }

    pub fn state_of(&self, utxo: &UtxoRef) -> Option<UtxoState> {
        self.utxos
            .iter()
            .find(|(u, _)| &u.utxo == utxo)
            .map(|(_, s)| *s)
    }
}

/// `spec.md` §4.5: fetches live UTXOs for `addresses`, then marks any
/// referenced by a pending proposal `locked` and any referenced by a
/// proposal broadcast within `recent_broadcast_window` (capped at
/// `recent_broadcast_limit`) `spent`.
pub async fn compute_reservation_view(
    storage: &dyn Storage,
    explorer: &dyn Explorer,
    config: &EngineConfig,
    wallet_id: WalletId,
    addresses: &[String],
    asset: Option<&str>,
) -> Result<ReservationView> {
    let live = explorer.get_utxos(addresses, asset).await?;

    let mut locked: HashSet<UtxoRef> = HashSet::new();
    for proposal in storage
        .list_proposals(wallet_id, Some(ProposalStatus::Pending), None)
        .await?
    {
        locked.extend(proposal.inputs.iter().copied());
    }

    let since = Utc::now() - chrono::Duration::from_std(config.recent_broadcast_window).unwrap();
    let mut spent: HashSet<UtxoRef> = HashSet::new();
    for (_, inputs) in storage
        .list_recent_broadcasts(wallet_id, since, config.recent_broadcast_limit)
        .await?
    {
        spent.extend(inputs);
    }

    let utxos = live
        .into_iter()
        .map(|u| {
            let state = if spent.contains(&u.utxo) {
                UtxoState::Spent
            } else if locked.contains(&u.utxo) {
                UtxoState::Locked
            } else {
                UtxoState::Unlocked
            };
            (u, state)
        })
        .collect();

    Ok(ReservationView { utxos })
}

/// `spec.md` §4.4 "Publish": the new proposal's own inputs must still be
/// unreserved at publish time. Excludes `self_id` from the pending-lock
/// scan so a proposal is never blocked by its own prior reservation.
pub async fn inputs_available(
    storage: &dyn Storage,
    explorer: &dyn Explorer,
    config: &EngineConfig,
    wallet_id: WalletId,
    self_id: crate::model::proposal::ProposalId,
    inputs: &[UtxoRef],
    input_addresses: &HashMap<UtxoRef, String>,
) -> Result<bool> {
    let addresses: Vec<String> = input_addresses.values().cloned().collect();
    let live = explorer.get_utxos(&addresses, None).await?;
    let live_set: HashSet<UtxoRef> = live.iter().map(|u| u.utxo).collect();
    for input in inputs {
        if !live_set.contains(input) {
            return Ok(false);
        }
    }

    let mut locked: HashSet<UtxoRef> = HashSet::new();
    for proposal in storage
        .list_proposals(wallet_id, Some(ProposalStatus::Pending), None)
        .await?
    {
        if proposal.id == self_id {
            continue;
        }
        locked.extend(proposal.inputs.iter().copied());
    }
    if inputs.iter().any(|i| locked.contains(i)) {
        return Ok(false);
    }

    let since = Utc::now() - chrono::Duration::from_std(config.recent_broadcast_window).unwrap();
    let mut spent: HashSet<UtxoRef> = HashSet::new();
    for (proposal_id, proposal_inputs) in storage
        .list_recent_broadcasts(wallet_id, since, config.recent_broadcast_limit)
        .await?
    {
        if proposal_id == self_id {
            continue;
        }
        spent.extend(proposal_inputs);
    }
    Ok(!inputs.iter().any(|i| spent.contains(i)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::wallet::{Copayer, DerivationStrategy, Network};
    use crate::testutil::{InMemoryStorage, StubExplorer};
    use crate::traits::ExplorerUtxo;
    use crate::wallet_service::{create_wallet, CreateWalletRequest};

    fn utxo_ref(byte: u8) -> UtxoRef {
        UtxoRef {
            unit: [byte; 32],
            message_index: 0,
            output_index: 0,
        }
    }

    async fn wallet_with_one_copayer(storage: &InMemoryStorage) -> WalletId {
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
    async fn unreferenced_utxo_is_unlocked() {
        let storage = InMemoryStorage::new();
        let wallet_id = wallet_with_one_copayer(&storage).await;
        let explorer = StubExplorer::inactive();
        explorer.add_utxo(ExplorerUtxo {
            utxo: utxo_ref(1),
            address: "ADDR1".into(),
            amount: 1_000_000_000,
            asset: None,
            stable: true,
            time: Utc::now(),
        });
        let config = EngineConfig::default();

        let view = compute_reservation_view(
            &storage,
            &explorer,
            &config,
            wallet_id,
            &["ADDR1".to_string()],
            None,
        )
        .await
        .unwrap();
        assert_eq!(view.state_of(&utxo_ref(1)), Some(UtxoState::Unlocked));
    }
}
