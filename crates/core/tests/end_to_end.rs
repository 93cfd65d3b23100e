//! End-to-end scenarios driving the engine through its public service
//! functions against the in-memory trait doubles, one test per scenario.

use std::collections::BTreeMap;

use chrono::{Duration as ChronoDuration, Utc};
use secp256k1::rand::rngs::OsRng;
use secp256k1::{Message, Scalar, Secp256k1, SecretKey};

use wallet_coord_core::config::EngineConfig;
use wallet_coord_core::crypto::{canonical_request_message, sha256};
use wallet_coord_core::error::Error;
use wallet_coord_core::lock::{LockBudget, WalletLocks};
use wallet_coord_core::model::address::DerivationPath;
use wallet_coord_core::model::notification::NotificationType;
use wallet_coord_core::model::proposal::{
    AppParams, PaymentOutput, PaymentParams, ProposalAction, ProposalActionType, ProposalId,
    ProposalStatus, TxProposal, UtxoRef,
};
use wallet_coord_core::model::wallet::{DerivationStrategy, Network, WalletId};
use wallet_coord_core::notify::{InProcessBroker, Ticker};
use wallet_coord_core::proposal_service::{
    broadcast_proposal, create_proposal, publish_proposal, reject_proposal, sign_proposal,
    CreateProposalRequest,
};
use wallet_coord_core::traits::{ExplorerUtxo, LedgerTransaction, Storage};
use wallet_coord_core::wallet_service::{
    create_wallet, join_wallet, join_wallet_locked, CreateWalletRequest, JoinWalletRequest,
};
use wallet_coord_core::address_service::{self, create_address};
use wallet_coord_core::testutil::{InMemoryStorage, StubExplorer, StubHub};

fn secp() -> Secp256k1<secp256k1::All> {
    Secp256k1::new()
}

fn keypair() -> (SecretKey, secp256k1::PublicKey) {
    secp().generate_keypair(&mut OsRng)
}

fn sign_canonical(sk: &SecretKey, message: &[u8]) -> Vec<u8> {
    let digest = sha256(message);
    let msg = Message::from_digest_slice(&digest).unwrap();
    secp().sign_ecdsa(&msg, sk).serialize_compact().to_vec()
}

fn utxo_ref(byte: u8) -> UtxoRef {
    UtxoRef {
        unit: [byte; 32],
        message_index: 0,
        output_index: 0,
    }
}

async fn make_wallet(
    storage: &InMemoryStorage,
    m: u8,
    n: u8,
    creation_sk: &SecretKey,
) -> wallet_coord_core::model::Wallet {
    let secp = secp();
    let creation_pk = secp256k1::PublicKey::from_secret_key(&secp, creation_sk);
    create_wallet(
        storage,
        CreateWalletRequest {
            id: None,
            name: "coordination wallet".into(),
            m,
            n,
            coin: "GBYTE".into(),
            network: Network::Main,
            derivation_strategy: DerivationStrategy::Bip44,
            single_address: false,
            creation_pub_key: creation_pk.serialize().to_vec(),
        },
    )
    .await
    .unwrap()
}

fn canonical_join_message(name: &str, xpub: &str, request_pub_key: &[u8]) -> Vec<u8> {
    canonical_request_message(name, xpub, &hex::encode(request_pub_key))
}

async fn join(
    storage: &InMemoryStorage,
    broker: &InProcessBroker,
    ticker: &Ticker,
    wallet_id: WalletId,
    creation_sk: &SecretKey,
    name: &str,
    account_xpub_hex: &str,
    request_pk: &[u8],
    account: u32,
) -> wallet_coord_core::wallet_service::JoinWalletOutcome {
    let message = canonical_join_message(name, account_xpub_hex, request_pk);
    let digest = sha256(&message);
    let msg = Message::from_digest_slice(&digest).unwrap();
    let sig = secp().sign_ecdsa(&msg, creation_sk).serialize_compact().to_vec();

    join_wallet(
        storage,
        broker,
        ticker,
        JoinWalletRequest {
            wallet_id,
            name: name.to_string(),
            xpub: account_xpub_hex.to_string(),
            account,
            device_id: format!("dev-{name}"),
            request_pub_key: request_pk.to_vec(),
            copayer_signature: sig,
            coin: "GBYTE".into(),
            network: Network::Main,
            custom_data: None,
            dry_run: false,
        },
    )
    .await
    .unwrap()
}

/// Scenario 1: join to complete (2-of-3), exercised through the locked
/// wrapper so the wallet-lock kernel is on the critical path too, then
/// proves the wallet is immediately operable by creating an address.
#[tokio::test]
async fn join_to_complete_then_address_is_immediately_operable() {
    let storage = std::sync::Arc::new(InMemoryStorage::new());
    let broker = std::sync::Arc::new(InProcessBroker::default());
    let ticker = std::sync::Arc::new(Ticker::default());
    let locks = WalletLocks::new();
    let (creation_sk, _) = keypair();

    let wallet = make_wallet(&storage, 2, 3, &creation_sk).await;
    let mut rx = broker.subscribe();

    for i in 0..3u8 {
        let (_, account_pk) = keypair();
        let (_, request_pk) = keypair();
        let message = canonical_join_message(
            &format!("copayer{i}"),
            &hex::encode(account_pk.serialize()),
            &request_pk.serialize(),
        );
        let digest = sha256(&message);
        let msg = Message::from_digest_slice(&digest).unwrap();
        let sig = secp().sign_ecdsa(&msg, &creation_sk).serialize_compact().to_vec();

        join_wallet_locked(
            storage.clone(),
            broker.clone(),
            ticker.clone(),
            &locks,
            LockBudget::default(),
            JoinWalletRequest {
                wallet_id: wallet.id,
                name: format!("copayer{i}"),
                xpub: hex::encode(account_pk.serialize()),
                account: i as u32,
                device_id: format!("dev{i}"),
                request_pub_key: request_pk.serialize().to_vec(),
                copayer_signature: sig,
                coin: "GBYTE".into(),
                network: Network::Main,
                custom_data: None,
                dry_run: false,
            },
        )
        .await
        .unwrap();
    }

    let completed = storage.get_wallet(wallet.id).await.unwrap().unwrap();
    assert_eq!(completed.status, wallet_coord_core::model::wallet::WalletStatus::Complete);

    let notification = rx.try_recv().unwrap();
    assert_eq!(notification.notification_type, NotificationType::WalletComplete);
    assert!(rx.try_recv().is_err(), "exactly one WalletComplete notification");

    let explorer = StubExplorer::inactive();
    let config = EngineConfig::default();
    let address = create_address(&storage, &explorer, &config, wallet.id, false)
        .await
        .unwrap();
    assert_eq!(address.path, DerivationPath::new(false, 0));
    assert_eq!(address.signing_paths.len(), 3);
}

/// Scenario 2: gap-limit enforcement over a real 2-of-2 wallet (distinct
/// from the single-copayer unit-level gap test), then the
/// `ignoreMaxGap=true` override.
#[tokio::test]
async fn gap_limit_blocks_then_ignore_max_gap_overrides() {
    let storage = InMemoryStorage::new();
    let broker = InProcessBroker::default();
    let ticker = Ticker::default();
    let (creation_sk, _) = keypair();

    let wallet = make_wallet(&storage, 2, 2, &creation_sk).await;
    for (i, name) in ["a", "b"].iter().enumerate() {
        let (_, account_pk) = keypair();
        let (_, request_pk) = keypair();
        join(
            &storage,
            &broker,
            &ticker,
            wallet.id,
            &creation_sk,
            name,
            &hex::encode(account_pk.serialize()),
            &request_pk.serialize(),
            i as u32,
        )
        .await;
    }

    let explorer = StubExplorer::inactive();
    let config = EngineConfig::default().with_main_address_gap(2);

    create_address(&storage, &explorer, &config, wallet.id, false).await.unwrap();
    create_address(&storage, &explorer, &config, wallet.id, false).await.unwrap();
    let err = create_address(&storage, &explorer, &config, wallet.id, false)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::MainAddressGapReached));

    let addr = create_address(&storage, &explorer, &config, wallet.id, true)
        .await
        .unwrap();
    assert_eq!(addr.path, DerivationPath::new(false, 2));
}

async fn single_copayer_wallet(storage: &InMemoryStorage, account_xpub_hex: &str, request_pk: &[u8]) -> (WalletId, String) {
    let broker = InProcessBroker::default();
    let ticker = Ticker::default();
    let (creation_sk, _) = keypair();
    let wallet = make_wallet(storage, 1, 1, &creation_sk).await;
    let outcome = join(
        storage,
        &broker,
        &ticker,
        wallet.id,
        &creation_sk,
        "solo",
        account_xpub_hex,
        request_pk,
        0,
    )
    .await;
    (wallet.id, outcome.copayer.id)
}

async fn fund_receive_address(storage: &InMemoryStorage, wallet_id: WalletId, explorer: &StubExplorer, amount: u64, byte: u8) {
    let config = EngineConfig::default();
    let addr = if byte == 1 {
        create_address(storage, explorer, &config, wallet_id, false).await.unwrap()
    } else {
        // Subsequent funded addresses in the same test share the path
        // already minted by the first call; look it up instead of minting
        // a second receive address (gap-limit would otherwise interfere).
        storage.get_wallet(wallet_id).await.unwrap().unwrap();
        address_service::select_change_address(storage, wallet_id).await.unwrap()
    };
    explorer.add_utxo(ExplorerUtxo {
        utxo: utxo_ref(byte),
        address: addr.address,
        amount,
        asset: None,
        stable: true,
        time: Utc::now(),
    });
}

fn payment(amount: u64) -> AppParams {
    AppParams::Payment(PaymentParams {
        outputs: vec![PaymentOutput {
            to_address: "DEST".into(),
            amount,
            message: None,
        }],
    })
}

/// Scenario 3: UTXO reservation across competing proposals.
#[tokio::test]
async fn utxo_reservation_blocks_double_spend_but_allows_remaining_utxo() {
    let storage = InMemoryStorage::new();
    let explorer = StubExplorer::inactive();
    let broker = InProcessBroker::default();
    let ticker = Ticker::default();
    let config = EngineConfig::default();
    let (_, request_pk) = keypair();
    let (wallet_id, copayer_id) = single_copayer_wallet(&storage, "xpub-solo", &request_pk.serialize()).await;

    fund_receive_address(&storage, wallet_id, &explorer, 2_000_000_000, 1).await;
    fund_receive_address(&storage, wallet_id, &explorer, 1_000_000_000, 2).await;

    // Publishing needs a request-key signature over the draft joint; wire
    // one onto the solo copayer.
    let (req_sk, req_pk) = keypair();
    {
        let mut copayer = storage.get_copayer(&copayer_id).await.unwrap().unwrap();
        copayer.request_pub_keys.push(wallet_coord_core::model::wallet::RequestPubKey {
            key: req_pk.serialize().to_vec(),
            signature: vec![],
            added_at: Utc::now(),
        });
        storage.update_copayer(&copayer).await.unwrap();
    }
    let sig = |draft: &[u8]| sign_canonical(&req_sk, draft);

    // Both proposals are drafted before either is published, so neither
    // input is locked yet and both greedily select the same 2e9 UTXO.
    let first = create_proposal(
        &storage,
        &explorer,
        &config,
        Utc::now(),
        CreateProposalRequest {
            wallet_id,
            creator_copayer_id: copayer_id.clone(),
            tx_proposal_id: None,
            params: payment(100_000_000),
            dry_run: false,
        },
    )
    .await
    .unwrap();
    assert_eq!(first.inputs, vec![utxo_ref(1)], "largest-first selection picks the 2e9 UTXO");

    let second = create_proposal(
        &storage,
        &explorer,
        &config,
        Utc::now(),
        CreateProposalRequest {
            wallet_id,
            creator_copayer_id: copayer_id.clone(),
            tx_proposal_id: None,
            params: payment(100_000_000),
            dry_run: false,
        },
    )
    .await
    .unwrap();
    assert_eq!(second.inputs, vec![utxo_ref(1)], "still unlocked, so the second proposal drafts the same input");

    publish_proposal(&storage, &explorer, &config, &broker, &ticker, wallet_id, first.id, &copayer_id, &sig(&first.draft_joint))
        .await
        .unwrap();

    let err = publish_proposal(&storage, &explorer, &config, &broker, &ticker, wallet_id, second.id, &copayer_id, &sig(&second.draft_joint))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::UnavailableUtxos));

    let third = create_proposal(
        &storage,
        &explorer,
        &config,
        Utc::now(),
        CreateProposalRequest {
            wallet_id,
            creator_copayer_id: copayer_id.clone(),
            tx_proposal_id: None,
            params: payment(100_000_000),
            dry_run: false,
        },
    )
    .await
    .unwrap();
    assert_eq!(third.inputs, vec![utxo_ref(2)], "only the 1e9 UTXO remains unlocked");
    publish_proposal(&storage, &explorer, &config, &broker, &ticker, wallet_id, third.id, &copayer_id, &sig(&third.draft_joint))
        .await
        .unwrap();

    let pending = storage.list_proposals(wallet_id, Some(ProposalStatus::Pending), None).await.unwrap();
    assert_eq!(pending.len(), 2);
}

/// Scenario 4: signing quorum over a real 2-of-3 multisig address, each
/// copayer deriving their own per-input child key the same way the engine
/// does (account pubkey + path tweak), so the signatures genuinely verify.
#[tokio::test]
async fn signing_quorum_reaches_finally_accepted() {
    let storage = InMemoryStorage::new();
    let explorer = StubExplorer::inactive();
    let broker = InProcessBroker::default();
    let ticker = Ticker::default();
    let config = EngineConfig::default();
    let (creation_sk, _) = keypair();

    let wallet = make_wallet(&storage, 2, 3, &creation_sk).await;

    struct Copayer {
        id: String,
        account_sk: SecretKey,
        account_xpub: String,
        request_sk: SecretKey,
    }
    let mut copayers = Vec::new();
    for (i, name) in ["a", "b", "c"].iter().enumerate() {
        let (account_sk, account_pk) = keypair();
        let (request_sk, request_pk) = keypair();
        let account_xpub = hex::encode(account_pk.serialize());
        let outcome = join(
            &storage,
            &broker,
            &ticker,
            wallet.id,
            &creation_sk,
            name,
            &account_xpub,
            &request_pk.serialize(),
            i as u32,
        )
        .await;
        copayers.push(Copayer {
            id: outcome.copayer.id,
            account_sk,
            account_xpub,
            request_sk,
        });
    }

    let address = create_address(&storage, &explorer, &config, wallet.id, false).await.unwrap();
    explorer.add_utxo(ExplorerUtxo {
        utxo: utxo_ref(1),
        address: address.address.clone(),
        amount: 1_000_000_000,
        asset: None,
        stable: true,
        time: Utc::now(),
    });
    let _change = address_service::select_change_address(&storage, wallet.id).await.unwrap();

    let creator = &copayers[0];
    let proposal = create_proposal(
        &storage,
        &explorer,
        &config,
        Utc::now(),
        CreateProposalRequest {
            wallet_id: wallet.id,
            creator_copayer_id: creator.id.clone(),
            tx_proposal_id: None,
            params: payment(100_000_000),
            dry_run: false,
        },
    )
    .await
    .unwrap();

    let publish_sig = {
        let digest = sha256(&proposal.draft_joint);
        let msg = Message::from_digest_slice(&digest).unwrap();
        secp().sign_ecdsa(&msg, &creator.request_sk).serialize_compact().to_vec()
    };
    let proposal = publish_proposal(&storage, &explorer, &config, &broker, &ticker, wallet.id, proposal.id, &creator.id, &publish_sig)
        .await
        .unwrap();

    let mut rx = broker.subscribe();

    let sign_with = |copayer: &Copayer, proposal: &TxProposal| -> BTreeMap<UtxoRef, Vec<u8>> {
        let mut signatures = BTreeMap::new();
        for input in &proposal.inputs {
            let tweak_hash = {
                let mut data = Vec::new();
                data.extend_from_slice(copayer.account_xpub.as_bytes());
                data.push(address.path.is_change as u8);
                data.extend_from_slice(&address.path.index.to_be_bytes());
                sha256(&data)
            };
            let tweak = Scalar::from_be_bytes(tweak_hash).unwrap();
            let child_sk = copayer.account_sk.add_tweak(&tweak).unwrap();
            let digest = sha256(&proposal.draft_joint);
            let msg = Message::from_digest_slice(&digest).unwrap();
            let sig = secp().sign_ecdsa(&msg, &child_sk).serialize_compact().to_vec();
            signatures.insert(*input, sig);
        }
        signatures
    };

    let after_first = sign_proposal(
        &storage,
        &broker,
        &ticker,
        wallet.id,
        proposal.id,
        &copayers[1].id,
        sign_with(&copayers[1], &proposal),
        Utc::now(),
    )
    .await
    .unwrap();
    assert_eq!(after_first.status, ProposalStatus::Pending);
    assert_eq!(after_first.accept_count(), 1);

    let accepted_by = rx.try_recv().unwrap();
    assert_eq!(accepted_by.notification_type, NotificationType::TxProposalAcceptedBy);

    let after_second = sign_proposal(
        &storage,
        &broker,
        &ticker,
        wallet.id,
        proposal.id,
        &copayers[2].id,
        sign_with(&copayers[2], &proposal),
        Utc::now(),
    )
    .await
    .unwrap();
    assert_eq!(after_second.status, ProposalStatus::Accepted);
    assert!(after_second.txid.is_some());

    let accepted_by2 = rx.try_recv().unwrap();
    assert_eq!(accepted_by2.notification_type, NotificationType::TxProposalAcceptedBy);
    let finally_accepted = rx.try_recv().unwrap();
    assert_eq!(finally_accepted.notification_type, NotificationType::TxProposalFinallyAccepted);
}

/// Scenario 5: a proposal already broadcast by a third party is reconciled
/// rather than treated as a hub failure.
#[tokio::test]
async fn broadcast_by_third_party_is_reconciled() {
    let storage = InMemoryStorage::new();
    let explorer = StubExplorer::inactive();
    let hub = StubHub::failing();
    let broker = InProcessBroker::default();
    let ticker = Ticker::default();
    let (_, request_pk) = keypair();
    let (wallet_id, copayer_id) = single_copayer_wallet(&storage, "xpub-solo", &request_pk.serialize()).await;

    let mut proposal = TxProposal {
        id: ProposalId::new_v4(),
        wallet_id,
        creator_copayer_id: copayer_id.clone(),
        params: payment(1_000_000),
        change_address: None,
        draft_joint: b"draft".to_vec(),
        inputs: vec![utxo_ref(9)],
        input_addresses: BTreeMap::new(),
        signing_info: BTreeMap::new(),
        required_signatures: 1,
        required_rejections: 1,
        status: ProposalStatus::Accepted,
        actions: Vec::new(),
        txid: Some(sha256(b"draft")),
        broadcast_at: None,
        stable: false,
        stable_at: None,
        created_at: Utc::now(),
    };
    storage.insert_proposal(&proposal).await.unwrap();
    explorer.set_transaction(proposal.txid.unwrap(), LedgerTransaction { unit: proposal.txid.unwrap(), stable: false });

    let mut rx = broker.subscribe();
    let broadcasted = broadcast_proposal(&storage, &explorer, &hub, &broker, &ticker, wallet_id, proposal.id, Utc::now())
        .await
        .unwrap();
    assert_eq!(broadcasted.status, ProposalStatus::Broadcasted);

    let notification = rx.try_recv().unwrap();
    assert_eq!(notification.notification_type, NotificationType::NewOutgoingTxByThirdParty);

    proposal = storage.get_proposal(wallet_id, proposal.id).await.unwrap().unwrap();
    assert_eq!(proposal.status, ProposalStatus::Broadcasted);
}

/// Scenario 6: the backoff governor throttles a creator with too many
/// consecutive trailing rejections until the cooldown elapses.
#[tokio::test]
async fn backoff_governor_throttles_then_clears() {
    let storage = InMemoryStorage::new();
    let explorer = StubExplorer::inactive();
    let (_, request_pk) = keypair();
    let (wallet_id, copayer_id) = single_copayer_wallet(&storage, "xpub-solo", &request_pk.serialize()).await;

    let mut config = EngineConfig::default();
    config.backoff_offset = 3;

    let most_recent_rejection = Utc::now();
    for i in 0..4 {
        let created_at = most_recent_rejection - ChronoDuration::minutes(4 - i);
        let proposal = TxProposal {
            id: ProposalId::new_v4(),
            wallet_id,
            creator_copayer_id: copayer_id.clone(),
            params: payment(1_000_000),
            change_address: None,
            draft_joint: Vec::new(),
            inputs: Vec::new(),
            input_addresses: BTreeMap::new(),
            signing_info: BTreeMap::new(),
            required_signatures: 1,
            required_rejections: 1,
            status: ProposalStatus::Rejected,
            actions: vec![ProposalAction {
                copayer_id: copayer_id.clone(),
                action_type: ProposalActionType::Reject,
                signatures: BTreeMap::new(),
                creator_xpub: "xpub-solo".into(),
                comment: None,
                created_at: if i == 3 { most_recent_rejection } else { created_at },
            }],
            txid: None,
            broadcast_at: None,
            stable: false,
            stable_at: None,
            created_at,
        };
        storage.insert_proposal(&proposal).await.unwrap();
    }

    let err = create_proposal(
        &storage,
        &explorer,
        &config,
        most_recent_rejection,
        CreateProposalRequest {
            wallet_id,
            creator_copayer_id: copayer_id.clone(),
            tx_proposal_id: None,
            params: payment(1_000_000),
            dry_run: false,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, Error::TxCannotCreate(_)));

    let after_cooldown = most_recent_rejection + ChronoDuration::from_std(config.backoff_time).unwrap() + ChronoDuration::seconds(1);
    fund_receive_address(&storage, wallet_id, &explorer, 1_000_000_000, 1).await;
    let proposal = create_proposal(
        &storage,
        &explorer,
        &config,
        after_cooldown,
        CreateProposalRequest {
            wallet_id,
            creator_copayer_id: copayer_id,
            tx_proposal_id: None,
            params: payment(1_000_000),
            dry_run: false,
        },
    )
    .await
    .unwrap();
    assert_eq!(proposal.status, ProposalStatus::Temporary);
}
