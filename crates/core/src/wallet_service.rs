//! Wallet formation (`spec.md` §4.2): `createWallet`, `joinWallet`, `addAccess`.

use chrono::Utc;
use serde_json::json;

use crate::config::EngineConfig;
use crate::crypto::{canonical_request_message, copayer_id_from_xpub, verify_signature};
use crate::error::{Error, Result};
use crate::lock::{LockBudget, WalletLocks};
use crate::model::notification::NotificationType;
use crate::model::wallet::{
    AddressType, Copayer, DefinitionTemplate, DerivationStrategy, Network, RequestPubKey,
    ScanStatus, Wallet, WalletId, WalletStatus,
};
use crate::notify::{self, Ticker};
use crate::traits::{MessageBroker, Storage};

pub struct CreateWalletRequest {
    pub id: Option<WalletId>,
    pub name: String,
    pub m: u8,
    pub n: u8,
    pub coin: String,
    pub network: Network,
    pub derivation_strategy: DerivationStrategy,
    pub single_address: bool,
    pub creation_pub_key: Vec<u8>,
}

/// `spec.md` §4.2 "createWallet".
pub async fn create_wallet(storage: &dyn Storage, req: CreateWalletRequest) -> Result<Wallet> {
    Wallet::validate_quorum(req.m, req.n)?;

    let id = req.id.unwrap_or_else(WalletId::new_v4);
    if storage.get_wallet(id).await?.is_some() {
        return Err(Error::WalletAlreadyExists);
    }

    let definition_template = if req.n == 1 {
        DefinitionTemplate::Single
    } else {
        DefinitionTemplate::ROfSet {
            required: req.m,
            total: req.n,
        }
    };

    let wallet = Wallet {
        id,
        name: req.name,
        m: req.m,
        n: req.n,
        coin: req.coin,
        network: req.network,
        derivation_strategy: req.derivation_strategy,
        address_type: AddressType::for_quorum(req.n),
        single_address: req.single_address,
        creation_pub_key: req.creation_pub_key,
        definition_template,
        copayer_ids: Vec::new(),
        public_key_ring: Vec::new(),
        scan_status: ScanStatus::Idle,
        status: WalletStatus::Pending,
        receive_index: 0,
        change_index: 0,
        created_at: Utc::now(),
    };

    storage.insert_wallet(&wallet).await?;
    Ok(wallet)
}

pub struct JoinWalletRequest {
    pub wallet_id: WalletId,
    pub name: String,
    pub xpub: String,
    pub account: u32,
    pub device_id: String,
    pub request_pub_key: Vec<u8>,
    /// Signature over `(name, xpub, requestPubKey)` under the wallet's
    /// creation key.
    pub copayer_signature: Vec<u8>,
    pub coin: String,
    pub network: Network,
    pub custom_data: Option<serde_json::Value>,
    pub dry_run: bool,
}

pub struct JoinWalletOutcome {
    pub wallet: Wallet,
    pub copayer: Copayer,
}

/// `spec.md` §4.2 "joinWallet".
pub async fn join_wallet(
    storage: &dyn Storage,
    broker: &dyn MessageBroker,
    ticker: &Ticker,
    req: JoinWalletRequest,
) -> Result<JoinWalletOutcome> {
    let mut wallet = storage
        .get_wallet(req.wallet_id)
        .await?
        .ok_or(Error::WalletNotFound)?;

    if wallet.status == WalletStatus::Complete {
        return Err(Error::WalletFull);
    }
    if wallet.coin != req.coin {
        return Err(Error::Validation {
            field: "coin".into(),
            reason: "coin does not match wallet".into(),
        });
    }
    if wallet.network != req.network {
        return Err(Error::Validation {
            field: "network".into(),
            reason: "network does not match wallet".into(),
        });
    }

    let message = canonical_join_message(&req.name, &req.xpub, &req.request_pub_key);
    if !verify_signature(&wallet.creation_pub_key, &message, &req.copayer_signature) {
        return Err(Error::InvalidSignature);
    }

    let copayer_id = copayer_id_from_xpub(&req.xpub);

    if wallet.public_key_ring.iter().any(|k| k == &req.xpub.as_bytes().to_vec())
        || wallet.copayer_ids.contains(&copayer_id)
    {
        return Err(Error::CopayerInWallet);
    }
    if storage.lookup_copayer_index(&copayer_id).await?.is_some() {
        return Err(Error::CopayerRegistered);
    }

    let copayer = Copayer {
        id: copayer_id.clone(),
        wallet_id: wallet.id,
        name: req.name.clone(),
        xpub: req.xpub.clone(),
        account: req.account,
        device_id: req.device_id.clone(),
        request_pub_keys: vec![RequestPubKey {
            key: req.request_pub_key.clone(),
            signature: req.copayer_signature.clone(),
            added_at: Utc::now(),
        }],
        custom_data: req.custom_data.clone(),
        created_at: Utc::now(),
    };

    if req.dry_run {
        // Build the would-be view without mutating anything.
        let mut preview = wallet.clone();
        preview.copayer_ids.push(copayer_id.clone());
        preview.public_key_ring.push(req.xpub.as_bytes().to_vec());
        if preview.copayer_ids.len() as u8 == preview.n {
            preview.status = WalletStatus::Complete;
        }
        return Ok(JoinWalletOutcome {
            wallet: preview,
            copayer,
        });
    }

    storage.insert_copayer(&copayer).await?;
    storage
        .register_copayer_index(&crate::auth::make_copayer_index(&copayer, false))
        .await?;

    wallet.copayer_ids.push(copayer_id);
    wallet.public_key_ring.push(req.xpub.as_bytes().to_vec());

    let became_complete = wallet.copayer_ids.len() as u8 == wallet.n;
    if became_complete {
        wallet.status = WalletStatus::Complete;
    }
    storage.update_wallet(&wallet).await?;

    // `spec.md` §4.2: "never for n = 1" — a single-copayer wallet completes
    // silently on its one and only join.
    if became_complete && wallet.n > 1 {
        notify::emit(
            storage,
            broker,
            ticker,
            wallet.id,
            NotificationType::WalletComplete,
            None,
            json!({ "walletId": wallet.id }),
        )
        .await?;
    }

    Ok(JoinWalletOutcome { wallet, copayer })
}

fn canonical_join_message(name: &str, xpub: &str, request_pub_key: &[u8]) -> Vec<u8> {
    canonical_request_message(name, xpub, &hex::encode(request_pub_key))
}

pub struct AddAccessRequest {
    pub copayer_id: String,
    pub new_request_pub_key: Vec<u8>,
    /// Signature under the xpub's request-key-auth derivation.
    pub signature: Vec<u8>,
}

/// `spec.md` §4.2 "addAccess".
pub async fn add_access(
    storage: &dyn Storage,
    config: &EngineConfig,
    req: AddAccessRequest,
) -> Result<Copayer> {
    let mut copayer = storage
        .get_copayer(&req.copayer_id)
        .await?
        .ok_or(Error::CopayerNotFound)?;

    let message = canonical_request_message("addAccess", &copayer.xpub, &hex::encode(&req.new_request_pub_key));
    let authorized = copayer
        .request_pub_keys
        .iter()
        .any(|k| verify_signature(&k.key, &message, &req.signature));
    if !authorized {
        return Err(Error::InvalidSignature);
    }

    if copayer.request_pub_keys.len() >= config.max_keys {
        return Err(Error::TooManyKeys);
    }

    copayer.request_pub_keys.push(RequestPubKey {
        key: req.new_request_pub_key,
        signature: req.signature,
        added_at: Utc::now(),
    });
    storage.update_copayer(&copayer).await?;
    Ok(copayer)
}

/// Convenience wrapper that runs `join_wallet` under the wallet lock, as
/// `spec.md` §4.7 requires for every mutating wallet operation.
pub async fn join_wallet_locked(
    storage: std::sync::Arc<dyn Storage>,
    broker: std::sync::Arc<dyn MessageBroker>,
    ticker: std::sync::Arc<Ticker>,
    locks: &WalletLocks,
    budget: LockBudget,
    req: JoinWalletRequest,
) -> Result<JoinWalletOutcome> {
    let wallet_id = req.wallet_id;
    locks
        .run_locked(wallet_id, budget, move || async move {
            join_wallet(storage.as_ref(), broker.as_ref(), ticker.as_ref(), req).await
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::InMemoryStorage;

    fn signed_join(
        secp: &secp256k1::Secp256k1<secp256k1::All>,
        creation_sk: &secp256k1::SecretKey,
        name: &str,
        xpub: &str,
        req_pubkey: &[u8],
    ) -> Vec<u8> {
        let message = canonical_join_message(name, xpub, req_pubkey);
        let digest = crate::crypto::sha256(&message);
        let msg = secp256k1::Message::from_digest_slice(&digest).unwrap();
        secp.sign_ecdsa(&msg, creation_sk).serialize_compact().to_vec()
    }

    #[tokio::test]
    async fn join_to_complete_emits_wallet_complete_once() {
        let storage = InMemoryStorage::new();
        let broker = crate::notify::InProcessBroker::default();
        let ticker = Ticker::default();
        let secp = secp256k1::Secp256k1::new();
        let (creation_sk, creation_pk) = secp.generate_keypair(&mut rand::thread_rng());

        let wallet = create_wallet(
            &storage,
            CreateWalletRequest {
                id: None,
                name: "wallet".into(),
                m: 2,
                n: 3,
                coin: "GBYTE".into(),
                network: Network::Main,
                derivation_strategy: DerivationStrategy::Bip44,
                single_address: false,
                creation_pub_key: creation_pk.serialize().to_vec(),
            },
        )
        .await
        .unwrap();

        let mut rx = broker.subscribe();
        let mut last = None;
        for i in 0..3u8 {
            let (_, req_pk) = secp.generate_keypair(&mut rand::thread_rng());
            let req_pk_bytes = req_pk.serialize().to_vec();
            let name = format!("copayer{i}");
            let xpub = format!("xpub{i}");
            let sig = signed_join(&secp, &creation_sk, &name, &xpub, &req_pk_bytes);
            last = Some(
                join_wallet(
                    &storage,
                    &broker,
                    &ticker,
                    JoinWalletRequest {
                        wallet_id: wallet.id,
                        name,
                        xpub,
                        account: i as u32,
                        device_id: format!("dev{i}"),
                        request_pub_key: req_pk_bytes,
                        copayer_signature: sig,
                        coin: "GBYTE".into(),
                        network: Network::Main,
                        custom_data: None,
                        dry_run: false,
                    },
                )
                .await
                .unwrap(),
            );
        }

        let outcome = last.unwrap();
        assert_eq!(outcome.wallet.status, WalletStatus::Complete);
        assert_eq!(outcome.wallet.public_key_ring.len(), 3);

        let notification = rx.try_recv().expect("expected one WalletComplete notification");
        assert_eq!(notification.notification_type, NotificationType::WalletComplete);
        assert!(rx.try_recv().is_err(), "only one WalletComplete notification expected");
    }

    #[tokio::test]
    async fn single_copayer_wallet_completes_without_notification() {
        let storage = InMemoryStorage::new();
        let broker = crate::notify::InProcessBroker::default();
        let ticker = Ticker::default();
        let secp = secp256k1::Secp256k1::new();
        let (creation_sk, creation_pk) = secp.generate_keypair(&mut rand::thread_rng());

        let wallet = create_wallet(
            &storage,
            CreateWalletRequest {
                id: None,
                name: "solo".into(),
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

        let mut rx = broker.subscribe();
        let (_, req_pk) = secp.generate_keypair(&mut rand::thread_rng());
        let req_pk_bytes = req_pk.serialize().to_vec();
        let sig = signed_join(&secp, &creation_sk, "solo-copayer", "xpub-solo", &req_pk_bytes);

        let outcome = join_wallet(
            &storage,
            &broker,
            &ticker,
            JoinWalletRequest {
                wallet_id: wallet.id,
                name: "solo-copayer".into(),
                xpub: "xpub-solo".into(),
                account: 0,
                device_id: "dev0".into(),
                request_pub_key: req_pk_bytes,
                copayer_signature: sig,
                coin: "GBYTE".into(),
                network: Network::Main,
                custom_data: None,
                dry_run: false,
            },
        )
        .await
        .unwrap();

        assert_eq!(outcome.wallet.status, WalletStatus::Complete);
        assert!(rx.try_recv().is_err());
    }
}
