//! Address creation, gap-limit enforcement and scanning (`spec.md` §4.3).

use chrono::Utc;

use crate::config::EngineConfig;
use crate::derivation::{derive_address, derive_child_pubkey, RingEntry};
use crate::error::{Error, Result};
use crate::model::address::DerivationPath;
use crate::model::wallet::{ScanStatus, Wallet, WalletId, WalletStatus};
use crate::model::Address;
use crate::traits::{Explorer, Storage};

async fn ring_entries(storage: &dyn Storage, wallet: &Wallet, path: DerivationPath) -> Result<Vec<RingEntry>> {
    let mut entries = Vec::with_capacity(wallet.copayer_ids.len());
    for copayer_id in &wallet.copayer_ids {
        let copayer = storage
            .get_copayer(copayer_id)
            .await?
            .ok_or(Error::CopayerNotFound)?;
        entries.push(RingEntry {
            device_id: copayer.device_id,
            child_pubkey: derive_child_pubkey(&copayer.xpub, path),
        });
    }
    Ok(entries)
}

pub(crate) fn require_operable(wallet: &Wallet) -> Result<()> {
    if wallet.status != WalletStatus::Complete {
        return Err(Error::WalletNotComplete);
    }
    match wallet.scan_status {
        ScanStatus::Running => Err(Error::WalletBusy),
        ScanStatus::Error => Err(Error::WalletNeedScan),
        _ => Ok(()),
    }
}

async fn derive_and_persist(
    storage: &dyn Storage,
    wallet: &Wallet,
    path: DerivationPath,
) -> Result<Address> {
    let ring = ring_entries(storage, wallet, path).await?;
    let derived = derive_address(&wallet.definition_template, path, &ring);
    let address = Address {
        address: derived.address,
        wallet_id: wallet.id,
        path,
        address_type: wallet.address_type,
        definition: derived.definition,
        signing_paths: derived.signing_paths,
        has_activity: false,
        created_at: Utc::now(),
    };
    storage.insert_address(&address).await?;
    Ok(address)
}

/// Checks the tail of `MAX_MAIN_ADDRESS_GAP` receive addresses for
/// activity, probing the explorer for any not already sticky-active, and
/// returns `true` if at least one has activity.
async fn tail_has_activity(
    storage: &dyn Storage,
    explorer: &dyn Explorer,
    wallet_id: WalletId,
    gap: u32,
) -> Result<bool> {
    let tail = storage
        .list_addresses(wallet_id, Some(false), Some(gap), true)
        .await?;
    if (tail.len() as u32) < gap {
        // Fewer than `gap` receive addresses exist yet; the gap cannot be
        // exhausted.
        return Ok(true);
    }
    for addr in &tail {
        if addr.has_activity {
            return Ok(true);
        }
        if explorer.get_address_activity(&addr.address).await? {
            storage.mark_address_active(wallet_id, &addr.address).await?;
            return Ok(true);
        }
    }
    Ok(false)
}

/// `spec.md` §4.3 "createAddress".
pub async fn create_address(
    storage: &dyn Storage,
    explorer: &dyn Explorer,
    config: &EngineConfig,
    wallet_id: WalletId,
    ignore_max_gap: bool,
) -> Result<Address> {
    let mut wallet = storage.get_wallet(wallet_id).await?.ok_or(Error::WalletNotFound)?;
    require_operable(&wallet)?;

    if wallet.single_address {
        if let Some(existing) = storage
            .find_address_by_path(wallet_id, false, 0)
            .await?
        {
            return Ok(existing);
        }
        let path = DerivationPath::new(false, 0);
        let addr = derive_and_persist(storage, &wallet, path).await?;
        wallet.receive_index = 1;
        storage.update_wallet(&wallet).await?;
        return Ok(addr);
    }

    if !ignore_max_gap
        && !tail_has_activity(storage, explorer, wallet_id, config.max_main_address_gap).await?
    {
        return Err(Error::MainAddressGapReached);
    }

    let path = DerivationPath::new(false, wallet.receive_index);
    let addr = derive_and_persist(storage, &wallet, path).await?;
    wallet.receive_index += 1;
    storage.update_wallet(&wallet).await?;
    Ok(addr)
}

/// Finds (or lazily creates) a usable change address: the first inactive
/// change address, or the sole address for `singleAddress` wallets
/// (`spec.md` §4.4 "Create" change-address selection).
pub async fn select_change_address(storage: &dyn Storage, wallet_id: WalletId) -> Result<Address> {
    let wallet = storage.get_wallet(wallet_id).await?.ok_or(Error::WalletNotFound)?;

    if wallet.single_address {
        if let Some(existing) = storage.find_address_by_path(wallet_id, false, 0).await? {
            return Ok(existing);
        }
        return derive_and_persist(storage, &wallet, DerivationPath::new(false, 0)).await;
    }

    let change_addrs = storage
        .list_addresses(wallet_id, Some(true), None, false)
        .await?;
    if let Some(inactive) = change_addrs.iter().find(|a| !a.has_activity) {
        return Ok(inactive.clone());
    }

    let mut wallet = wallet;
    let path = DerivationPath::new(true, wallet.change_index);
    let addr = derive_and_persist(storage, &wallet, path).await?;
    wallet.change_index += 1;
    storage.update_wallet(&wallet).await?;
    Ok(addr)
}

#[derive(Debug, Default)]
pub struct ScanResult {
    pub receive_created: u32,
    pub change_created: u32,
}

/// `spec.md` §4.3 "scan": walks both branches, stopping after
/// `SCAN_ADDRESS_GAP` consecutive inactive addresses.
pub async fn scan(
    storage: &dyn Storage,
    explorer: &dyn Explorer,
    config: &EngineConfig,
    wallet_id: WalletId,
) -> Result<ScanResult> {
    let mut wallet = storage.get_wallet(wallet_id).await?.ok_or(Error::WalletNotFound)?;
    wallet.scan_status = ScanStatus::Running;
    storage.update_wallet(&wallet).await?;

    let outcome = scan_inner(storage, explorer, config, &mut wallet).await;

    wallet.scan_status = match &outcome {
        Ok(_) => ScanStatus::Success,
        Err(_) => ScanStatus::Error,
    };
    storage.update_wallet(&wallet).await?;
    outcome
}

async fn scan_inner(
    storage: &dyn Storage,
    explorer: &dyn Explorer,
    config: &EngineConfig,
    wallet: &mut Wallet,
) -> Result<ScanResult> {
    let mut result = ScanResult::default();

    for is_change in [false, true] {
        let mut index = 0u32;
        let mut inactive_streak = 0u32;
        loop {
            if inactive_streak >= config.scan_address_gap {
                break;
            }
            let path = DerivationPath::new(is_change, index);
            let mut addr = derive_and_persist(storage, wallet, path).await?;
            if explorer.get_address_activity(&addr.address).await? {
                addr.has_activity = true;
                storage.mark_address_active(wallet.id, &addr.address).await?;
                inactive_streak = 0;
                if is_change {
                    result.change_created += 1;
                } else {
                    result.receive_created += 1;
                }
            } else {
                inactive_streak += 1;
            }
            index += 1;
        }
        if is_change {
            wallet.change_index = wallet.change_index.max(index);
        } else {
            wallet.receive_index = wallet.receive_index.max(index);
        }
    }

    Ok(result)
}

/// `spec.md` §4.3 "power scan": strides ahead by `stride` (default 1000)
/// and back-fills intermediate addresses only once a later address in the
/// same batch shows activity (Open Question resolved in `SPEC_FULL.md`
/// §4.3: an entirely inactive batch leaves no trace).
pub async fn power_scan(
    storage: &dyn Storage,
    explorer: &dyn Explorer,
    wallet_id: WalletId,
    stride: u32,
) -> Result<ScanResult> {
    let wallet = storage.get_wallet(wallet_id).await?.ok_or(Error::WalletNotFound)?;
    let mut result = ScanResult::default();

    for is_change in [false, true] {
        let mut base = 0u32;
        loop {
            let probe_path = DerivationPath::new(is_change, base + stride - 1);
            let ring = ring_entries(storage, &wallet, probe_path).await?;
            let derived = derive_address(&wallet.definition_template, probe_path, &ring);
            let has_activity = explorer.get_address_activity(&derived.address).await?;
            if !has_activity {
                break;
            }

            // A later address in this batch is active: back-fill every
            // intermediate path so the normal gap-limit machinery can take
            // over from here.
            for idx in base..base + stride {
                let path = DerivationPath::new(is_change, idx);
                let mut addr = derive_and_persist(storage, &wallet, path).await?;
                if explorer.get_address_activity(&addr.address).await? {
                    addr.has_activity = true;
                    storage.mark_address_active(wallet_id, &addr.address).await?;
                    if is_change {
                        result.change_created += 1;
                    } else {
                        result.receive_created += 1;
                    }
                }
            }
            base += stride;
        }
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::wallet::{DerivationStrategy, Network};
    use crate::testutil::{InMemoryStorage, StubExplorer};
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

        let copayer = crate::model::wallet::Copayer {
            id: "cid".into(),
            wallet_id: wallet.id,
            name: "c".into(),
            xpub: "xpub0".into(),
            account: 0,
            device_id: "dev0".into(),
            request_pub_keys: vec![],
            custom_data: None,
            created_at: Utc::now(),
        };
        storage.insert_copayer(&copayer).await.unwrap();

        let mut wallet = wallet;
        wallet.copayer_ids.push("cid".into());
        wallet.public_key_ring.push(b"xpub0".to_vec());
        wallet.status = WalletStatus::Complete;
        storage.update_wallet(&wallet).await.unwrap();
        wallet.id
    }

    #[tokio::test]
    async fn gap_limit_blocks_after_max_inactive_addresses() {
        let storage = InMemoryStorage::new();
        let wallet_id = one_copayer_wallet(&storage).await;
        let explorer = StubExplorer::inactive();
        let config = EngineConfig::default().with_main_address_gap(2);

        create_address(&storage, &explorer, &config, wallet_id, false)
            .await
            .unwrap();
        create_address(&storage, &explorer, &config, wallet_id, false)
            .await
            .unwrap();
        let err = create_address(&storage, &explorer, &config, wallet_id, false)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MainAddressGapReached));

        let addr = create_address(&storage, &explorer, &config, wallet_id, true)
            .await
            .unwrap();
        assert_eq!(addr.path, DerivationPath::new(false, 2));
    }

    #[tokio::test]
    async fn single_address_wallet_always_returns_first_address() {
        let storage = InMemoryStorage::new();
        let wallet_id = one_copayer_wallet(&storage).await;
        {
            let mut wallet = storage.get_wallet(wallet_id).await.unwrap().unwrap();
            wallet.single_address = true;
            storage.update_wallet(&wallet).await.unwrap();
        }
        let explorer = StubExplorer::inactive();
        let config = EngineConfig::default();

        let first = create_address(&storage, &explorer, &config, wallet_id, false)
            .await
            .unwrap();
        let second = create_address(&storage, &explorer, &config, wallet_id, false)
            .await
            .unwrap();
        assert_eq!(first.address, second.address);
    }
}
