//! `Storage` trait implementation backed by Postgres. One method per
//! collection named in `spec.md` §6, using runtime-checked `sqlx::query`
//! calls (never `sqlx::query!`) so this crate builds without a live
//! database, mirroring the teacher's `db::health::HealthMonitor` style of
//! reading columns off a `Row` by name rather than deriving `FromRow`.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::Row;

use wallet_coord_core::error::{Error, Result};
use wallet_coord_core::model::address::DerivationPath;
use wallet_coord_core::model::notification::{Notification, NotificationType};
use wallet_coord_core::model::proposal::{ProposalAction, ProposalActionType, ProposalId, ProposalStatus, TxProposal, UtxoRef};
use wallet_coord_core::model::wallet::{
    AddressType, Copayer, CopayerIndexEntry, DefinitionTemplate, DerivationStrategy, Network,
    ScanStatus, Wallet, WalletId, WalletStatus,
};
use wallet_coord_core::model::{Address, AssetMetadata, Preferences, PushSubscription, Session, TxConfirmationSubscription, TxNote};
use wallet_coord_core::traits::Storage;

use crate::error::map_sqlx;
use crate::pool::PostgresStorage;

fn to_json<T: serde::Serialize>(value: &T) -> Result<serde_json::Value> {
    serde_json::to_value(value).map_err(|e| Error::Storage(anyhow::Error::new(e)))
}

fn from_json<T: serde::de::DeserializeOwned>(value: serde_json::Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| Error::Storage(anyhow::Error::new(e)))
}

/// `UtxoRef` is a struct, and `serde_json` can only use strings (or types
/// that serialize as strings) as JSON object keys. Maps keyed by `UtxoRef`
/// round-trip through arrays of pairs instead of a JSON object.
fn map_to_json_pairs<V: Serialize>(map: &BTreeMap<UtxoRef, V>) -> Result<serde_json::Value> {
    let pairs: Vec<(UtxoRef, &V)> = map.iter().map(|(k, v)| (*k, v)).collect();
    to_json(&pairs)
}

fn json_pairs_to_map<V: for<'de> Deserialize<'de>>(value: serde_json::Value) -> Result<BTreeMap<UtxoRef, V>> {
    let pairs: Vec<(UtxoRef, V)> = from_json(value)?;
    Ok(pairs.into_iter().collect())
}

/// Mirrors `ProposalAction` but stores `signatures` as pairs rather than a
/// `BTreeMap<UtxoRef, _>`, for the same reason as `map_to_json_pairs`.
#[derive(Serialize, Deserialize)]
struct StoredAction {
    copayer_id: String,
    action_type: ProposalActionType,
    signatures: Vec<(UtxoRef, Vec<u8>)>,
    creator_xpub: String,
    comment: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<&ProposalAction> for StoredAction {
    fn from(a: &ProposalAction) -> Self {
        StoredAction {
            copayer_id: a.copayer_id.clone(),
            action_type: a.action_type,
            signatures: a.signatures.iter().map(|(k, v)| (*k, v.clone())).collect(),
            creator_xpub: a.creator_xpub.clone(),
            comment: a.comment.clone(),
            created_at: a.created_at,
        }
    }
}

impl From<StoredAction> for ProposalAction {
    fn from(a: StoredAction) -> Self {
        ProposalAction {
            copayer_id: a.copayer_id,
            action_type: a.action_type,
            signatures: a.signatures.into_iter().collect(),
            creator_xpub: a.creator_xpub,
            comment: a.comment,
            created_at: a.created_at,
        }
    }
}

fn actions_to_json(actions: &[ProposalAction]) -> Result<serde_json::Value> {
    let stored: Vec<StoredAction> = actions.iter().map(StoredAction::from).collect();
    to_json(&stored)
}

fn actions_from_json(value: serde_json::Value) -> Result<Vec<ProposalAction>> {
    let stored: Vec<StoredAction> = from_json(value)?;
    Ok(stored.into_iter().map(ProposalAction::from).collect())
}

fn wallet_from_row(row: &sqlx::postgres::PgRow) -> Result<Wallet> {
    let network: String = row.try_get("network").map_err(map_sqlx)?;
    let derivation_strategy: String = row.try_get("derivation_strategy").map_err(map_sqlx)?;
    let address_type: String = row.try_get("address_type").map_err(map_sqlx)?;
    let scan_status: String = row.try_get("scan_status").map_err(map_sqlx)?;
    let status: String = row.try_get("status").map_err(map_sqlx)?;
    let definition_template: serde_json::Value = row.try_get("definition_template").map_err(map_sqlx)?;
    let copayer_ids: serde_json::Value = row.try_get("copayer_ids").map_err(map_sqlx)?;
    let public_key_ring: serde_json::Value = row.try_get("public_key_ring").map_err(map_sqlx)?;

    Ok(Wallet {
        id: row.try_get("id").map_err(map_sqlx)?,
        name: row.try_get("name").map_err(map_sqlx)?,
        m: row.try_get::<i16, _>("m").map_err(map_sqlx)? as u8,
        n: row.try_get::<i16, _>("n").map_err(map_sqlx)? as u8,
        coin: row.try_get("coin").map_err(map_sqlx)?,
        network: parse_network(&network)?,
        derivation_strategy: parse_derivation_strategy(&derivation_strategy)?,
        address_type: parse_address_type(&address_type)?,
        single_address: row.try_get("single_address").map_err(map_sqlx)?,
        creation_pub_key: row.try_get("creation_pub_key").map_err(map_sqlx)?,
        definition_template: from_json(definition_template)?,
        copayer_ids: from_json(copayer_ids)?,
        public_key_ring: from_json(public_key_ring)?,
        scan_status: parse_scan_status(&scan_status)?,
        status: parse_wallet_status(&status)?,
        receive_index: row.try_get::<i32, _>("receive_index").map_err(map_sqlx)? as u32,
        change_index: row.try_get::<i32, _>("change_index").map_err(map_sqlx)? as u32,
        created_at: row.try_get("created_at").map_err(map_sqlx)?,
    })
}

fn parse_network(s: &str) -> Result<Network> {
    match s {
        "main" => Ok(Network::Main),
        "test" => Ok(Network::Test),
        other => Err(Error::Storage(anyhow::anyhow!("unknown network: {other}"))),
    }
}

fn network_str(n: Network) -> &'static str {
    match n {
        Network::Main => "main",
        Network::Test => "test",
    }
}

fn parse_derivation_strategy(s: &str) -> Result<DerivationStrategy> {
    match s {
        "legacy" => Ok(DerivationStrategy::Legacy),
        "BIP44" | "bip44" => Ok(DerivationStrategy::Bip44),
        other => Err(Error::Storage(anyhow::anyhow!("unknown derivation strategy: {other}"))),
    }
}

fn derivation_strategy_str(s: DerivationStrategy) -> &'static str {
    match s {
        DerivationStrategy::Legacy => "legacy",
        DerivationStrategy::Bip44 => "BIP44",
    }
}

fn parse_address_type(s: &str) -> Result<AddressType> {
    match s {
        "normal" => Ok(AddressType::Normal),
        "shared" => Ok(AddressType::Shared),
        other => Err(Error::Storage(anyhow::anyhow!("unknown address type: {other}"))),
    }
}

fn address_type_str(a: AddressType) -> &'static str {
    match a {
        AddressType::Normal => "normal",
        AddressType::Shared => "shared",
    }
}

fn parse_scan_status(s: &str) -> Result<ScanStatus> {
    match s {
        "idle" => Ok(ScanStatus::Idle),
        "running" => Ok(ScanStatus::Running),
        "success" => Ok(ScanStatus::Success),
        "error" => Ok(ScanStatus::Error),
        other => Err(Error::Storage(anyhow::anyhow!("unknown scan status: {other}"))),
    }
}

fn scan_status_str(s: ScanStatus) -> &'static str {
    match s {
        ScanStatus::Idle => "idle",
        ScanStatus::Running => "running",
        ScanStatus::Success => "success",
        ScanStatus::Error => "error",
    }
}

fn parse_wallet_status(s: &str) -> Result<WalletStatus> {
    match s {
        "pending" => Ok(WalletStatus::Pending),
        "complete" => Ok(WalletStatus::Complete),
        other => Err(Error::Storage(anyhow::anyhow!("unknown wallet status: {other}"))),
    }
}

fn wallet_status_str(s: WalletStatus) -> &'static str {
    match s {
        WalletStatus::Pending => "pending",
        WalletStatus::Complete => "complete",
    }
}

fn parse_proposal_status(s: &str) -> Result<ProposalStatus> {
    match s {
        "temporary" => Ok(ProposalStatus::Temporary),
        "pending" => Ok(ProposalStatus::Pending),
        "accepted" => Ok(ProposalStatus::Accepted),
        "broadcasted" => Ok(ProposalStatus::Broadcasted),
        "rejected" => Ok(ProposalStatus::Rejected),
        "stable" => Ok(ProposalStatus::Stable),
        other => Err(Error::Storage(anyhow::anyhow!("unknown proposal status: {other}"))),
    }
}

fn proposal_status_str(s: ProposalStatus) -> &'static str {
    match s {
        ProposalStatus::Temporary => "temporary",
        ProposalStatus::Pending => "pending",
        ProposalStatus::Accepted => "accepted",
        ProposalStatus::Broadcasted => "broadcasted",
        ProposalStatus::Rejected => "rejected",
        ProposalStatus::Stable => "stable",
    }
}

fn notification_type_str(t: NotificationType) -> &'static str {
    match t {
        NotificationType::WalletComplete => "WalletComplete",
        NotificationType::NewTxProposal => "NewTxProposal",
        NotificationType::TxProposalAcceptedBy => "TxProposalAcceptedBy",
        NotificationType::TxProposalFinallyAccepted => "TxProposalFinallyAccepted",
        NotificationType::TxProposalRejectedBy => "TxProposalRejectedBy",
        NotificationType::TxProposalFinallyRejected => "TxProposalFinallyRejected",
        NotificationType::TxProposalRemoved => "TxProposalRemoved",
        NotificationType::NewOutgoingTx => "NewOutgoingTx",
        NotificationType::NewOutgoingTxByThirdParty => "NewOutgoingTxByThirdParty",
        NotificationType::NewIncomingTx => "NewIncomingTx",
        NotificationType::TxConfirmation => "TxConfirmation",
    }
}

fn parse_notification_type(s: &str) -> Result<NotificationType> {
    Ok(match s {
        "WalletComplete" => NotificationType::WalletComplete,
        "NewTxProposal" => NotificationType::NewTxProposal,
        "TxProposalAcceptedBy" => NotificationType::TxProposalAcceptedBy,
        "TxProposalFinallyAccepted" => NotificationType::TxProposalFinallyAccepted,
        "TxProposalRejectedBy" => NotificationType::TxProposalRejectedBy,
        "TxProposalFinallyRejected" => NotificationType::TxProposalFinallyRejected,
        "TxProposalRemoved" => NotificationType::TxProposalRemoved,
        "NewOutgoingTx" => NotificationType::NewOutgoingTx,
        "NewOutgoingTxByThirdParty" => NotificationType::NewOutgoingTxByThirdParty,
        "NewIncomingTx" => NotificationType::NewIncomingTx,
        "TxConfirmation" => NotificationType::TxConfirmation,
        other => return Err(Error::Storage(anyhow::anyhow!("unknown notification type: {other}"))),
    })
}

fn proposal_from_row(row: &sqlx::postgres::PgRow) -> Result<TxProposal> {
    let status: String = row.try_get("status").map_err(map_sqlx)?;
    let params: serde_json::Value = row.try_get("params").map_err(map_sqlx)?;
    let inputs: serde_json::Value = row.try_get("inputs").map_err(map_sqlx)?;
    let input_addresses: serde_json::Value = row.try_get("input_addresses").map_err(map_sqlx)?;
    let signing_info: serde_json::Value = row.try_get("signing_info").map_err(map_sqlx)?;
    let actions: serde_json::Value = row.try_get("actions").map_err(map_sqlx)?;
    let txid: Option<Vec<u8>> = row.try_get("txid").map_err(map_sqlx)?;

    Ok(TxProposal {
        id: row.try_get("id").map_err(map_sqlx)?,
        wallet_id: row.try_get("wallet_id").map_err(map_sqlx)?,
        creator_copayer_id: row.try_get("creator_copayer_id").map_err(map_sqlx)?,
        params: from_json(params)?,
        change_address: row.try_get("change_address").map_err(map_sqlx)?,
        draft_joint: row.try_get("draft_joint").map_err(map_sqlx)?,
        inputs: from_json(inputs)?,
        input_addresses: json_pairs_to_map(input_addresses)?,
        signing_info: from_json(signing_info)?,
        required_signatures: row.try_get::<i16, _>("required_signatures").map_err(map_sqlx)? as u8,
        required_rejections: row.try_get::<i16, _>("required_rejections").map_err(map_sqlx)? as u8,
        status: parse_proposal_status(&status)?,
        actions: actions_from_json(actions)?,
        txid: txid.map(|v| v.try_into().unwrap_or([0u8; 32])),
        broadcast_at: row.try_get("broadcast_at").map_err(map_sqlx)?,
        stable: row.try_get("stable").map_err(map_sqlx)?,
        stable_at: row.try_get("stable_at").map_err(map_sqlx)?,
        created_at: row.try_get("created_at").map_err(map_sqlx)?,
    })
}

fn address_from_row(row: &sqlx::postgres::PgRow) -> Result<Address> {
    let address_type: String = row.try_get("address_type").map_err(map_sqlx)?;
    let signing_paths: serde_json::Value = row.try_get("signing_paths").map_err(map_sqlx)?;
    Ok(Address {
        address: row.try_get("address").map_err(map_sqlx)?,
        wallet_id: row.try_get("wallet_id").map_err(map_sqlx)?,
        path: DerivationPath::new(
            row.try_get("is_change").map_err(map_sqlx)?,
            row.try_get::<i32, _>("path_index").map_err(map_sqlx)? as u32,
        ),
        address_type: parse_address_type(&address_type)?,
        definition: row.try_get("definition").map_err(map_sqlx)?,
        signing_paths: from_json(signing_paths)?,
        has_activity: row.try_get("has_activity").map_err(map_sqlx)?,
        created_at: row.try_get("created_at").map_err(map_sqlx)?,
    })
}

fn copayer_from_row(row: &sqlx::postgres::PgRow) -> Result<Copayer> {
    let request_pub_keys: serde_json::Value = row.try_get("request_pub_keys").map_err(map_sqlx)?;
    let custom_data: Option<serde_json::Value> = row.try_get("custom_data").map_err(map_sqlx)?;
    Ok(Copayer {
        id: row.try_get("id").map_err(map_sqlx)?,
        wallet_id: row.try_get("wallet_id").map_err(map_sqlx)?,
        name: row.try_get("name").map_err(map_sqlx)?,
        xpub: row.try_get("xpub").map_err(map_sqlx)?,
        account: row.try_get::<i32, _>("account").map_err(map_sqlx)? as u32,
        device_id: row.try_get("device_id").map_err(map_sqlx)?,
        request_pub_keys: from_json(request_pub_keys)?,
        custom_data,
        created_at: row.try_get("created_at").map_err(map_sqlx)?,
    })
}

fn notification_from_row(row: &sqlx::postgres::PgRow) -> Result<Notification> {
    let notification_type: String = row.try_get("notification_type").map_err(map_sqlx)?;
    let data: serde_json::Value = row.try_get("data").map_err(map_sqlx)?;
    Ok(Notification {
        id: row.try_get("id").map_err(map_sqlx)?,
        ticker: row.try_get::<i64, _>("ticker").map_err(map_sqlx)? as u64,
        wallet_id: row.try_get("wallet_id").map_err(map_sqlx)?,
        notification_type: parse_notification_type(&notification_type)?,
        creator_id: row.try_get("creator_id").map_err(map_sqlx)?,
        data,
        created_at: row.try_get("created_at").map_err(map_sqlx)?,
    })
}

#[async_trait]
impl Storage for PostgresStorage {
    // --- wallets & copayers ---

    async fn insert_wallet(&self, wallet: &Wallet) -> Result<()> {
        sqlx::query(
            r#"
            insert into wallets (
                id, name, m, n, coin, network, derivation_strategy, address_type,
                single_address, creation_pub_key, definition_template, copayer_ids,
                public_key_ring, scan_status, status, receive_index, change_index, created_at
            ) values ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18)
            "#,
        )
        .bind(wallet.id)
        .bind(&wallet.name)
        .bind(wallet.m as i16)
        .bind(wallet.n as i16)
        .bind(&wallet.coin)
        .bind(network_str(wallet.network))
        .bind(derivation_strategy_str(wallet.derivation_strategy))
        .bind(address_type_str(wallet.address_type))
        .bind(wallet.single_address)
        .bind(&wallet.creation_pub_key)
        .bind(to_json(&wallet.definition_template)?)
        .bind(to_json(&wallet.copayer_ids)?)
        .bind(to_json(&wallet.public_key_ring)?)
        .bind(scan_status_str(wallet.scan_status))
        .bind(wallet_status_str(wallet.status))
        .bind(wallet.receive_index as i32)
        .bind(wallet.change_index as i32)
        .bind(wallet.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }

    async fn get_wallet(&self, id: WalletId) -> Result<Option<Wallet>> {
        let row = sqlx::query("select * from wallets where id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?;
        row.as_ref().map(wallet_from_row).transpose()
    }

    async fn update_wallet(&self, wallet: &Wallet) -> Result<()> {
        sqlx::query(
            r#"
            update wallets set
                name = $2, m = $3, n = $4, coin = $5, network = $6,
                derivation_strategy = $7, address_type = $8, single_address = $9,
                creation_pub_key = $10, definition_template = $11, copayer_ids = $12,
                public_key_ring = $13, scan_status = $14, status = $15,
                receive_index = $16, change_index = $17
            where id = $1
            "#,
        )
        .bind(wallet.id)
        .bind(&wallet.name)
        .bind(wallet.m as i16)
        .bind(wallet.n as i16)
        .bind(&wallet.coin)
        .bind(network_str(wallet.network))
        .bind(derivation_strategy_str(wallet.derivation_strategy))
        .bind(address_type_str(wallet.address_type))
        .bind(wallet.single_address)
        .bind(&wallet.creation_pub_key)
        .bind(to_json(&wallet.definition_template)?)
        .bind(to_json(&wallet.copayer_ids)?)
        .bind(to_json(&wallet.public_key_ring)?)
        .bind(scan_status_str(wallet.scan_status))
        .bind(wallet_status_str(wallet.status))
        .bind(wallet.receive_index as i32)
        .bind(wallet.change_index as i32)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }

    async fn insert_copayer(&self, copayer: &Copayer) -> Result<()> {
        sqlx::query(
            r#"
            insert into copayers (id, wallet_id, name, xpub, account, device_id, request_pub_keys, custom_data, created_at)
            values ($1,$2,$3,$4,$5,$6,$7,$8,$9)
            "#,
        )
        .bind(&copayer.id)
        .bind(copayer.wallet_id)
        .bind(&copayer.name)
        .bind(&copayer.xpub)
        .bind(copayer.account as i32)
        .bind(&copayer.device_id)
        .bind(to_json(&copayer.request_pub_keys)?)
        .bind(copayer.custom_data.clone())
        .bind(copayer.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }

    async fn get_copayer(&self, id: &str) -> Result<Option<Copayer>> {
        let row = sqlx::query("select * from copayers where id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?;
        row.as_ref().map(copayer_from_row).transpose()
    }

    async fn update_copayer(&self, copayer: &Copayer) -> Result<()> {
        sqlx::query(
            r#"
            update copayers set name = $2, xpub = $3, account = $4, device_id = $5,
                request_pub_keys = $6, custom_data = $7
            where id = $1
            "#,
        )
        .bind(&copayer.id)
        .bind(&copayer.name)
        .bind(&copayer.xpub)
        .bind(copayer.account as i32)
        .bind(&copayer.device_id)
        .bind(to_json(&copayer.request_pub_keys)?)
        .bind(copayer.custom_data.clone())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }

    async fn list_copayers_by_device(&self, device_id: &str) -> Result<Vec<Copayer>> {
        let rows = sqlx::query("select * from copayers where device_id = $1")
            .bind(device_id)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx)?;
        rows.iter().map(copayer_from_row).collect()
    }

    async fn register_copayer_index(&self, entry: &CopayerIndexEntry) -> Result<()> {
        sqlx::query(
            r#"
            insert into copayer_index (copayer_id, wallet_id, is_support_staff)
            values ($1, $2, $3)
            on conflict (copayer_id) do update set wallet_id = excluded.wallet_id, is_support_staff = excluded.is_support_staff
            "#,
        )
        .bind(&entry.copayer_id)
        .bind(entry.wallet_id)
        .bind(entry.is_support_staff)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }

    async fn lookup_copayer_index(&self, copayer_id: &str) -> Result<Option<CopayerIndexEntry>> {
        let row = sqlx::query("select * from copayer_index where copayer_id = $1")
            .bind(copayer_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(row.map(|r| CopayerIndexEntry {
            copayer_id: r.get("copayer_id"),
            wallet_id: r.get("wallet_id"),
            is_support_staff: r.get("is_support_staff"),
        }))
    }

    // --- addresses ---

    async fn insert_address(&self, address: &Address) -> Result<()> {
        sqlx::query(
            r#"
            insert into addresses (wallet_id, address, is_change, path_index, address_type, definition, signing_paths, has_activity, created_at)
            values ($1,$2,$3,$4,$5,$6,$7,$8,$9)
            "#,
        )
        .bind(address.wallet_id)
        .bind(&address.address)
        .bind(address.path.is_change)
        .bind(address.path.index as i32)
        .bind(address_type_str(address.address_type))
        .bind(&address.definition)
        .bind(to_json(&address.signing_paths)?)
        .bind(address.has_activity)
        .bind(address.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }

    async fn get_address(&self, wallet_id: WalletId, address: &str) -> Result<Option<Address>> {
        let row = sqlx::query("select * from addresses where wallet_id = $1 and address = $2")
            .bind(wallet_id)
            .bind(address)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?;
        row.as_ref().map(address_from_row).transpose()
    }

    async fn find_address_by_path(&self, wallet_id: WalletId, is_change: bool, index: u32) -> Result<Option<Address>> {
        let row = sqlx::query("select * from addresses where wallet_id = $1 and is_change = $2 and path_index = $3")
            .bind(wallet_id)
            .bind(is_change)
            .bind(index as i32)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?;
        row.as_ref().map(address_from_row).transpose()
    }

    async fn list_addresses(
        &self,
        wallet_id: WalletId,
        is_change: Option<bool>,
        limit: Option<u32>,
        reverse: bool,
    ) -> Result<Vec<Address>> {
        let order = if reverse { "desc" } else { "asc" };
        let rows = match is_change {
            Some(flag) => {
                sqlx::query(&format!(
                    "select * from addresses where wallet_id = $1 and is_change = $2 order by path_index {order} limit $3"
                ))
                .bind(wallet_id)
                .bind(flag)
                .bind(limit.map(|l| l as i64).unwrap_or(i64::MAX))
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query(&format!(
                    "select * from addresses where wallet_id = $1 order by is_change, path_index {order} limit $2"
                ))
                .bind(wallet_id)
                .bind(limit.map(|l| l as i64).unwrap_or(i64::MAX))
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(map_sqlx)?;
        rows.iter().map(address_from_row).collect()
    }

    async fn mark_address_active(&self, wallet_id: WalletId, address: &str) -> Result<()> {
        sqlx::query("update addresses set has_activity = true where wallet_id = $1 and address = $2")
            .bind(wallet_id)
            .bind(address)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(())
    }

    // --- proposals ---

    async fn insert_proposal(&self, proposal: &TxProposal) -> Result<()> {
        sqlx::query(
            r#"
            insert into tx_proposals (
                id, wallet_id, creator_copayer_id, params, change_address, draft_joint,
                inputs, input_addresses, signing_info, required_signatures, required_rejections,
                status, actions, txid, broadcast_at, stable, stable_at, created_at
            ) values ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18)
            "#,
        )
        .bind(proposal.id)
        .bind(proposal.wallet_id)
        .bind(&proposal.creator_copayer_id)
        .bind(to_json(&proposal.params)?)
        .bind(&proposal.change_address)
        .bind(&proposal.draft_joint)
        .bind(to_json(&proposal.inputs)?)
        .bind(map_to_json_pairs(&proposal.input_addresses)?)
        .bind(to_json(&proposal.signing_info)?)
        .bind(proposal.required_signatures as i16)
        .bind(proposal.required_rejections as i16)
        .bind(proposal_status_str(proposal.status))
        .bind(actions_to_json(&proposal.actions)?)
        .bind(proposal.txid.map(|t| t.to_vec()))
        .bind(proposal.broadcast_at)
        .bind(proposal.stable)
        .bind(proposal.stable_at)
        .bind(proposal.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }

    async fn get_proposal(&self, wallet_id: WalletId, id: ProposalId) -> Result<Option<TxProposal>> {
        let row = sqlx::query("select * from tx_proposals where wallet_id = $1 and id = $2")
            .bind(wallet_id)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?;
        row.as_ref().map(proposal_from_row).transpose()
    }

    async fn update_proposal(&self, proposal: &TxProposal) -> Result<()> {
        sqlx::query(
            r#"
            update tx_proposals set
                change_address = $3, inputs = $4, input_addresses = $5, signing_info = $6,
                status = $7, actions = $8, txid = $9, broadcast_at = $10, stable = $11, stable_at = $12
            where wallet_id = $1 and id = $2
            "#,
        )
        .bind(proposal.wallet_id)
        .bind(proposal.id)
        .bind(&proposal.change_address)
        .bind(to_json(&proposal.inputs)?)
        .bind(map_to_json_pairs(&proposal.input_addresses)?)
        .bind(to_json(&proposal.signing_info)?)
        .bind(proposal_status_str(proposal.status))
        .bind(actions_to_json(&proposal.actions)?)
        .bind(proposal.txid.map(|t| t.to_vec()))
        .bind(proposal.broadcast_at)
        .bind(proposal.stable)
        .bind(proposal.stable_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }

    async fn find_proposal_by_txid(&self, wallet_id: WalletId, txid: [u8; 32]) -> Result<Option<TxProposal>> {
        let row = sqlx::query("select * from tx_proposals where wallet_id = $1 and txid = $2")
            .bind(wallet_id)
            .bind(txid.to_vec())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?;
        row.as_ref().map(proposal_from_row).transpose()
    }

    async fn list_proposals(&self, wallet_id: WalletId, status: Option<ProposalStatus>, limit: Option<u32>) -> Result<Vec<TxProposal>> {
        let rows = match status {
            Some(s) => sqlx::query("select * from tx_proposals where wallet_id = $1 and status = $2 order by created_at desc limit $3")
                .bind(wallet_id)
                .bind(proposal_status_str(s))
                .bind(limit.map(|l| l as i64).unwrap_or(i64::MAX))
                .fetch_all(&self.pool)
                .await,
            None => sqlx::query("select * from tx_proposals where wallet_id = $1 order by created_at desc limit $2")
                .bind(wallet_id)
                .bind(limit.map(|l| l as i64).unwrap_or(i64::MAX))
                .fetch_all(&self.pool)
                .await,
        }
        .map_err(map_sqlx)?;
        rows.iter().map(proposal_from_row).collect()
    }

    async fn list_proposals_by_creator(&self, wallet_id: WalletId, creator_copayer_id: &str, limit: u32) -> Result<Vec<TxProposal>> {
        let rows = sqlx::query(
            "select * from tx_proposals where wallet_id = $1 and creator_copayer_id = $2 order by created_at desc limit $3",
        )
        .bind(wallet_id)
        .bind(creator_copayer_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;
        rows.iter().map(proposal_from_row).collect()
    }

    async fn delete_proposal(&self, wallet_id: WalletId, id: ProposalId) -> Result<()> {
        sqlx::query("delete from tx_proposals where wallet_id = $1 and id = $2")
            .bind(wallet_id)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(())
    }

    // --- broadcast-tx log ---

    async fn record_broadcast(&self, wallet_id: WalletId, proposal_id: ProposalId, inputs: &[UtxoRef], at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r#"
            insert into broadcast_log (wallet_id, proposal_id, inputs, broadcast_at)
            values ($1, $2, $3, $4)
            on conflict (wallet_id, proposal_id) do update set inputs = excluded.inputs, broadcast_at = excluded.broadcast_at
            "#,
        )
        .bind(wallet_id)
        .bind(proposal_id)
        .bind(to_json(&inputs.to_vec())?)
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }

    async fn list_recent_broadcasts(&self, wallet_id: WalletId, since: DateTime<Utc>, limit: usize) -> Result<Vec<(ProposalId, Vec<UtxoRef>)>> {
        let rows = sqlx::query(
            "select proposal_id, inputs from broadcast_log where wallet_id = $1 and broadcast_at >= $2 order by broadcast_at desc limit $3",
        )
        .bind(wallet_id)
        .bind(since)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;

        rows.iter()
            .map(|row| -> Result<(ProposalId, Vec<UtxoRef>)> {
                let id: ProposalId = row.try_get("proposal_id").map_err(map_sqlx)?;
                let inputs: serde_json::Value = row.try_get("inputs").map_err(map_sqlx)?;
                Ok((id, from_json(inputs)?))
            })
            .collect()
    }

    // --- notifications ---

    async fn append_notification(&self, notification: Notification) -> Result<Notification> {
        let row = sqlx::query(
            r#"
            insert into notifications (ticker, wallet_id, notification_type, creator_id, data, created_at)
            values ($1,$2,$3,$4,$5,$6)
            returning *
            "#,
        )
        .bind(notification.ticker as i64)
        .bind(notification.wallet_id)
        .bind(notification_type_str(notification.notification_type))
        .bind(&notification.creator_id)
        .bind(notification.data.clone())
        .bind(notification.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx)?;
        notification_from_row(&row)
    }

    async fn list_notifications(&self, wallet_id: WalletId, after_id: Option<i64>, min_ts: Option<DateTime<Utc>>) -> Result<Vec<Notification>> {
        let rows = sqlx::query(
            r#"
            select * from notifications
            where wallet_id = $1
              and ($2::bigint is null or id > $2)
              and ($3::timestamptz is null or created_at >= $3)
            order by id asc
            "#,
        )
        .bind(wallet_id)
        .bind(after_id)
        .bind(min_ts)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;
        rows.iter().map(notification_from_row).collect()
    }

    // --- sessions ---

    async fn get_session_by_copayer(&self, copayer_id: &str) -> Result<Option<Session>> {
        let row = sqlx::query("select * from sessions where copayer_id = $1")
            .bind(copayer_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(row.map(|r| Session {
            id: r.get("token"),
            copayer_id: r.get("copayer_id"),
            created_at: r.get("created_at"),
            last_active_at: r.get("last_active_at"),
        }))
    }

    async fn upsert_session(&self, session: &Session) -> Result<()> {
        sqlx::query(
            r#"
            insert into sessions (copayer_id, token, created_at, last_active_at)
            values ($1,$2,$3,$4)
            on conflict (copayer_id) do update set token = excluded.token, last_active_at = excluded.last_active_at
            "#,
        )
        .bind(&session.copayer_id)
        .bind(&session.id)
        .bind(session.created_at)
        .bind(session.last_active_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }

    // --- ancillary records ---

    async fn get_tx_note(&self, wallet_id: WalletId, txid: [u8; 32]) -> Result<Option<TxNote>> {
        let row = sqlx::query("select * from tx_notes where wallet_id = $1 and txid = $2")
            .bind(wallet_id)
            .bind(txid.to_vec())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(row.map(|r| {
            let txid_vec: Vec<u8> = r.get("txid");
            TxNote {
                wallet_id: r.get("wallet_id"),
                txid: txid_vec.try_into().unwrap_or([0u8; 32]),
                body: r.get("body"),
                edited_by: r.get("edited_by"),
                edited_at: r.get("edited_at"),
            }
        }))
    }

    async fn upsert_tx_note(&self, note: &TxNote) -> Result<()> {
        sqlx::query(
            r#"
            insert into tx_notes (wallet_id, txid, body, edited_by, edited_at)
            values ($1,$2,$3,$4,$5)
            on conflict (wallet_id, txid) do update set body = excluded.body, edited_by = excluded.edited_by, edited_at = excluded.edited_at
            "#,
        )
        .bind(note.wallet_id)
        .bind(note.txid.to_vec())
        .bind(&note.body)
        .bind(&note.edited_by)
        .bind(note.edited_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }

    async fn list_tx_notes(&self, wallet_id: WalletId, min_ts: Option<DateTime<Utc>>) -> Result<Vec<TxNote>> {
        let rows = sqlx::query("select * from tx_notes where wallet_id = $1 and edited_at >= $2 order by edited_at")
            .bind(wallet_id)
            .bind(min_ts.unwrap_or_else(|| DateTime::<Utc>::MIN_UTC))
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(rows
            .into_iter()
            .map(|r| {
                let txid_vec: Vec<u8> = r.get("txid");
                TxNote {
                    wallet_id: r.get("wallet_id"),
                    txid: txid_vec.try_into().unwrap_or([0u8; 32]),
                    body: r.get("body"),
                    edited_by: r.get("edited_by"),
                    edited_at: r.get("edited_at"),
                }
            })
            .collect())
    }

    // --- tx-confirmation subscriptions ---

    async fn upsert_tx_confirmation(&self, sub: &TxConfirmationSubscription) -> Result<()> {
        sqlx::query(
            r#"
            insert into tx_confirmations (wallet_id, copayer_id, txid, active, coin, network, created_at)
            values ($1,$2,$3,$4,$5,$6,$7)
            on conflict (wallet_id, copayer_id, txid) do update set active = excluded.active, coin = excluded.coin, network = excluded.network
            "#,
        )
        .bind(sub.wallet_id)
        .bind(&sub.copayer_id)
        .bind(sub.txid.to_vec())
        .bind(sub.active)
        .bind(&sub.coin)
        .bind(sub.network.map(network_str))
        .bind(sub.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }

    async fn list_active_tx_confirmations(&self, wallet_id: WalletId, txid: [u8; 32]) -> Result<Vec<TxConfirmationSubscription>> {
        let rows = sqlx::query("select * from tx_confirmations where wallet_id = $1 and txid = $2 and active")
            .bind(wallet_id)
            .bind(txid.to_vec())
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx)?;
        rows.into_iter()
            .map(|r| -> Result<TxConfirmationSubscription> {
                let txid_vec: Vec<u8> = r.get("txid");
                let network: Option<String> = r.get("network");
                Ok(TxConfirmationSubscription {
                    wallet_id: r.get("wallet_id"),
                    copayer_id: r.get("copayer_id"),
                    txid: txid_vec.try_into().unwrap_or([0u8; 32]),
                    active: r.get("active"),
                    coin: r.get("coin"),
                    network: network.map(|n| parse_network(&n)).transpose()?,
                    created_at: r.get("created_at"),
                })
            })
            .collect()
    }

    async fn deactivate_tx_confirmation(&self, wallet_id: WalletId, copayer_id: &str, txid: [u8; 32]) -> Result<()> {
        sqlx::query("update tx_confirmations set active = false where wallet_id = $1 and copayer_id = $2 and txid = $3")
            .bind(wallet_id)
            .bind(copayer_id)
            .bind(txid.to_vec())
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(())
    }

    async fn upsert_push_subscription(&self, sub: &PushSubscription) -> Result<()> {
        sqlx::query(
            r#"
            insert into push_subscriptions (copayer_id, token, platform, created_at)
            values ($1,$2,$3,$4)
            on conflict (copayer_id, token) do update set platform = excluded.platform
            "#,
        )
        .bind(&sub.copayer_id)
        .bind(&sub.token)
        .bind(&sub.platform)
        .bind(sub.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }

    async fn delete_push_subscription(&self, copayer_id: &str, token: &str) -> Result<()> {
        sqlx::query("delete from push_subscriptions where copayer_id = $1 and token = $2")
            .bind(copayer_id)
            .bind(token)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(())
    }

    async fn get_preferences(&self, copayer_id: &str) -> Result<Preferences> {
        let row = sqlx::query("select * from preferences where copayer_id = $1")
            .bind(copayer_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(row
            .map(|r| Preferences {
                email: r.get("email"),
                language: r.get("language"),
                unit: r.get("unit"),
            })
            .unwrap_or_default())
    }

    async fn upsert_preferences(&self, copayer_id: &str, prefs: &Preferences) -> Result<()> {
        sqlx::query(
            r#"
            insert into preferences (copayer_id, email, language, unit)
            values ($1,$2,$3,$4)
            on conflict (copayer_id) do update set email = excluded.email, language = excluded.language, unit = excluded.unit
            "#,
        )
        .bind(copayer_id)
        .bind(&prefs.email)
        .bind(&prefs.language)
        .bind(&prefs.unit)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }

    async fn upsert_asset_metadata(&self, asset: &AssetMetadata) -> Result<()> {
        sqlx::query(
            r#"
            insert into assets (asset, name, registry, decimals, created_at)
            values ($1,$2,$3,$4,$5)
            on conflict (asset) do update set name = excluded.name, registry = excluded.registry, decimals = excluded.decimals
            "#,
        )
        .bind(&asset.asset)
        .bind(&asset.name)
        .bind(&asset.registry)
        .bind(asset.decimals as i16)
        .bind(asset.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }

    async fn get_asset_metadata(&self, asset: &str) -> Result<Option<AssetMetadata>> {
        let row = sqlx::query("select * from assets where asset = $1")
            .bind(asset)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(row.map(|r| AssetMetadata {
            asset: r.get("asset"),
            name: r.get("name"),
            registry: r.get("registry"),
            decimals: r.get::<i16, _>("decimals") as u8,
            created_at: r.get("created_at"),
        }))
    }

    async fn list_asset_metadata(&self) -> Result<Vec<AssetMetadata>> {
        let rows = sqlx::query("select * from assets order by asset")
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(rows
            .into_iter()
            .map(|r| AssetMetadata {
                asset: r.get("asset"),
                name: r.get("name"),
                registry: r.get("registry"),
                decimals: r.get::<i16, _>("decimals") as u8,
                created_at: r.get("created_at"),
            })
            .collect())
    }
}
