//! Read-only ledger surface: balance, UTXOs, transaction history, raw
//! joint pass-through (`spec.md` §4.5, §6).

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Serialize;

use wallet_coord_core::error::Error as EngineError;
use wallet_coord_core::utxo::compute_reservation_view;

use crate::error::{ApiError, Result};
use crate::models::{AddressSetQuery, BalanceResponse, TxHistoryQuery, UtxoResponse};
use crate::routes::util::{authenticate, decode_hex32, resolve_wallet_id};
use crate::state::AppState;

async fn wallet_addresses(state: &AppState, wallet_id: wallet_coord_core::model::wallet::WalletId) -> Result<Vec<String>> {
    let addrs = state.storage.list_addresses(wallet_id, None, None, false).await?;
    Ok(addrs.into_iter().map(|a| a.address).collect())
}

pub async fn get_balance(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<AddressSetQuery>,
) -> Result<Json<BalanceResponse>> {
    let ctx = authenticate(&state, &headers, "GET", "/balance", "").await?;
    let wallet_id = resolve_wallet_id(&headers, &ctx)?;
    let addresses = match query.address_list() {
        Some(addrs) => addrs,
        None => wallet_addresses(&state, wallet_id).await?,
    };
    let balance = state.explorer.get_balance(&addresses, query.asset.as_deref()).await?;
    Ok(Json(balance.into()))
}

pub async fn get_utxos(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<AddressSetQuery>,
) -> Result<Json<Vec<UtxoResponse>>> {
    let ctx = authenticate(&state, &headers, "GET", "/utxos", "").await?;
    let wallet_id = resolve_wallet_id(&headers, &ctx)?;
    let addresses = match query.address_list() {
        Some(addrs) => addrs,
        None => wallet_addresses(&state, wallet_id).await?,
    };
    let view = compute_reservation_view(
        state.storage.as_ref(),
        state.explorer.as_ref(),
        &state.config,
        wallet_id,
        &addresses,
        query.asset.as_deref(),
    )
    .await?;
    let out = view
        .utxos
        .into_iter()
        .map(|(u, s)| UtxoResponse::from_explorer(u, s))
        .collect();
    Ok(Json(out))
}

pub async fn get_tx_history(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<TxHistoryQuery>,
) -> Result<Json<Vec<crate::models::HistoryEntryResponse>>> {
    let ctx = authenticate(&state, &headers, "GET", "/txhistory", "").await?;
    let wallet_id = resolve_wallet_id(&headers, &ctx)?;
    let addresses = match query.address_list() {
        Some(addrs) => addrs,
        None => wallet_addresses(&state, wallet_id).await?,
    };
    let limit = query.limit.unwrap_or(state.config.history_limit).min(state.config.history_limit);
    if query.limit.is_some_and(|l| l > state.config.history_limit) {
        return Err(ApiError::from(EngineError::HistoryLimitExceeded));
    }
    let history = state
        .explorer
        .get_tx_history(&addresses, query.asset.as_deref(), limit, query.last_row_id)
        .await?;
    Ok(Json(history.into_iter().map(Into::into).collect()))
}

#[derive(Debug, Serialize)]
pub struct RawJointResponse {
    /// Hex-encoded joint bytes.
    pub joint: String,
}

pub async fn get_raw_tx(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(txid_hex): Path<String>,
) -> Result<Json<RawJointResponse>> {
    let ctx = authenticate(&state, &headers, "GET", &format!("/txraw/{txid_hex}"), "").await?;
    let wallet_id = resolve_wallet_id(&headers, &ctx)?;
    let txid = decode_hex32("txid", &txid_hex)?;
    let proposal = state
        .storage
        .find_proposal_by_txid(wallet_id, txid)
        .await?
        .ok_or(EngineError::TxNotFound)?;
    Ok(Json(RawJointResponse {
        joint: hex::encode(proposal.draft_joint),
    }))
}

pub async fn broadcast_raw(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<crate::models::BroadcastRawBody>,
) -> Result<Json<()>> {
    authenticate(&state, &headers, "POST", "/broadcast_raw", "").await?;
    let raw = hex::decode(&body.joint).map_err(|_| ApiError::BadRequest("joint is not valid hex".into()))?;
    state.hub.broadcast_joint(&raw).await?;
    Ok(Json(()))
}
