//! Everything else in the HTTP surface: tx notes, preferences, assets and
//! fiat rates, notifications, push-notification subscriptions,
//! tx-confirmation subscriptions, and session login/logout
//! (`spec.md` §4.1, §6).

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use chrono::Utc;

use wallet_coord_core::auth;
use wallet_coord_core::model::misc::{AssetMetadata, Preferences, PushSubscription, TxConfirmationSubscription, TxNote};
use wallet_coord_core::model::Session;

use crate::error::{ApiError, Result};
use crate::models::{FiatRateQuery, NotificationsQuery, PushSubscriptionBody, TxConfirmationBody, TxNoteBody, TxNotesQuery};
use crate::routes::util::{authenticate, decode_hex32, resolve_wallet_id};
use crate::state::AppState;

// --- tx notes ---

pub async fn get_tx_note(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(txid_hex): Path<String>,
) -> Result<Json<Option<TxNote>>> {
    let ctx = authenticate(&state, &headers, "GET", &format!("/txnotes/{txid_hex}"), "").await?;
    let wallet_id = resolve_wallet_id(&headers, &ctx)?;
    let txid = decode_hex32("txid", &txid_hex)?;
    let note = state.storage.get_tx_note(wallet_id, txid).await?;
    Ok(Json(note))
}

pub async fn put_tx_note(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(txid_hex): Path<String>,
    Json(body): Json<TxNoteBody>,
) -> Result<Json<TxNote>> {
    let ctx = authenticate(&state, &headers, "PUT", &format!("/txnotes/{txid_hex}"), "").await?;
    let wallet_id = resolve_wallet_id(&headers, &ctx)?;
    let txid = decode_hex32("txid", &txid_hex)?;
    let note = TxNote {
        wallet_id,
        txid,
        body: body.body,
        edited_by: ctx.copayer.id,
        edited_at: Utc::now(),
    };
    state.storage.upsert_tx_note(&note).await?;
    Ok(Json(note))
}

pub async fn list_tx_notes(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<TxNotesQuery>,
) -> Result<Json<Vec<TxNote>>> {
    let ctx = authenticate(&state, &headers, "GET", "/txnotes", "").await?;
    let wallet_id = resolve_wallet_id(&headers, &ctx)?;
    let notes = state.storage.list_tx_notes(wallet_id, query.min_ts).await?;
    Ok(Json(notes))
}

// --- preferences ---

pub async fn get_preferences(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Result<Json<Preferences>> {
    let ctx = authenticate(&state, &headers, "GET", "/preferences", "").await?;
    let prefs = state.storage.get_preferences(&ctx.copayer.id).await?;
    Ok(Json(prefs))
}

pub async fn put_preferences(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<Preferences>,
) -> Result<Json<Preferences>> {
    let ctx = authenticate(&state, &headers, "PUT", "/preferences", "").await?;
    state.storage.upsert_preferences(&ctx.copayer.id, &body).await?;
    Ok(Json(body))
}

// --- assets and fiat rates ---

pub async fn list_assets(State(state): State<Arc<AppState>>) -> Result<Json<Vec<AssetMetadata>>> {
    let assets = state.storage.list_asset_metadata().await?;
    Ok(Json(assets))
}

pub async fn get_asset(
    State(state): State<Arc<AppState>>,
    Path(asset): Path<String>,
) -> Result<Json<AssetMetadata>> {
    let meta = state
        .storage
        .get_asset_metadata(&asset)
        .await?
        .ok_or_else(|| ApiError::BadRequest(format!("unknown asset {asset}")))?;
    Ok(Json(meta))
}

#[derive(Debug, serde::Serialize)]
pub struct FiatRateResponse {
    pub code: String,
    pub rate: Option<f64>,
}

pub async fn get_fiat_rate(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
    Query(query): Query<FiatRateQuery>,
) -> Result<Json<FiatRateResponse>> {
    let rate = state
        .fiat_rates
        .get_rate(&code, query.code.as_deref(), query.ts)
        .await?;
    Ok(Json(FiatRateResponse { code, rate }))
}

// --- notifications ---

pub async fn list_notifications(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<NotificationsQuery>,
) -> Result<Json<Vec<wallet_coord_core::model::Notification>>> {
    let ctx = authenticate(&state, &headers, "GET", "/notifications", "").await?;
    let wallet_id = resolve_wallet_id(&headers, &ctx)?;

    let span = query
        .time_span
        .map(|s| s.min(state.config.max_notifications_timespan.as_secs() as i64))
        .unwrap_or(state.config.notifications_timespan.as_secs() as i64);
    let min_ts = Utc::now() - chrono::Duration::seconds(span);

    let notifications = state
        .storage
        .list_notifications(wallet_id, query.notification_id, Some(min_ts))
        .await?;
    Ok(Json(notifications))
}

// --- push-notification subscriptions ---

pub async fn subscribe_push(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<PushSubscriptionBody>,
) -> Result<Json<()>> {
    let ctx = authenticate(&state, &headers, "POST", "/pushnotifications/subscriptions", "").await?;
    let sub = PushSubscription {
        copayer_id: ctx.copayer.id,
        token: body.token,
        platform: body.platform,
        created_at: Utc::now(),
    };
    state.storage.upsert_push_subscription(&sub).await?;
    Ok(Json(()))
}

pub async fn unsubscribe_push(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(token): Path<String>,
) -> Result<Json<()>> {
    let ctx = authenticate(&state, &headers, "DELETE", &format!("/pushnotifications/subscriptions/{token}"), "").await?;
    state.storage.delete_push_subscription(&ctx.copayer.id, &token).await?;
    Ok(Json(()))
}

// --- tx-confirmation subscriptions ---

pub async fn subscribe_tx_confirmation(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<TxConfirmationBody>,
) -> Result<Json<()>> {
    let ctx = authenticate(&state, &headers, "POST", "/txconfirmations", "").await?;
    let wallet_id = resolve_wallet_id(&headers, &ctx)?;
    let txid = decode_hex32("txid", &body.txid)?;
    let sub = TxConfirmationSubscription {
        wallet_id,
        copayer_id: ctx.copayer.id,
        txid,
        active: true,
        coin: body.coin,
        network: body.network,
        created_at: Utc::now(),
    };
    state.storage.upsert_tx_confirmation(&sub).await?;
    Ok(Json(()))
}

pub async fn unsubscribe_tx_confirmation(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(txid_hex): Path<String>,
) -> Result<Json<()>> {
    let ctx = authenticate(&state, &headers, "DELETE", &format!("/txconfirmations/{txid_hex}"), "").await?;
    let wallet_id = resolve_wallet_id(&headers, &ctx)?;
    let txid = decode_hex32("txid", &txid_hex)?;
    state.storage.deactivate_tx_confirmation(wallet_id, &ctx.copayer.id, txid).await?;
    Ok(Json(()))
}

// --- session login/logout ---

pub async fn login(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Result<Json<Session>> {
    let ctx = authenticate(&state, &headers, "POST", "/login", "").await?;
    let session = auth::login(state.storage.as_ref(), &ctx.copayer.id, &state.config).await?;
    Ok(Json(session))
}

pub async fn logout(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Result<Json<()>> {
    let ctx = authenticate(&state, &headers, "POST", "/logout", "").await?;
    auth::logout(state.storage.as_ref(), &ctx.copayer.id).await?;
    Ok(Json(()))
}
