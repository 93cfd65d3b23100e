//! Wallet formation and lookup: `POST/GET/PUT /wallets`, `PUT /copayers/:id`,
//! `GET /copayers` (`spec.md` §4.2, §6).

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};

use wallet_coord_core::lock::LockBudget;
use wallet_coord_core::model::wallet::{Copayer, DerivationStrategy, Wallet, WalletId};
use wallet_coord_core::wallet_service::{self, AddAccessRequest, CreateWalletRequest, JoinWalletRequest};

use crate::error::{ApiError, Result};
use crate::models::{AddAccessBody, CreateWalletBody, JoinWalletBody, UpdateNameBody};
use crate::routes::util::{authenticate, decode_hex, lock_budget, resolve_wallet_id};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct CreateWalletResponse {
    pub wallet_id: WalletId,
}

pub async fn create_wallet(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateWalletBody>,
) -> Result<Json<CreateWalletResponse>> {
    let creation_pub_key = decode_hex("creationPubKey", &body.creation_pub_key)?;
    let wallet = wallet_service::create_wallet(
        state.storage.as_ref(),
        CreateWalletRequest {
            id: body.id,
            name: body.name,
            m: body.m,
            n: body.n,
            coin: body.coin,
            network: body.network,
            derivation_strategy: body.derivation_strategy.unwrap_or(DerivationStrategy::Bip44),
            single_address: body.single_address,
            creation_pub_key,
        },
    )
    .await?;
    Ok(Json(CreateWalletResponse { wallet_id: wallet.id }))
}

#[derive(Debug, Serialize)]
pub struct JoinWalletResponse {
    #[serde(flatten)]
    pub wallet: Wallet,
    pub copayer: Copayer,
}

pub async fn join_wallet(
    State(state): State<Arc<AppState>>,
    Path(wallet_id): Path<WalletId>,
    headers: HeaderMap,
    Json(body): Json<JoinWalletBody>,
) -> Result<Json<JoinWalletResponse>> {
    if wallet_id != body.wallet_id {
        return Err(ApiError::BadRequest("path wallet id does not match body".into()));
    }
    auth_client_version(&state, &headers)?;

    let request_pub_key = decode_hex("requestPubKey", &body.request_pub_key)?;
    let copayer_signature = decode_hex("copayerSignature", &body.copayer_signature)?;

    let req = JoinWalletRequest {
        wallet_id: body.wallet_id,
        name: body.name,
        xpub: body.x_pub_key,
        account: body.account,
        device_id: body.device_id,
        request_pub_key,
        copayer_signature,
        coin: body.coin,
        network: body.network,
        custom_data: body.custom_data,
        dry_run: body.dry_run,
    };

    let outcome = if body.dry_run {
        wallet_service::join_wallet(state.storage.as_ref(), state.broker.as_ref(), state.ticker.as_ref(), req).await?
    } else {
        wallet_service::join_wallet_locked(
            state.storage.clone(),
            state.broker.clone(),
            state.ticker.clone(),
            &state.locks,
            LockBudget {
                wait: state.config.lock_wait_time,
                max_hold: state.config.lock_exe_time,
            },
            req,
        )
        .await?
    };

    Ok(Json(JoinWalletResponse {
        wallet: outcome.wallet,
        copayer: outcome.copayer,
    }))
}

pub async fn add_access(
    State(state): State<Arc<AppState>>,
    Path(copayer_id): Path<String>,
    Json(body): Json<AddAccessBody>,
) -> Result<Json<Copayer>> {
    let new_request_pub_key = decode_hex("newRequestPubKey", &body.new_request_pub_key)?;
    let signature = decode_hex("signature", &body.signature)?;
    let copayer = wallet_service::add_access(
        state.storage.as_ref(),
        &state.config,
        AddAccessRequest {
            copayer_id,
            new_request_pub_key,
            signature,
        },
    )
    .await?;
    Ok(Json(copayer))
}

pub async fn get_wallet(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(identifier): Path<String>,
) -> Result<Json<Wallet>> {
    let ctx = authenticate(&state, &headers, "GET", &format!("/wallets/{identifier}"), "").await?;

    let wallet_id = match identifier.parse::<WalletId>() {
        Ok(id) => id,
        Err(_) if ctx.is_support_staff => {
            if let Some(addr) = state.storage.get_address(ctx.bound_wallet_id, &identifier).await.ok().flatten() {
                addr.wallet_id
            } else {
                return Err(ApiError::from(wallet_coord_core::error::Error::WalletNotFound));
            }
        }
        Err(_) => return Err(ApiError::BadRequest("invalid wallet identifier".into())),
    };

    ctx.effective_wallet_id(Some(wallet_id))?;
    let wallet = state
        .storage
        .get_wallet(wallet_id)
        .await?
        .ok_or(wallet_coord_core::error::Error::WalletNotFound)?;
    Ok(Json(wallet))
}

pub async fn get_own_wallet(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Result<Json<Wallet>> {
    let ctx = authenticate(&state, &headers, "GET", "/wallets", "").await?;
    let wallet_id = resolve_wallet_id(&headers, &ctx)?;
    let wallet = state
        .storage
        .get_wallet(wallet_id)
        .await?
        .ok_or(wallet_coord_core::error::Error::WalletNotFound)?;
    Ok(Json(wallet))
}

pub async fn update_wallet_name(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<UpdateNameBody>,
) -> Result<Json<Wallet>> {
    let ctx = authenticate(&state, &headers, "PUT", "/wallets", "").await?;
    let wallet_id = resolve_wallet_id(&headers, &ctx)?;
    let mut wallet = state
        .storage
        .get_wallet(wallet_id)
        .await?
        .ok_or(wallet_coord_core::error::Error::WalletNotFound)?;
    wallet.name = body.name;
    state.storage.update_wallet(&wallet).await?;
    Ok(Json(wallet))
}

#[derive(Debug, Deserialize)]
pub struct CopayersByDeviceQuery {
    pub device_id: String,
}

pub async fn list_copayers_by_device(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CopayersByDeviceQuery>,
) -> Result<Json<Vec<Copayer>>> {
    let copayers = state.storage.list_copayers_by_device(&query.device_id).await?;
    Ok(Json(copayers))
}

fn auth_client_version(state: &AppState, headers: &HeaderMap) -> Result<()> {
    let client_version = headers.get("x-client-version").and_then(|v| v.to_str().ok());
    wallet_coord_core::auth::enforce_min_client_version(client_version, &state.config)?;
    Ok(())
}
