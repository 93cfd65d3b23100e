//! Address creation, listing and scan (`spec.md` §4.3, §6).

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Serialize;

use wallet_coord_core::{address_service, model::Address};

use crate::error::Result;
use crate::models::{CreateAddressQuery, ListAddressesQuery};
use crate::routes::util::{authenticate, resolve_wallet_id};
use crate::state::AppState;

pub async fn create_address(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<CreateAddressQuery>,
) -> Result<Json<Address>> {
    let ctx = authenticate(&state, &headers, "POST", "/addresses", "").await?;
    let wallet_id = resolve_wallet_id(&headers, &ctx)?;
    let addr = address_service::create_address(
        state.storage.as_ref(),
        state.explorer.as_ref(),
        &state.config,
        wallet_id,
        query.ignore_max_gap,
    )
    .await?;
    Ok(Json(addr))
}

pub async fn list_addresses(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ListAddressesQuery>,
) -> Result<Json<Vec<Address>>> {
    let ctx = authenticate(&state, &headers, "GET", "/addresses", "").await?;
    let wallet_id = resolve_wallet_id(&headers, &ctx)?;
    let addrs = state
        .storage
        .list_addresses(wallet_id, None, query.limit, query.reverse)
        .await?;
    Ok(Json(addrs))
}

#[derive(Debug, Serialize)]
pub struct ScanResponse {
    pub receive_created: u32,
    pub change_created: u32,
}

pub async fn scan_addresses(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Result<Json<ScanResponse>> {
    let ctx = authenticate(&state, &headers, "POST", "/addresses/scan", "").await?;
    let wallet_id = resolve_wallet_id(&headers, &ctx)?;
    let result = address_service::scan(state.storage.as_ref(), state.explorer.as_ref(), &state.config, wallet_id).await?;
    Ok(Json(ScanResponse {
        receive_created: result.receive_created,
        change_created: result.change_created,
    }))
}
