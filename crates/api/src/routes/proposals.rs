//! Transaction-proposal lifecycle: create, publish, sign, broadcast, reject,
//! remove, list (`spec.md` §4.4, §6).

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use chrono::Utc;

use wallet_coord_core::error::Error as EngineError;
use wallet_coord_core::model::proposal::{ProposalId, TxProposal};
use wallet_coord_core::proposal_service::{self, CreateProposalRequest};

use crate::error::{ApiError, Result};
use crate::models::{CreateProposalBody, ListProposalsQuery, PublishProposalBody, RejectProposalBody, SignProposalBody};
use crate::routes::util::{authenticate, decode_hex, lock_budget, resolve_wallet_id};
use crate::state::AppState;

pub async fn create_proposal(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body_raw: String,
) -> Result<Json<TxProposal>> {
    let ctx = authenticate(&state, &headers, "POST", "/txproposals", &body_raw).await?;
    let wallet_id = resolve_wallet_id(&headers, &ctx)?;
    let body: CreateProposalBody =
        serde_json::from_str(&body_raw).map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let proposal = proposal_service::create_proposal(
        state.storage.as_ref(),
        state.explorer.as_ref(),
        &state.config,
        Utc::now(),
        CreateProposalRequest {
            wallet_id,
            creator_copayer_id: ctx.copayer.id.clone(),
            tx_proposal_id: body.tx_proposal_id,
            params: body.params,
            dry_run: body.dry_run,
        },
    )
    .await?;
    Ok(Json(proposal))
}

pub async fn publish_proposal(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(proposal_id): Path<ProposalId>,
    Json(body): Json<PublishProposalBody>,
) -> Result<Json<TxProposal>> {
    let ctx = authenticate(&state, &headers, "POST", &format!("/txproposals/{proposal_id}/publish"), "").await?;
    let wallet_id = resolve_wallet_id(&headers, &ctx)?;
    let signature = decode_hex("signature", &body.signature)?;
    let proposal = proposal_service::publish_proposal(
        state.storage.as_ref(),
        state.explorer.as_ref(),
        &state.config,
        state.broker.as_ref(),
        state.ticker.as_ref(),
        wallet_id,
        proposal_id,
        &ctx.copayer.id,
        &signature,
    )
    .await?;
    Ok(Json(proposal))
}

pub async fn sign_proposal(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(proposal_id): Path<ProposalId>,
    Json(body): Json<SignProposalBody>,
) -> Result<Json<TxProposal>> {
    let ctx = authenticate(&state, &headers, "POST", &format!("/txproposals/{proposal_id}/signatures"), "").await?;
    let wallet_id = resolve_wallet_id(&headers, &ctx)?;

    let mut signatures = BTreeMap::new();
    for entry in body.signatures {
        let sig = decode_hex("signature", &entry.signature)?;
        signatures.insert(entry.utxo, sig);
    }

    let locks = state.locks.clone();
    let storage = state.storage.clone();
    let broker = state.broker.clone();
    let ticker = state.ticker.clone();
    let budget = lock_budget(&state);
    let copayer_id = ctx.copayer.id.clone();
    let proposal = locks
        .run_locked(wallet_id, budget, move || async move {
            proposal_service::sign_proposal(
                storage.as_ref(),
                broker.as_ref(),
                ticker.as_ref(),
                wallet_id,
                proposal_id,
                &copayer_id,
                signatures,
                Utc::now(),
            )
            .await
        })
        .await?;
    Ok(Json(proposal))
}

pub async fn reject_proposal(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(proposal_id): Path<ProposalId>,
    Json(body): Json<RejectProposalBody>,
) -> Result<Json<TxProposal>> {
    let ctx = authenticate(&state, &headers, "POST", &format!("/txproposals/{proposal_id}/rejections"), "").await?;
    let wallet_id = resolve_wallet_id(&headers, &ctx)?;
    let proposal = proposal_service::reject_proposal(
        state.storage.as_ref(),
        state.broker.as_ref(),
        state.ticker.as_ref(),
        wallet_id,
        proposal_id,
        &ctx.copayer.id,
        body.comment,
        Utc::now(),
    )
    .await?;
    Ok(Json(proposal))
}

pub async fn broadcast_proposal(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(proposal_id): Path<ProposalId>,
) -> Result<Json<TxProposal>> {
    let ctx = authenticate(&state, &headers, "POST", &format!("/txproposals/{proposal_id}/broadcast"), "").await?;
    let wallet_id = resolve_wallet_id(&headers, &ctx)?;
    let proposal = proposal_service::broadcast_proposal(
        state.storage.as_ref(),
        state.explorer.as_ref(),
        state.hub.as_ref(),
        state.broker.as_ref(),
        state.ticker.as_ref(),
        wallet_id,
        proposal_id,
        Utc::now(),
    )
    .await?;
    Ok(Json(proposal))
}

pub async fn remove_proposal(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(proposal_id): Path<ProposalId>,
) -> Result<Json<()>> {
    let ctx = authenticate(&state, &headers, "DELETE", &format!("/txproposals/{proposal_id}"), "").await?;
    let wallet_id = resolve_wallet_id(&headers, &ctx)?;
    proposal_service::remove_proposal(
        state.storage.as_ref(),
        &state.config,
        state.broker.as_ref(),
        state.ticker.as_ref(),
        wallet_id,
        proposal_id,
        &ctx.copayer.id,
        Utc::now(),
    )
    .await?;
    Ok(Json(()))
}

pub async fn get_proposal(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(proposal_id): Path<ProposalId>,
) -> Result<Json<TxProposal>> {
    let ctx = authenticate(&state, &headers, "GET", &format!("/txproposals/{proposal_id}"), "").await?;
    let wallet_id = resolve_wallet_id(&headers, &ctx)?;
    let proposal = state
        .storage
        .get_proposal(wallet_id, proposal_id)
        .await?
        .ok_or(EngineError::TxNotFound)?;
    Ok(Json(proposal))
}

pub async fn list_proposals(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ListProposalsQuery>,
) -> Result<Json<Vec<TxProposal>>> {
    let ctx = authenticate(&state, &headers, "GET", "/txproposals", "").await?;
    let wallet_id = resolve_wallet_id(&headers, &ctx)?;
    let mut proposals = state.storage.list_proposals(wallet_id, query.status, query.limit).await?;

    if let Some(min_ts) = query.min_ts {
        proposals.retain(|p| p.created_at >= min_ts);
    }
    if let Some(max_ts) = query.max_ts {
        proposals.retain(|p| p.created_at <= max_ts);
    }
    if let Some(is_pending) = query.is_pending {
        proposals.retain(|p| (p.status == wallet_coord_core::model::proposal::ProposalStatus::Pending) == is_pending);
    }
    if let Some(app) = &query.app {
        proposals.retain(|p| p.params.kind() == app);
    }

    Ok(Json(proposals))
}

pub async fn list_pending_proposals(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Result<Json<Vec<TxProposal>>> {
    let ctx = authenticate(&state, &headers, "GET", "/txproposals/pending", "").await?;
    let wallet_id = resolve_wallet_id(&headers, &ctx)?;
    let proposals = state
        .storage
        .list_proposals(wallet_id, Some(wallet_coord_core::model::proposal::ProposalStatus::Pending), None)
        .await?;
    Ok(Json(proposals))
}
