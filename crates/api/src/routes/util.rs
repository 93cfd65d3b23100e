//! Shared request plumbing: header extraction, authentication, and a
//! `lock::run_locked` wrapper bounded by `state.config`'s lock budget
//! (`spec.md` §4.1, §4.7).

use axum::http::HeaderMap;

use wallet_coord_core::auth::{self, AuthContext, Credential};
use wallet_coord_core::lock::LockBudget;
use wallet_coord_core::model::wallet::WalletId;

use crate::error::{ApiError, Result};
use crate::state::AppState;

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

pub fn lock_budget(state: &AppState) -> LockBudget {
    LockBudget {
        wait: state.config.lock_wait_time,
        max_hold: state.config.lock_exe_time,
    }
}

pub fn decode_hex(field: &str, value: &str) -> Result<Vec<u8>> {
    hex::decode(value).map_err(|_| ApiError::BadRequest(format!("{field} is not valid hex")))
}

pub fn decode_hex32(field: &str, value: &str) -> Result<[u8; 32]> {
    let bytes = decode_hex(field, value)?;
    bytes
        .try_into()
        .map_err(|_| ApiError::BadRequest(format!("{field} must be exactly 32 bytes")))
}

/// Verifies `x-client-version`, then authenticates via `x-session` if
/// present, falling back to `x-identity`/`x-signature` (`spec.md` §4.1).
/// `method`/`url`/`body` feed the signature-covered canonical message.
pub async fn authenticate(
    state: &AppState,
    headers: &HeaderMap,
    method: &str,
    url: &str,
    body: &str,
) -> Result<AuthContext> {
    auth::enforce_min_client_version(header(headers, "x-client-version"), &state.config)
        .map_err(ApiError::from)?;

    let copayer_id = header(headers, "x-identity").ok_or(ApiError::MissingHeader("x-identity"))?;

    let credential = if let Some(session) = header(headers, "x-session") {
        Credential::SessionToken(session)
    } else {
        let signature_hex = header(headers, "x-signature").ok_or(ApiError::MissingHeader("x-signature"))?;
        let signature = decode_hex("x-signature", signature_hex)?;
        return authenticate_with_signature(state, copayer_id, method, url, body, signature).await;
    };

    auth::authenticate(state.storage.as_ref(), copayer_id, credential, &state.config)
        .await
        .map_err(Into::into)
}

async fn authenticate_with_signature(
    state: &AppState,
    copayer_id: &str,
    method: &str,
    url: &str,
    body: &str,
    signature: Vec<u8>,
) -> Result<AuthContext> {
    let credential = Credential::Signature {
        method,
        url,
        body,
        signature: &signature,
    };
    auth::authenticate(state.storage.as_ref(), copayer_id, credential, &state.config)
        .await
        .map_err(Into::into)
}

/// Resolves the wallet a request targets, honoring the support-staff
/// `x-wallet-id` override (`spec.md` §4.1).
pub fn resolve_wallet_id(headers: &HeaderMap, ctx: &AuthContext) -> Result<WalletId> {
    let requested = header(headers, "x-wallet-id")
        .map(|raw| raw.parse::<WalletId>().map_err(|_| ApiError::BadRequest("invalid x-wallet-id".into())))
        .transpose()?;
    ctx.effective_wallet_id(requested).map_err(Into::into)
}
