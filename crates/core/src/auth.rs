//! Session and signature authentication (`spec.md` §4.1).

use chrono::{Duration as ChronoDuration, Utc};
use rand::RngCore;

use crate::config::EngineConfig;
use crate::crypto::{canonical_request_message, verify_signature};
use crate::error::{Error, Result};
use crate::model::wallet::{Copayer, CopayerIndexEntry, WalletId};
use crate::model::Session;
use crate::traits::Storage;

/// The two ways a request can prove it comes from a given copayer.
pub enum Credential<'a> {
    Signature {
        method: &'a str,
        url: &'a str,
        body: &'a str,
        signature: &'a [u8],
    },
    SessionToken(&'a str),
}

/// The authenticated identity behind a request, including the wallet-id
/// override support staff may pass explicitly (`spec.md` §4.1).
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub copayer: Copayer,
    pub is_support_staff: bool,
    pub bound_wallet_id: WalletId,
}

impl AuthContext {
    /// Resolves the wallet a request should operate on: the copayer's own
    /// wallet, unless it is support staff and an explicit `x-wallet-id` was
    /// supplied.
    pub fn effective_wallet_id(&self, requested: Option<WalletId>) -> Result<WalletId> {
        match requested {
            Some(id) if self.is_support_staff => Ok(id),
            Some(id) if id == self.bound_wallet_id => Ok(id),
            Some(_) => Err(Error::CopayerNotFound),
            None => Ok(self.bound_wallet_id),
        }
    }
}

/// Verifies a request's credential and returns the authenticated context.
/// Every failure mode collapses to one of the three auth errors
/// (`spec.md` §4.1/§7) to avoid leaking which part of the check failed.
pub async fn authenticate(
    storage: &dyn Storage,
    copayer_id: &str,
    credential: Credential<'_>,
    config: &EngineConfig,
) -> Result<AuthContext> {
    let copayer = storage
        .get_copayer(copayer_id)
        .await?
        .ok_or(Error::CopayerNotFound)?;
    let index = storage
        .lookup_copayer_index(copayer_id)
        .await?
        .ok_or(Error::CopayerNotFound)?;

    match credential {
        Credential::Signature {
            method,
            url,
            body,
            signature,
        } => {
            let message = canonical_request_message(method, url, body);
            let verified = copayer
                .request_pub_keys
                .iter()
                .rev() // current key (most recently added) first
                .any(|k| verify_signature(&k.key, &message, signature));
            if !verified {
                return Err(Error::InvalidSignature);
            }
        }
        Credential::SessionToken(token) => {
            let session = storage
                .get_session_by_copayer(copayer_id)
                .await?
                .filter(|s| s.id == token)
                .ok_or(Error::SessionExpired)?;
            if !session.is_valid_at(Utc::now(), ChronoDuration::from_std(config.session_expiration).unwrap()) {
                return Err(Error::SessionExpired);
            }
            let refreshed = Session {
                last_active_at: Utc::now(),
                ..session
            };
            storage.upsert_session(&refreshed).await?;
        }
    }

    Ok(AuthContext {
        bound_wallet_id: index.wallet_id,
        is_support_staff: index.is_support_staff,
        copayer,
    })
}

/// `POST /login`: returns the same token for repeated logins while the
/// existing session is still valid; mints a new one otherwise
/// (`spec.md` §4.1).
pub async fn login(storage: &dyn Storage, copayer_id: &str, config: &EngineConfig) -> Result<Session> {
    let now = Utc::now();
    let expiration = ChronoDuration::from_std(config.session_expiration).unwrap();

    if let Some(existing) = storage.get_session_by_copayer(copayer_id).await? {
        if existing.is_valid_at(now, expiration) {
            let refreshed = Session {
                last_active_at: now,
                ..existing
            };
            storage.upsert_session(&refreshed).await?;
            return Ok(refreshed);
        }
    }

    let mut token_bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut token_bytes);
    let session = Session {
        id: hex::encode(token_bytes),
        copayer_id: copayer_id.to_string(),
        created_at: now,
        last_active_at: now,
    };
    storage.upsert_session(&session).await?;
    Ok(session)
}

/// `POST /logout`: invalidates the session by expiring it immediately.
pub async fn logout(storage: &dyn Storage, copayer_id: &str) -> Result<()> {
    if let Some(mut session) = storage.get_session_by_copayer(copayer_id).await? {
        session.last_active_at = Utc::now() - ChronoDuration::days(3650);
        storage.upsert_session(&session).await?;
    }
    Ok(())
}

/// `spec.md` §4.1: a client below the minimum-supported floor is rejected
/// with `upgrade-needed` before any other check runs.
pub fn enforce_min_client_version(
    client_version: Option<&str>,
    config: &EngineConfig,
) -> Result<()> {
    let Some(raw) = client_version else {
        return Ok(());
    };
    let Ok(parsed) = semver::Version::parse(raw) else {
        return Ok(());
    };
    if parsed < config.min_client_version {
        return Err(Error::UpgradeNeeded);
    }
    Ok(())
}

pub fn make_copayer_index(copayer: &Copayer, is_support_staff: bool) -> CopayerIndexEntry {
    CopayerIndexEntry {
        copayer_id: copayer.id.clone(),
        wallet_id: copayer.wallet_id,
        is_support_staff,
    }
}
