//! Errors the client can surface: transport failures, the server's own
//! `{code, message}` body (`spec.md` §6/§7), and local response parsing.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("server rejected the request: {code}: {message}")]
    Api { status: u16, code: String, message: String },

    #[error("failed to decode response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid signing key or signature: {0}")]
    Signing(String),

    #[error("client has no identity configured; call with_identity() first")]
    NoIdentity,
}

pub type Result<T> = std::result::Result<T, ClientError>;

impl ClientError {
    /// Mirrors `wallet_coord_core::error::Error::is_retryable` for the
    /// subset of failures a client can usefully retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

#[derive(serde::Deserialize)]
pub(crate) struct ErrorBody {
    pub code: String,
    pub message: String,
}
