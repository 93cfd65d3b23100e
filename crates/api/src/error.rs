//! Maps engine and transport failures onto `spec.md` §6/§7's HTTP contract:
//! every error body is `{code, message}`, and the only status codes are
//! `200`, `400`, `401`, and `500`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use wallet_coord_core::error::Error as EngineError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("malformed request body: {0}")]
    BadRequest(String),

    #[error("missing or malformed {0} header")]
    MissingHeader(&'static str),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

#[derive(Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApiError::Engine(err) => {
                let status = if matches!(err, EngineError::Storage(_)) {
                    StatusCode::INTERNAL_SERVER_ERROR
                } else if err.is_authorization_error() {
                    StatusCode::UNAUTHORIZED
                } else {
                    StatusCode::BAD_REQUEST
                };
                if status == StatusCode::INTERNAL_SERVER_ERROR {
                    tracing::error!(error = %err, code = err.code(), "request failed");
                } else {
                    tracing::info!(error = %err, code = err.code(), "request rejected");
                }
                (status, err.code(), err.to_string())
            }
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "INVALID_REQUEST", msg.clone()),
            ApiError::MissingHeader(name) => {
                (StatusCode::UNAUTHORIZED, "NOT_AUTHORIZED", format!("missing or malformed {name} header"))
            }
            ApiError::Internal(err) => {
                tracing::error!(error = %err, "internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, "SERVER_ERROR", "internal server error".to_string())
            }
        };

        (status, Json(ErrorBody { code, message })).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;
