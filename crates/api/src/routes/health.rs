//! Liveness probe.

use axum::Json;

use crate::error::Result;
use crate::models::HealthResponse;

pub async fn health_check() -> Result<Json<HealthResponse>> {
    Ok(Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION").to_string(),
    }))
}
