use crate::{error::AppError, response::ApiResponse, AppState};
use axum::extract::State;
use serde_json::{json, Value};
use std::sync::Arc;

/// # GET /api/health
pub async fn health() -> &'static str {
    "OK"
}

/// # GET /api/v1/ping
pub async fn ping() -> ApiResponse<Value> {
    ApiResponse::with_message(json!({ "pong": true }), "pong")
}

/// # GET /api/v1/ready
/// Reports whether the database answers.
pub async fn ready(State(state): State<Arc<AppState>>) -> Result<ApiResponse<Value>, AppError> {
    state.db_repo.ping().await.map_err(|e| {
        tracing::warn!(error = ?e, "Readiness check failed.");
        AppError::Unavailable("Database unavailable".to_string())
    })?;
    Ok(ApiResponse::with_message(json!({ "database": "ok" }), "Ready"))
}

/// Any path no route claims.
pub async fn fallback() -> AppError {
    AppError::NotFound("Endpoint not found".to_string())
}
