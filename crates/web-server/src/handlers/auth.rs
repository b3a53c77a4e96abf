use crate::{
    auth::{verify_password, CurrentUser},
    error::AppError,
    extract::Payload,
    handlers::OrNotFound,
    response::ApiResponse,
    AppState,
};
use axum::extract::State;
use core_types::Validator;
use database::User;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(alias = "username", alias = "email")]
    pub login: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
    pub user: User,
}

/// # POST /api/v1/auth/login
/// Exchanges a username or email and password for a bearer token.
pub async fn login(
    State(state): State<Arc<AppState>>,
    Payload(req): Payload<LoginRequest>,
) -> Result<ApiResponse<LoginResponse>, AppError> {
    let mut v = Validator::new();
    v.required("login", req.login.as_deref())
        .required("password", req.password.as_deref());
    v.finish()?;

    let login = req.login.as_deref().unwrap_or_default().trim();
    let password = req.password.as_deref().unwrap_or_default();

    let candidate = state.db_repo.find_user_by_login(login).await?;
    let verified = match &candidate {
        Some(user) => verify_password(password, &user.password_hash).await,
        None => false,
    };
    let user = match candidate {
        Some(user) if verified => user,
        _ => {
            tracing::warn!(%login, "Failed login attempt.");
            return Err(AppError::Unauthorized("Invalid credentials".to_string()));
        }
    };
    if !user.active {
        tracing::warn!(user_id = user.id, "Login refused for inactive account.");
        return Err(AppError::Forbidden("Account is inactive".to_string()));
    }

    let token = state
        .jwt
        .issue(&user)
        .map_err(|e| AppError::Internal(e.to_string()))?;
    state.db_repo.record_login(user.id).await?;
    tracing::info!(user_id = user.id, role = %user.user_type, "User logged in");

    Ok(ApiResponse::with_message(
        LoginResponse {
            token,
            token_type: "Bearer",
            expires_in: state.jwt.expires_in(),
            user,
        },
        "Login successful",
    ))
}

/// # GET /api/v1/users/me
pub async fn me(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
) -> Result<ApiResponse<User>, AppError> {
    let user = state.db_repo.get_user(current.id).await.or_not_found("User not found")?;
    Ok(ApiResponse::with_message(user, "Profile retrieved successfully"))
}
