//! Bearer token authentication and role extractors.
//!
//! Tokens are HS256 JWTs signed with `auth.jwt_secret`. Handlers opt into
//! authentication by taking one of the extractors:
//!
//! - `CurrentUser`: any valid token.
//! - `StaffUser`: admin or mentor.
//! - `AdminUser`: admin only.

use crate::{error::AppError, AppState};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap},
};
use chrono::{Duration, Utc};
use configuration::AuthSettings;
use core_types::UserType;
use database::{DbError, User};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Claims carried by an access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: String,
    pub username: String,
    pub role: UserType,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
    pub jti: String,
}

#[derive(Error, Debug)]
pub enum JwtError {
    #[error("Token has expired")]
    Expired,
    #[error("Invalid token: {0}")]
    Invalid(String),
    #[error("Token generation failed: {0}")]
    Generation(String),
}

#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    ttl_minutes: i64,
}

impl JwtService {
    pub fn new(settings: &AuthSettings) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(settings.jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(settings.jwt_secret.as_bytes()),
            issuer: settings.issuer.clone(),
            ttl_minutes: settings.token_ttl_minutes,
        }
    }

    /// Lifetime of issued tokens, in seconds.
    pub fn expires_in(&self) -> i64 {
        self.ttl_minutes * 60
    }

    pub fn issue(&self, user: &User) -> Result<String, JwtError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user.id.to_string(),
            username: user.username.clone(),
            role: user.user_type,
            iat: now.timestamp(),
            exp: (now + Duration::minutes(self.ttl_minutes)).timestamp(),
            iss: self.issuer.clone(),
            jti: Uuid::new_v4().to_string(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| JwtError::Generation(e.to_string()))
    }

    pub fn verify(&self, token: &str) -> Result<Claims, JwtError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        validation.set_required_spec_claims(&["sub", "exp", "iat", "iss"]);

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => JwtError::Expired,
                _ => JwtError::Invalid(e.to_string()),
            })
    }

    /// Resolves the caller's id from an `Authorization` header, if it carries
    /// a valid token. Used where authentication is informational only.
    pub fn user_id_from_headers(&self, headers: &HeaderMap) -> Option<i64> {
        let token = bearer_token(headers)?;
        self.verify(token).ok()?.sub.parse().ok()
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Runs on the blocking pool; argon2 is CPU-bound.
pub async fn hash_password(password: &str) -> Result<String, AppError> {
    let password = password.to_string();
    tokio::task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| AppError::Internal(format!("password hashing failed: {}", e)))
    })
    .await
    .map_err(|e| AppError::Internal(format!("password hashing task failed: {}", e)))?
}

/// A malformed stored hash counts as a mismatch.
pub async fn verify_password(password: &str, hash: &str) -> bool {
    let password = password.to_string();
    let hash = hash.to_string();
    tokio::task::spawn_blocking(move || {
        PasswordHash::new(&hash)
            .map(|parsed| {
                Argon2::default()
                    .verify_password(password.as_bytes(), &parsed)
                    .is_ok()
            })
            .unwrap_or(false)
    })
    .await
    .unwrap_or(false)
}

/// Rebuilds the caller from the stored account. The stored role wins over
/// the one in the token.
fn confirm_account(user_id: i64, account: Option<User>) -> Result<CurrentUser, AppError> {
    match account {
        Some(account) if account.active => Ok(CurrentUser {
            id: account.id,
            username: account.username,
            role: account.user_type,
        }),
        Some(_) => {
            tracing::warn!(user_id, "Token presented for a deactivated account.");
            Err(AppError::Unauthorized("Account is inactive".to_string()))
        }
        None => {
            tracing::warn!(user_id, "Token presented for a missing account.");
            Err(AppError::Unauthorized("Account not found".to_string()))
        }
    }
}

/// The authenticated caller, decoded from the bearer token.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: i64,
    pub username: String,
    pub role: UserType,
}

impl CurrentUser {
    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }

    pub fn is_staff(&self) -> bool {
        self.role.is_staff()
    }
}

impl TryFrom<Claims> for CurrentUser {
    type Error = JwtError;

    fn try_from(claims: Claims) -> Result<Self, Self::Error> {
        let id = claims
            .sub
            .parse()
            .map_err(|_| JwtError::Invalid("subject is not a user id".to_string()))?;
        Ok(Self {
            id,
            username: claims.username,
            role: claims.role,
        })
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<CurrentUser>() {
            return Ok(user.clone());
        }

        let Some(token) = bearer_token(&parts.headers) else {
            tracing::debug!(uri = %parts.uri, "Missing bearer token.");
            return Err(AppError::Unauthorized("Unauthorized".to_string()));
        };

        let mut user = state
            .jwt
            .verify(token)
            .and_then(CurrentUser::try_from)
            .map_err(|e| {
                tracing::warn!(uri = %parts.uri, error = %e, "Bearer token rejected.");
                match e {
                    JwtError::Expired => AppError::Unauthorized("Token has expired".to_string()),
                    _ => AppError::Unauthorized("Invalid token".to_string()),
                }
            })?;

        if state.settings.auth.check_account_status {
            let account = match state.db_repo.get_user(user.id).await {
                Ok(account) => Some(account),
                Err(DbError::NotFound) => None,
                Err(e) => return Err(e.into()),
            };
            user = confirm_account(user.id, account)?;
        }

        parts.extensions.insert(user.clone());
        Ok(user)
    }
}

/// An authenticated admin.
#[derive(Debug, Clone)]
pub struct AdminUser(pub CurrentUser);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let user = CurrentUser::from_request_parts(parts, state).await?;
        if !user.is_admin() {
            tracing::warn!(user_id = user.id, uri = %parts.uri, "Admin route refused.");
            return Err(AppError::Forbidden("Admin access required".to_string()));
        }
        Ok(AdminUser(user))
    }
}

/// An authenticated admin or mentor.
#[derive(Debug, Clone)]
pub struct StaffUser(pub CurrentUser);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for StaffUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let user = CurrentUser::from_request_parts(parts, state).await?;
        if !user.is_staff() {
            return Err(AppError::Forbidden("Staff access required".to_string()));
        }
        Ok(StaffUser(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(ttl_minutes: i64) -> AuthSettings {
        AuthSettings {
            jwt_secret: "a-test-secret-that-is-long-enough-123".to_string(),
            token_ttl_minutes: ttl_minutes,
            issuer: "clubhouse".to_string(),
            check_account_status: true,
        }
    }

    fn user(user_type: UserType) -> User {
        User {
            id: 42,
            username: "thandi".to_string(),
            email: "thandi@example.com".to_string(),
            password_hash: String::new(),
            name: "Thandi".to_string(),
            surname: "Mokoena".to_string(),
            user_type,
            phone: None,
            school: None,
            grade: None,
            active: true,
            last_login_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn issued_tokens_verify() {
        let jwt = JwtService::new(&settings(60));
        let token = jwt.issue(&user(UserType::Mentor)).unwrap();
        let claims = jwt.verify(&token).unwrap();
        assert_eq!(claims.sub, "42");
        assert_eq!(claims.role, UserType::Mentor);
        assert_eq!(claims.iss, "clubhouse");
        assert_eq!(claims.exp - claims.iat, 3600);
        let current = CurrentUser::try_from(claims).unwrap();
        assert!(current.is_staff());
        assert!(!current.is_admin());
    }

    #[test]
    fn expired_tokens_are_rejected() {
        let jwt = JwtService::new(&settings(-10));
        let token = jwt.issue(&user(UserType::Admin)).unwrap();
        assert!(matches!(jwt.verify(&token), Err(JwtError::Expired)));
    }

    #[test]
    fn tokens_from_another_secret_are_rejected() {
        let token = JwtService::new(&settings(60)).issue(&user(UserType::Admin)).unwrap();
        let mut other = settings(60);
        other.jwt_secret = "another-secret-that-is-also-long-enough".to_string();
        assert!(matches!(
            JwtService::new(&other).verify(&token),
            Err(JwtError::Invalid(_))
        ));
    }

    #[test]
    fn user_id_from_headers_reads_bearer() {
        let jwt = JwtService::new(&settings(60));
        let token = jwt.issue(&user(UserType::Member)).unwrap();
        let mut headers = HeaderMap::new();
        assert_eq!(jwt.user_id_from_headers(&headers), None);
        headers.insert(header::AUTHORIZATION, format!("Bearer {}", token).parse().unwrap());
        assert_eq!(jwt.user_id_from_headers(&headers), Some(42));
    }

    #[test]
    fn stored_account_overrides_token_claims() {
        let demoted = confirm_account(42, Some(user(UserType::Member))).unwrap();
        assert_eq!(demoted.role, UserType::Member);
        assert!(!demoted.is_admin());

        let mut inactive = user(UserType::Admin);
        inactive.active = false;
        let err = confirm_account(42, Some(inactive)).unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(ref m) if m == "Account is inactive"));

        let err = confirm_account(42, None).unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(ref m) if m == "Account not found"));
    }

    #[tokio::test]
    async fn password_hashes_verify() {
        let hash = hash_password("Secret123").await.unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("Secret123", &hash).await);
        assert!(!verify_password("secret123", &hash).await);
        assert!(!verify_password("Secret123", "not-a-hash").await);
    }
}
