use crate::response::ErrorBody;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use core_types::{CoreError, ValidationErrors};
use database::DbError;
use serde_json::{json, Value};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] DbError),
    #[error("Configuration error: {0}")]
    Config(#[from] configuration::error::ConfigError),
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationErrors),
    /// 422 with a specific message and optional details.
    #[error("Unprocessable: {message}")]
    Unprocessable { message: String, errors: Option<Value> },
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Request body too large")]
    PayloadTooLarge,
    #[error("Service unavailable: {0}")]
    Unavailable(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn unprocessable(message: impl Into<String>) -> Self {
        AppError::Unprocessable {
            message: message.into(),
            errors: None,
        }
    }

    /// 422 carrying a single field error.
    pub fn field(field: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        AppError::Unprocessable {
            errors: Some(json!({ field: [message.clone()] })),
            message,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Database(DbError::NotFound) | AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Database(DbError::Conflict(_)) | AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Database(_) | AppError::Config(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::Validation(_) | AppError::Unprocessable { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

/// Business rule violations are client errors; unknown enum values and bad
/// field input surface as validation failures.
impl From<CoreError> for AppError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Rule(message) => AppError::BadRequest(message),
            CoreError::UnknownVariant { .. } => AppError::BadRequest(err.to_string()),
            CoreError::InvalidInput(field, message) => AppError::field(&field, message),
            CoreError::Calculation(message) => AppError::Internal(message),
        }
    }
}

/// Converts our custom `AppError` into an enveloped HTTP response.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (message, errors) = match self {
            AppError::Database(DbError::NotFound) => ("Resource not found".to_string(), None),
            AppError::Database(DbError::Conflict(constraint)) => {
                tracing::debug!(%constraint, "Unique constraint rejected write.");
                ("Resource already exists".to_string(), None)
            }
            AppError::Database(db_err) => {
                tracing::error!(error = ?db_err, "Database error.");
                ("An internal database error occurred".to_string(), None)
            }
            AppError::Config(config_err) => {
                tracing::error!(error = ?config_err, "Configuration error.");
                ("A server configuration error occurred".to_string(), None)
            }
            AppError::Internal(detail) => {
                tracing::error!(%detail, "Internal error.");
                ("An internal server error occurred".to_string(), None)
            }
            AppError::Validation(errors) => (
                "Validation failed".to_string(),
                serde_json::to_value(errors).ok(),
            ),
            AppError::Unprocessable { message, errors } => (message, errors),
            AppError::PayloadTooLarge => ("Request body too large".to_string(), None),
            AppError::BadRequest(message)
            | AppError::Unauthorized(message)
            | AppError::Forbidden(message)
            | AppError::NotFound(message)
            | AppError::Conflict(message)
            | AppError::Unavailable(message) => (message, None),
        };

        (status, Json(ErrorBody::new(status, message, errors))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn render(err: AppError) -> (StatusCode, Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn validation_errors_render_field_map() {
        let mut errors = ValidationErrors::new();
        errors.add("email", "The Email field is required.");
        let (status, body) = render(AppError::Validation(errors)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["message"], "Validation failed");
        assert_eq!(body["errors"]["email"][0], "The Email field is required.");
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn database_failures_hide_details() {
        let (status, body) = render(AppError::Database(DbError::ConnectionConfigError(
            "secret detail".into(),
        )))
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["message"], "An internal database error occurred");
        assert!(body.get("errors").is_none());
    }

    #[tokio::test]
    async fn database_not_found_and_conflict() {
        let (status, _) = render(AppError::Database(DbError::NotFound)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, body) = render(AppError::Database(DbError::Conflict("users_email_key".into()))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["message"], "Resource already exists");
    }

    #[tokio::test]
    async fn core_rules_become_bad_requests() {
        let err: AppError = CoreError::Rule("End date must be after start date".into()).into();
        let (status, body) = render(err).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "End date must be after start date");
    }

    #[tokio::test]
    async fn field_error_carries_message_and_map() {
        let (status, body) = render(AppError::field("email", "Email already exists")).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["message"], "Email already exists");
        assert_eq!(body["errors"]["email"][0], "Email already exists");
    }
}
