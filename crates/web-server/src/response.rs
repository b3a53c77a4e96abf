//! The uniform JSON envelope every API response is wrapped in.
//!
//! Success: `{success: true, status_code, message, timestamp, data}`
//! Error:   `{success: false, status_code, message, timestamp, errors?}`

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Serialize)]
pub struct SuccessBody<T: Serialize> {
    pub success: bool,
    pub status_code: u16,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub data: T,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub status_code: u16,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Value>,
}

impl ErrorBody {
    pub fn new(status: StatusCode, message: impl Into<String>, errors: Option<Value>) -> Self {
        Self {
            success: false,
            status_code: status.as_u16(),
            message: message.into(),
            timestamp: Utc::now(),
            errors,
        }
    }
}

/// A successful response. Handlers return `Result<ApiResponse<T>, AppError>`.
#[derive(Debug)]
pub struct ApiResponse<T: Serialize> {
    status: StatusCode,
    message: String,
    data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self::with_message(data, "Success")
    }

    pub fn with_message(data: T, message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::OK,
            message: message.into(),
            data,
        }
    }

    /// 201 Created.
    pub fn created(data: T, message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::CREATED,
            message: message.into(),
            data,
        }
    }
}

impl ApiResponse<()> {
    /// A deletion acknowledgement; `data` is `null`.
    pub fn deleted(message: impl Into<String>) -> Self {
        Self::with_message((), message)
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let body = SuccessBody {
            success: true,
            status_code: self.status.as_u16(),
            message: self.message,
            timestamp: Utc::now(),
            data: self.data,
        };
        (self.status, Json(body)).into_response()
    }
}

/// Paging metadata returned alongside list results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub page: i64,
    pub per_page: i64,
    pub total: i64,
    pub total_pages: i64,
}

impl Pagination {
    pub fn new(page: i64, per_page: i64, total: i64) -> Self {
        let total_pages = if per_page > 0 {
            (total + per_page - 1) / per_page
        } else {
            0
        };
        Self {
            page,
            per_page,
            total,
            total_pages,
        }
    }
}

/// `{items, pagination}`.
#[derive(Debug, Serialize)]
pub struct Paginated<T: Serialize> {
    pub items: Vec<T>,
    pub pagination: Pagination,
}

impl<T: Serialize> Paginated<T> {
    pub fn new(items: Vec<T>, page: i64, per_page: i64, total: i64) -> Self {
        Self {
            items,
            pagination: Pagination::new(page, per_page, total),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use serde_json::json;

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn success_envelope_shape() {
        let response = ApiResponse::created(json!({"course_id": 7}), "Course created successfully")
            .into_response();
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = body_json(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["status_code"], 201);
        assert_eq!(body["message"], "Course created successfully");
        assert_eq!(body["data"]["course_id"], 7);
        let timestamp = body["timestamp"].as_str().unwrap();
        assert!(DateTime::parse_from_rfc3339(timestamp).is_ok());
    }

    #[tokio::test]
    async fn deleted_has_null_data() {
        let body = body_json(ApiResponse::deleted("Lesson deleted successfully").into_response()).await;
        assert_eq!(body["status_code"], 200);
        assert!(body["data"].is_null());
        assert!(body.as_object().unwrap().contains_key("data"));
    }

    #[test]
    fn error_body_omits_missing_errors() {
        let body = serde_json::to_value(ErrorBody::new(StatusCode::NOT_FOUND, "Course not found", None))
            .unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["status_code"], 404);
        assert!(!body.as_object().unwrap().contains_key("errors"));
    }

    #[test]
    fn total_pages_rounds_up() {
        assert_eq!(Pagination::new(1, 20, 0).total_pages, 0);
        assert_eq!(Pagination::new(1, 20, 20).total_pages, 1);
        assert_eq!(Pagination::new(2, 20, 41).total_pages, 3);
        assert_eq!(Pagination::new(1, 0, 41).total_pages, 0);
    }

    #[test]
    fn paginated_wraps_items() {
        let page = serde_json::to_value(Paginated::new(vec![1, 2], 1, 2, 5)).unwrap();
        assert_eq!(page["items"], json!([1, 2]));
        assert_eq!(page["pagination"]["total_pages"], 3);
    }
}
