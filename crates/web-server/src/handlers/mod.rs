//! Route handlers, one module per resource.

pub mod api_logs;
pub mod attendance;
pub mod auth;
pub mod courses;
pub mod enrollments;
pub mod health;
pub mod lessons;
pub mod programs;
pub mod reports;
pub mod users;

use crate::error::AppError;
use core_types::CoreError;
use database::{DbError, PageRequest};
use std::str::FromStr;

const DEFAULT_PER_PAGE: i64 = 20;

/// Builds the page window from optional `page` / `per_page` parameters.
pub(crate) fn page_request(page: Option<i64>, per_page: Option<i64>) -> PageRequest {
    PageRequest::new(page.unwrap_or(1), per_page.unwrap_or(DEFAULT_PER_PAGE))
}

/// Parses an optional enum filter. Blank values mean "no filter".
pub(crate) fn parse_filter<T>(value: Option<&str>) -> Result<Option<T>, AppError>
where
    T: FromStr<Err = CoreError>,
{
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(v) => Ok(Some(v.parse()?)),
        None => Ok(None),
    }
}

/// Turns a missing row into a 404 carrying a resource specific message.
pub(crate) trait OrNotFound<T> {
    fn or_not_found(self, message: &str) -> Result<T, AppError>;
}

impl<T> OrNotFound<T> for Result<T, DbError> {
    fn or_not_found(self, message: &str) -> Result<T, AppError> {
        self.map_err(|e| match e {
            DbError::NotFound => AppError::NotFound(message.to_string()),
            other => AppError::Database(other),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use core_types::CourseStatus;

    #[test]
    fn filters_parse_or_reject() {
        assert_eq!(parse_filter::<CourseStatus>(None).unwrap(), None);
        assert_eq!(parse_filter::<CourseStatus>(Some("  ")).unwrap(), None);
        assert_eq!(
            parse_filter::<CourseStatus>(Some("Active")).unwrap(),
            Some(CourseStatus::Active)
        );
        let err = parse_filter::<CourseStatus>(Some("live")).unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn missing_rows_get_specific_messages() {
        let err = Err::<(), _>(DbError::NotFound).or_not_found("Course not found").unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.to_string(), "Not found: Course not found");

        let err = Err::<(), _>(DbError::Conflict("x".into())).or_not_found("Course not found").unwrap_err();
        assert_eq!(err.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn page_defaults() {
        assert_eq!(page_request(None, None), PageRequest::new(1, 20));
        assert_eq!(page_request(Some(3), Some(500)).per_page, PageRequest::MAX_PER_PAGE);
    }
}
