use crate::{
    auth::AdminUser,
    error::AppError,
    extract::{flag, ApiQuery},
    response::ApiResponse,
    AppState,
};
use axum::extract::State;
use core_types::validation::clean;
use database::{ApiLogFilter, ApiPerformanceStats, ApiRequestLog};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const DEFAULT_LIMIT: i64 = 100;
const MAX_LIMIT: i64 = 1000;
const DEFAULT_HOURS: i32 = 24;
const MAX_HOURS: i32 = 24 * 90;

#[derive(Debug, Default, Deserialize)]
pub struct ApiLogQuery {
    pub limit: Option<i64>,
    #[serde(default, deserialize_with = "flag::option")]
    pub is_error: Option<bool>,
    pub method: Option<String>,
    pub status_code: Option<i32>,
}

impl ApiLogQuery {
    fn limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
    }

    fn into_filter(self) -> ApiLogFilter {
        ApiLogFilter {
            is_error: self.is_error,
            method: clean(self.method).map(|m| m.to_ascii_uppercase()),
            status_code: self.status_code,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ApiLogList {
    pub logs: Vec<ApiRequestLog>,
    pub count: usize,
    pub limit: i64,
}

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    pub hours: Option<i32>,
}

/// # GET /api/v1/admin/api-logs
pub async fn list_logs(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    ApiQuery(query): ApiQuery<ApiLogQuery>,
) -> Result<ApiResponse<ApiLogList>, AppError> {
    let limit = query.limit();
    let filter = query.into_filter();
    let logs = state.db_repo.recent_api_logs(&filter, limit).await?;
    Ok(ApiResponse::with_message(
        ApiLogList {
            count: logs.len(),
            logs,
            limit,
        },
        "API logs retrieved successfully",
    ))
}

/// # GET /api/v1/admin/api-logs/stats
pub async fn stats(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    ApiQuery(query): ApiQuery<StatsQuery>,
) -> Result<ApiResponse<ApiPerformanceStats>, AppError> {
    let hours = query.hours.unwrap_or(DEFAULT_HOURS).clamp(1, MAX_HOURS);
    let stats = state.db_repo.api_performance_stats(hours).await?;
    Ok(ApiResponse::with_message(stats, "API statistics retrieved successfully"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_is_clamped() {
        assert_eq!(ApiLogQuery::default().limit(), 100);
        let query = ApiLogQuery {
            limit: Some(5000),
            ..ApiLogQuery::default()
        };
        assert_eq!(query.limit(), 1000);
        let query = ApiLogQuery {
            limit: Some(0),
            ..ApiLogQuery::default()
        };
        assert_eq!(query.limit(), 1);
    }

    #[test]
    fn filter_normalises_method() {
        let filter = ApiLogQuery {
            method: Some(" post ".into()),
            is_error: Some(true),
            ..ApiLogQuery::default()
        }
        .into_filter();
        assert_eq!(filter.method.as_deref(), Some("POST"));
        assert_eq!(filter.is_error, Some(true));

        let filter = ApiLogQuery {
            method: Some("".into()),
            ..ApiLogQuery::default()
        }
        .into_filter();
        assert!(filter.method.is_none());
    }
}
