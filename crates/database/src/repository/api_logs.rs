use super::DbRepository;
use crate::DbError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::FromRow;

/// A captured request/response pair waiting to be written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewApiLog {
    pub method: String,
    pub uri: String,
    pub path: String,
    pub query_string: Option<String>,
    pub user_agent: Option<String>,
    pub ip_address: String,
    pub user_id: Option<i64>,
    pub headers: Option<JsonValue>,
    pub body: Option<String>,
    pub query_params: Option<JsonValue>,
    pub status_code: i32,
    pub response_body: Option<String>,
    pub duration_ms: Decimal,
    pub is_error: bool,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Represents a row from the `api_request_logs` table.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ApiRequestLog {
    pub id: i64,
    pub method: String,
    pub uri: String,
    pub path: String,
    pub query_string: Option<String>,
    pub user_agent: Option<String>,
    pub ip_address: String,
    pub user_id: Option<i64>,
    pub headers: Option<JsonValue>,
    pub body: Option<String>,
    pub query_params: Option<JsonValue>,
    pub status_code: i32,
    pub response_body: Option<String>,
    pub duration_ms: Decimal,
    pub is_error: bool,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct ApiLogFilter {
    pub is_error: Option<bool>,
    pub method: Option<String>,
    pub status_code: Option<i32>,
}

/// Request volume and latency over a trailing window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiPerformanceStats {
    pub hours: i32,
    pub total_requests: i64,
    pub avg_duration_ms: f64,
    pub min_duration_ms: f64,
    pub max_duration_ms: f64,
    pub error_count: i64,
    pub success_count: i64,
    /// Share of requests that failed, as a percentage with two decimals.
    pub error_rate: f64,
}

impl ApiPerformanceStats {
    pub fn error_rate(error_count: i64, total_requests: i64) -> f64 {
        if total_requests == 0 {
            return 0.0;
        }
        let rate = error_count as f64 / total_requests as f64 * 100.0;
        (rate * 100.0).round() / 100.0
    }
}

impl DbRepository {
    pub async fn insert_api_log(&self, log: &NewApiLog) -> Result<i64, DbError> {
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO api_request_logs (method, uri, path, query_string, user_agent, ip_address, user_id,
                                          headers, body, query_params, status_code, response_body,
                                          duration_ms, is_error, error_message, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            RETURNING id
            "#,
        )
        .bind(&log.method)
        .bind(&log.uri)
        .bind(&log.path)
        .bind(&log.query_string)
        .bind(&log.user_agent)
        .bind(&log.ip_address)
        .bind(log.user_id)
        .bind(&log.headers)
        .bind(&log.body)
        .bind(&log.query_params)
        .bind(log.status_code)
        .bind(&log.response_body)
        .bind(log.duration_ms)
        .bind(log.is_error)
        .bind(&log.error_message)
        .bind(log.created_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    pub async fn recent_api_logs(&self, filter: &ApiLogFilter, limit: i64) -> Result<Vec<ApiRequestLog>, DbError> {
        let logs = sqlx::query_as::<_, ApiRequestLog>(
            r#"
            SELECT * FROM api_request_logs
            WHERE ($1::boolean IS NULL OR is_error = $1)
              AND ($2::text IS NULL OR method = UPPER($2))
              AND ($3::int IS NULL OR status_code = $3)
            ORDER BY created_at DESC, id DESC
            LIMIT $4
            "#,
        )
        .bind(filter.is_error)
        .bind(&filter.method)
        .bind(filter.status_code)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(logs)
    }

    pub async fn api_performance_stats(&self, hours: i32) -> Result<ApiPerformanceStats, DbError> {
        let (total_requests, avg, min, max, error_count, success_count): (i64, f64, f64, f64, i64, i64) =
            sqlx::query_as(
                r#"
                SELECT COUNT(*),
                       COALESCE(ROUND(AVG(duration_ms), 2), 0)::float8,
                       COALESCE(MIN(duration_ms), 0)::float8,
                       COALESCE(MAX(duration_ms), 0)::float8,
                       COUNT(*) FILTER (WHERE is_error),
                       COUNT(*) FILTER (WHERE NOT is_error)
                FROM api_request_logs
                WHERE created_at >= NOW() - make_interval(hours => $1)
                "#,
            )
            .bind(hours)
            .fetch_one(&self.pool)
            .await?;

        Ok(ApiPerformanceStats {
            hours,
            total_requests,
            avg_duration_ms: avg,
            min_duration_ms: min,
            max_duration_ms: max,
            error_count,
            success_count,
            error_rate: ApiPerformanceStats::error_rate(error_count, total_requests),
        })
    }

    /// Deletes log entries older than the retention window and returns how
    /// many were removed.
    pub async fn prune_api_logs(&self, retention_days: i64) -> Result<u64, DbError> {
        let result = sqlx::query(
            "DELETE FROM api_request_logs WHERE created_at < NOW() - make_interval(days => $1)",
        )
        .bind(i32::try_from(retention_days).unwrap_or(i32::MAX))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_rate_is_a_rounded_percentage() {
        assert_eq!(ApiPerformanceStats::error_rate(0, 0), 0.0);
        assert_eq!(ApiPerformanceStats::error_rate(1, 3), 33.33);
        assert_eq!(ApiPerformanceStats::error_rate(5, 5), 100.0);
    }
}
