use crate::{
    auth::{CurrentUser, StaffUser},
    error::AppError,
    extract::{ApiQuery, Payload},
    handlers::{parse_filter, OrNotFound},
    response::ApiResponse,
    AppState,
};
use axum::extract::State;
use chrono::{Duration, NaiveDate, Utc};
use core_types::{
    attendance::{duration_minutes, format_duration},
    validation::{clean, parse_iso_date},
    SignInMethod,
};
use database::{AttendanceRecord, AttendanceStats, CurrentAttendee, DbError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const DEFAULT_STATS_DAYS: i64 = 30;
const DEFAULT_HISTORY_LIMIT: i64 = 30;
const MAX_HISTORY_LIMIT: i64 = 365;

#[derive(Debug, Default, Deserialize)]
pub struct SignInRequest {
    pub user_id: Option<i64>,
    pub method: Option<String>,
    pub location: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SignOutRequest {
    pub user_id: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct SignedOut {
    #[serde(flatten)]
    pub record: AttendanceRecord,
    pub duration: String,
}

#[derive(Debug, Serialize)]
pub struct CurrentAttendance {
    pub attendees: Vec<CurrentAttendee>,
    pub count: usize,
}

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    pub from: Option<String>,
    pub to: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
}

/// Staff may act on behalf of another user; everyone else acts as themselves.
fn target_user(caller: &CurrentUser, requested: Option<i64>) -> Result<i64, AppError> {
    match requested {
        Some(id) if id != caller.id => {
            if caller.is_staff() {
                Ok(id)
            } else {
                Err(AppError::Forbidden("Staff access required".to_string()))
            }
        }
        _ => Ok(caller.id),
    }
}

/// Resolves the stats window, defaulting to the trailing thirty days.
fn stats_window(query: &StatsQuery, today: NaiveDate) -> Result<(NaiveDate, NaiveDate), AppError> {
    let parse = |field: &str, value: &Option<String>| -> Result<Option<NaiveDate>, AppError> {
        match value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
            Some(raw) => parse_iso_date(raw)
                .map(Some)
                .ok_or_else(|| AppError::field(field, format!("The {} date must use YYYY-MM-DD", field))),
            None => Ok(None),
        }
    };
    let to = parse("to", &query.to)?.unwrap_or(today);
    let from = parse("from", &query.from)?.unwrap_or(to - Duration::days(DEFAULT_STATS_DAYS));
    if from > to {
        return Err(AppError::BadRequest(
            "The from date must be on or before the to date".to_string(),
        ));
    }
    Ok((from, to))
}

/// # POST /api/v1/attendance/signin
pub async fn sign_in(
    State(state): State<Arc<AppState>>,
    caller: CurrentUser,
    Payload(req): Payload<SignInRequest>,
) -> Result<ApiResponse<AttendanceRecord>, AppError> {
    let user_id = target_user(&caller, req.user_id)?;
    let method: SignInMethod = parse_filter(req.method.as_deref())?.unwrap_or_default();

    let user = state.db_repo.get_user(user_id).await.or_not_found("User not found")?;
    if !user.active {
        return Err(AppError::NotFound("User not found".to_string()));
    }

    let location = clean(req.location);
    let notes = clean(req.notes);
    let record = match state
        .db_repo
        .sign_in(user_id, method, location.as_deref(), notes.as_deref())
        .await
    {
        Ok(record) => record,
        Err(DbError::Conflict(_)) => {
            return Err(AppError::Conflict(
                "You are already signed in for today".to_string(),
            ));
        }
        Err(e) => return Err(e.into()),
    };
    tracing::info!(user_id, recorded_by = caller.id, method = %method, "User signed in");
    Ok(ApiResponse::created(record, "Signed in successfully"))
}

/// # POST /api/v1/attendance/signout
pub async fn sign_out(
    State(state): State<Arc<AppState>>,
    caller: CurrentUser,
    Payload(req): Payload<SignOutRequest>,
) -> Result<ApiResponse<SignedOut>, AppError> {
    let user_id = target_user(&caller, req.user_id)?;
    let open = state
        .db_repo
        .todays_attendance(user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("No sign-in record found for today".to_string()))?;
    if open.signed_out_at.is_some() {
        return Err(AppError::Conflict(
            "You are already signed out for today".to_string(),
        ));
    }

    let now = Utc::now();
    let minutes = duration_minutes(open.signed_in_at, now);
    let record = match state.db_repo.sign_out(open.id, now, minutes).await {
        Ok(record) => record,
        Err(DbError::Conflict(_)) => {
            return Err(AppError::Conflict(
                "You are already signed out for today".to_string(),
            ));
        }
        Err(e) => return Err(e.into()),
    };
    tracing::info!(user_id, recorded_by = caller.id, minutes, "User signed out");
    Ok(ApiResponse::with_message(
        SignedOut {
            record,
            duration: format_duration(minutes),
        },
        "Signed out successfully",
    ))
}

/// # GET /api/v1/attendance/current
pub async fn current(
    State(state): State<Arc<AppState>>,
    _staff: StaffUser,
) -> Result<ApiResponse<CurrentAttendance>, AppError> {
    let attendees = state.db_repo.current_attendance().await?;
    Ok(ApiResponse::with_message(
        CurrentAttendance {
            count: attendees.len(),
            attendees,
        },
        "Current attendance retrieved successfully",
    ))
}

/// # GET /api/v1/attendance/stats
pub async fn stats(
    State(state): State<Arc<AppState>>,
    _staff: StaffUser,
    ApiQuery(query): ApiQuery<StatsQuery>,
) -> Result<ApiResponse<AttendanceStats>, AppError> {
    let today = state.db_repo.current_date().await?;
    let (from, to) = stats_window(&query, today)?;
    let stats = state.db_repo.attendance_stats(from, to).await?;
    Ok(ApiResponse::with_message(stats, "Attendance statistics retrieved successfully"))
}

/// # GET /api/v1/users/me/attendance
pub async fn my_history(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    ApiQuery(query): ApiQuery<HistoryQuery>,
) -> Result<ApiResponse<Vec<AttendanceRecord>>, AppError> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, MAX_HISTORY_LIMIT);
    let records = state.db_repo.user_attendance_history(user.id, limit).await?;
    Ok(ApiResponse::with_message(records, "Attendance history retrieved successfully"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::UserType;

    fn caller(role: UserType) -> CurrentUser {
        CurrentUser {
            id: 7,
            username: "thandi".into(),
            role,
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn members_only_act_for_themselves() {
        let member = caller(UserType::Member);
        assert_eq!(target_user(&member, None).unwrap(), 7);
        assert_eq!(target_user(&member, Some(7)).unwrap(), 7);
        let err = target_user(&member, Some(8)).unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::FORBIDDEN);

        assert_eq!(target_user(&caller(UserType::Mentor), Some(8)).unwrap(), 8);
        assert_eq!(target_user(&caller(UserType::Admin), Some(8)).unwrap(), 8);
    }

    #[test]
    fn stats_window_defaults_to_last_thirty_days() {
        let today = date(2026, 3, 31);
        let query = StatsQuery { from: None, to: None };
        assert_eq!(stats_window(&query, today).unwrap(), (date(2026, 3, 1), today));

        let query = StatsQuery {
            from: Some("2026-01-01".into()),
            to: Some(" ".into()),
        };
        assert_eq!(stats_window(&query, today).unwrap(), (date(2026, 1, 1), today));
    }

    #[test]
    fn stats_window_rejects_bad_ranges() {
        let today = date(2026, 3, 31);
        let query = StatsQuery {
            from: Some("01/03/2026".into()),
            to: None,
        };
        assert_eq!(
            stats_window(&query, today).unwrap_err().status(),
            axum::http::StatusCode::UNPROCESSABLE_ENTITY
        );

        let query = StatsQuery {
            from: Some("2026-04-01".into()),
            to: Some("2026-03-01".into()),
        };
        assert_eq!(
            stats_window(&query, today).unwrap_err().status(),
            axum::http::StatusCode::BAD_REQUEST
        );
    }
}
