use super::DbRepository;
use crate::DbError;
use chrono::{DateTime, NaiveDate, Utc};
use core_types::{AttendanceStatus, SignInMethod};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Represents a row from the `attendance` table. One row per user per day.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub id: i64,
    pub user_id: i64,
    pub attendance_date: NaiveDate,
    pub signed_in_at: DateTime<Utc>,
    pub signed_out_at: Option<DateTime<Utc>>,
    pub status: AttendanceStatus,
    pub method: SignInMethod,
    pub location: Option<String>,
    pub notes: Option<String>,
    pub duration_minutes: Option<i32>,
}

/// Someone currently in the building.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct CurrentAttendee {
    pub attendance_id: i64,
    pub user_id: i64,
    pub username: String,
    pub name: String,
    pub surname: String,
    pub user_type: String,
    pub signed_in_at: DateTime<Utc>,
    pub method: SignInMethod,
    pub location: Option<String>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DailyAttendance {
    pub attendance_date: NaiveDate,
    pub sign_ins: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttendanceStats {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub total_records: i64,
    pub unique_users: i64,
    pub signed_out_count: i64,
    pub avg_duration_minutes: f64,
    pub daily: Vec<DailyAttendance>,
}

impl DbRepository {
    /// Opens today's attendance record. Returns `DbError::Conflict` when the
    /// user already signed in today.
    pub async fn sign_in(
        &self,
        user_id: i64,
        method: SignInMethod,
        location: Option<&str>,
        notes: Option<&str>,
    ) -> Result<AttendanceRecord, DbError> {
        sqlx::query_as::<_, AttendanceRecord>(
            r#"
            INSERT INTO attendance (user_id, method, location, notes)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id, attendance_date) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(method)
        .bind(location)
        .bind(notes)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::Conflict("attendance_user_id_attendance_date_key".to_string()))
    }

    /// The database's `CURRENT_DATE`. Attendance days are assigned by the
    /// database, so date windows are anchored on the same clock.
    pub async fn current_date(&self) -> Result<NaiveDate, DbError> {
        let today = sqlx::query_scalar::<_, NaiveDate>("SELECT CURRENT_DATE")
            .fetch_one(&self.pool)
            .await?;
        Ok(today)
    }

    pub async fn todays_attendance(&self, user_id: i64) -> Result<Option<AttendanceRecord>, DbError> {
        let record = sqlx::query_as::<_, AttendanceRecord>(
            "SELECT * FROM attendance WHERE user_id = $1 AND attendance_date = CURRENT_DATE",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    /// Closes an open record. A record that was closed concurrently yields
    /// `DbError::Conflict`.
    pub async fn sign_out(
        &self,
        attendance_id: i64,
        signed_out_at: DateTime<Utc>,
        duration_minutes: i32,
    ) -> Result<AttendanceRecord, DbError> {
        sqlx::query_as::<_, AttendanceRecord>(
            r#"
            UPDATE attendance
            SET signed_out_at = $2, duration_minutes = $3, status = 'signed_out'
            WHERE id = $1 AND signed_out_at IS NULL
            RETURNING *
            "#,
        )
        .bind(attendance_id)
        .bind(signed_out_at)
        .bind(duration_minutes)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::Conflict("attendance already closed".to_string()))
    }

    pub async fn current_attendance(&self) -> Result<Vec<CurrentAttendee>, DbError> {
        let rows = sqlx::query_as::<_, CurrentAttendee>(
            r#"
            SELECT a.id AS attendance_id, u.id AS user_id, u.username, u.name, u.surname, u.user_type,
                   a.signed_in_at, a.method, a.location
            FROM attendance a
            JOIN users u ON u.id = a.user_id
            WHERE a.attendance_date = CURRENT_DATE AND a.signed_out_at IS NULL
            ORDER BY a.signed_in_at
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn attendance_stats(&self, from: NaiveDate, to: NaiveDate) -> Result<AttendanceStats, DbError> {
        let (total_records, unique_users, signed_out_count, avg_duration_minutes): (i64, i64, i64, f64) =
            sqlx::query_as(
                r#"
                SELECT COUNT(*),
                       COUNT(DISTINCT user_id),
                       COUNT(*) FILTER (WHERE signed_out_at IS NOT NULL),
                       COALESCE(ROUND(AVG(duration_minutes), 2), 0)::float8
                FROM attendance
                WHERE attendance_date BETWEEN $1 AND $2
                "#,
            )
            .bind(from)
            .bind(to)
            .fetch_one(&self.pool)
            .await?;

        let daily = sqlx::query_as::<_, DailyAttendance>(
            r#"
            SELECT attendance_date, COUNT(*) AS sign_ins
            FROM attendance
            WHERE attendance_date BETWEEN $1 AND $2
            GROUP BY attendance_date
            ORDER BY attendance_date
            "#,
        )
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        Ok(AttendanceStats {
            from,
            to,
            total_records,
            unique_users,
            signed_out_count,
            avg_duration_minutes,
            daily,
        })
    }

    pub async fn user_attendance_history(
        &self,
        user_id: i64,
        limit: i64,
    ) -> Result<Vec<AttendanceRecord>, DbError> {
        let rows = sqlx::query_as::<_, AttendanceRecord>(
            "SELECT * FROM attendance WHERE user_id = $1 ORDER BY attendance_date DESC LIMIT $2",
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
