use super::DbRepository;
use crate::DbError;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::FromRow;

/// Represents a row from the `monthly_reports` table.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct MonthlyReport {
    pub id: i64,
    /// Always the first day of the reported month.
    pub report_date: NaiveDate,
    pub total_attendees: i32,
    pub male_attendees: i32,
    pub female_attendees: i32,
    pub age_groups: Option<JsonValue>,
    pub narrative: Option<String>,
    pub challenges: Option<String>,
    pub created_by: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ReportRecord {
    pub report_date: NaiveDate,
    pub total_attendees: i32,
    pub male_attendees: i32,
    pub female_attendees: i32,
    pub age_groups: Option<JsonValue>,
    pub narrative: Option<String>,
    pub challenges: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportSummary {
    pub report_count: i64,
    pub total_attendees: i64,
    pub male_attendees: i64,
    pub female_attendees: i64,
}

impl DbRepository {
    /// Inserts the month's report, or overwrites it when one already exists.
    pub async fn upsert_report(&self, report: &ReportRecord, created_by: i64) -> Result<MonthlyReport, DbError> {
        sqlx::query_as::<_, MonthlyReport>(
            r#"
            INSERT INTO monthly_reports (report_date, total_attendees, male_attendees, female_attendees,
                                         age_groups, narrative, challenges, created_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (report_date) DO UPDATE SET
                total_attendees = EXCLUDED.total_attendees,
                male_attendees = EXCLUDED.male_attendees,
                female_attendees = EXCLUDED.female_attendees,
                age_groups = EXCLUDED.age_groups,
                narrative = EXCLUDED.narrative,
                challenges = EXCLUDED.challenges,
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(report.report_date)
        .bind(report.total_attendees)
        .bind(report.male_attendees)
        .bind(report.female_attendees)
        .bind(&report.age_groups)
        .bind(&report.narrative)
        .bind(&report.challenges)
        .bind(created_by)
        .fetch_one(&self.pool)
        .await
        .map_err(DbError::from_write)
    }

    pub async fn get_report(&self, id: i64) -> Result<MonthlyReport, DbError> {
        sqlx::query_as::<_, MonthlyReport>("SELECT * FROM monthly_reports WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(DbError::NotFound)
    }

    /// Reports newest first, optionally narrowed to a year and month.
    pub async fn list_reports(&self, year: Option<i32>, month: Option<i32>) -> Result<Vec<MonthlyReport>, DbError> {
        let reports = sqlx::query_as::<_, MonthlyReport>(
            r#"
            SELECT * FROM monthly_reports
            WHERE ($1::int IS NULL OR EXTRACT(YEAR FROM report_date)::int = $1)
              AND ($2::int IS NULL OR EXTRACT(MONTH FROM report_date)::int = $2)
            ORDER BY report_date DESC
            "#,
        )
        .bind(year)
        .bind(month)
        .fetch_all(&self.pool)
        .await?;
        Ok(reports)
    }

    /// Replaces a report's contents. Moving it onto a month that already has
    /// a report yields `DbError::Conflict`.
    pub async fn update_report(&self, id: i64, report: &ReportRecord) -> Result<MonthlyReport, DbError> {
        sqlx::query_as::<_, MonthlyReport>(
            r#"
            UPDATE monthly_reports SET
                report_date = $2, total_attendees = $3, male_attendees = $4, female_attendees = $5,
                age_groups = $6, narrative = $7, challenges = $8, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(report.report_date)
        .bind(report.total_attendees)
        .bind(report.male_attendees)
        .bind(report.female_attendees)
        .bind(&report.age_groups)
        .bind(&report.narrative)
        .bind(&report.challenges)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::from_write)?
        .ok_or(DbError::NotFound)
    }

    pub async fn delete_report(&self, id: i64) -> Result<(), DbError> {
        let result = sqlx::query("DELETE FROM monthly_reports WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    pub async fn report_summary(&self, year: Option<i32>, month: Option<i32>) -> Result<ReportSummary, DbError> {
        let (report_count, total_attendees, male_attendees, female_attendees): (i64, i64, i64, i64) =
            sqlx::query_as(
                r#"
                SELECT COUNT(*),
                       COALESCE(SUM(total_attendees), 0)::bigint,
                       COALESCE(SUM(male_attendees), 0)::bigint,
                       COALESCE(SUM(female_attendees), 0)::bigint
                FROM monthly_reports
                WHERE ($1::int IS NULL OR EXTRACT(YEAR FROM report_date)::int = $1)
                  AND ($2::int IS NULL OR EXTRACT(MONTH FROM report_date)::int = $2)
                "#,
            )
            .bind(year)
            .bind(month)
            .fetch_one(&self.pool)
            .await?;

        Ok(ReportSummary {
            report_count,
            total_attendees,
            male_attendees,
            female_attendees,
        })
    }
}
