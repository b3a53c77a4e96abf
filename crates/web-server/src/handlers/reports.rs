use crate::{
    auth::AdminUser,
    error::AppError,
    extract::{parse_id, ApiQuery, Payload},
    handlers::OrNotFound,
    response::ApiResponse,
    AppState,
};
use axum::extract::{Path, State};
use chrono::{Datelike, Utc};
use core_types::{
    report::{period_label, report_date, MAX_ATTENDEES},
    validation::clean,
    Validator,
};
use database::{DbError, MonthlyReport, ReportRecord, ReportSummary};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct ReportQuery {
    pub year: Option<i32>,
    pub month: Option<i32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReportRequest {
    pub report_month: Option<i64>,
    pub report_year: Option<i64>,
    pub total_attendees: Option<i64>,
    pub male_attendees: Option<i64>,
    pub female_attendees: Option<i64>,
    pub age_groups: Option<Value>,
    pub narrative: Option<String>,
    pub challenges: Option<String>,
}

impl ReportRequest {
    fn check_ranges(&self, v: &mut Validator) {
        v.between("report_month", self.report_month, 1, 12)
            .between("report_year", self.report_year, 2000, 2100)
            .between("total_attendees", self.total_attendees, 0, MAX_ATTENDEES)
            .between("male_attendees", self.male_attendees, 0, MAX_ATTENDEES)
            .between("female_attendees", self.female_attendees, 0, MAX_ATTENDEES);
        if matches!(&self.age_groups, Some(groups) if !groups.is_object() && !groups.is_null()) {
            v.add("age_groups", "The Age Groups field must be an object.");
        }
    }

    /// Builds the record for a new submission. Year defaults to the current one.
    fn into_record(self, current_year: i32) -> Result<ReportRecord, AppError> {
        let mut v = Validator::new();
        v.present("report_month", self.report_month)
            .present("total_attendees", self.total_attendees);
        self.check_ranges(&mut v);
        v.finish()?;

        let year = self.report_year.map_or(current_year, |y| y as i32);
        let month = self.report_month.unwrap_or_default() as u32;
        Ok(ReportRecord {
            report_date: report_date(year, month)?,
            total_attendees: self.total_attendees.unwrap_or_default() as i32,
            male_attendees: self.male_attendees.unwrap_or(0) as i32,
            female_attendees: self.female_attendees.unwrap_or(0) as i32,
            age_groups: self.age_groups.filter(|g| !g.is_null()),
            narrative: clean(self.narrative),
            challenges: clean(self.challenges),
        })
    }

    fn merge_into(self, existing: MonthlyReport) -> Result<ReportRecord, AppError> {
        let mut v = Validator::new();
        self.check_ranges(&mut v);
        v.finish()?;

        let year = self
            .report_year
            .map_or(existing.report_date.year(), |y| y as i32);
        let month = self
            .report_month
            .map_or(existing.report_date.month(), |m| m as u32);
        Ok(ReportRecord {
            report_date: report_date(year, month)?,
            total_attendees: self.total_attendees.map_or(existing.total_attendees, |n| n as i32),
            male_attendees: self.male_attendees.map_or(existing.male_attendees, |n| n as i32),
            female_attendees: self
                .female_attendees
                .map_or(existing.female_attendees, |n| n as i32),
            age_groups: match self.age_groups {
                Some(Value::Null) => None,
                Some(groups) => Some(groups),
                None => existing.age_groups,
            },
            narrative: match self.narrative {
                Some(text) => clean(Some(text)),
                None => existing.narrative,
            },
            challenges: match self.challenges {
                Some(text) => clean(Some(text)),
                None => existing.challenges,
            },
        })
    }
}

#[derive(Debug, Serialize)]
pub struct SummaryReport {
    pub period: Option<String>,
    pub year: Option<i32>,
    pub month: Option<i32>,
    #[serde(flatten)]
    pub summary: ReportSummary,
}

/// `January 2026`, `2026`, or nothing when no year is given.
fn summary_period(year: Option<i32>, month: Option<i32>) -> Option<String> {
    match (year, month) {
        (Some(y), Some(m)) => u32::try_from(m).ok().and_then(|m| period_label(y, m)),
        (Some(y), None) => Some(y.to_string()),
        _ => None,
    }
}

fn check_month(month: Option<i32>) -> Result<(), AppError> {
    if matches!(month, Some(m) if !(1..=12).contains(&m)) {
        return Err(AppError::field("month", "The Month field must be between 1 and 12."));
    }
    Ok(())
}

/// # GET /api/v1/admin/reports
pub async fn list_reports(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    ApiQuery(query): ApiQuery<ReportQuery>,
) -> Result<ApiResponse<Vec<MonthlyReport>>, AppError> {
    check_month(query.month)?;
    let reports = state.db_repo.list_reports(query.year, query.month).await?;
    Ok(ApiResponse::with_message(reports, "Reports retrieved successfully"))
}

/// # POST /api/v1/admin/reports
/// A second submission for the same month replaces the first.
pub async fn create_report(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Payload(req): Payload<ReportRequest>,
) -> Result<ApiResponse<MonthlyReport>, AppError> {
    let record = req.into_record(Utc::now().year())?;
    let report = state.db_repo.upsert_report(&record, admin.id).await?;
    tracing::info!(report_id = report.id, report_date = %report.report_date, admin_id = admin.id, "Monthly report saved");
    Ok(ApiResponse::created(report, "Report saved successfully"))
}

/// # PUT /api/v1/admin/reports/:id
pub async fn update_report(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
    Payload(req): Payload<ReportRequest>,
) -> Result<ApiResponse<MonthlyReport>, AppError> {
    let id = parse_id(&id, "report")?;
    let existing = state.db_repo.get_report(id).await.or_not_found("Report not found")?;
    let record = req.merge_into(existing)?;
    let report = match state.db_repo.update_report(id, &record).await {
        Ok(report) => report,
        Err(DbError::Conflict(_)) => {
            return Err(AppError::Conflict(
                "A report already exists for that month".to_string(),
            ));
        }
        Err(DbError::NotFound) => return Err(AppError::NotFound("Report not found".to_string())),
        Err(e) => return Err(e.into()),
    };
    tracing::info!(report_id = id, admin_id = admin.id, "Monthly report updated");
    Ok(ApiResponse::with_message(report, "Report updated successfully"))
}

/// # DELETE /api/v1/admin/reports/:id
pub async fn delete_report(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
) -> Result<ApiResponse<()>, AppError> {
    let id = parse_id(&id, "report")?;
    state.db_repo.delete_report(id).await.or_not_found("Report not found")?;
    tracing::info!(report_id = id, admin_id = admin.id, "Monthly report deleted");
    Ok(ApiResponse::deleted("Report deleted successfully"))
}

/// # GET /api/v1/admin/reports/summary
pub async fn summary(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    ApiQuery(query): ApiQuery<ReportQuery>,
) -> Result<ApiResponse<SummaryReport>, AppError> {
    check_month(query.month)?;
    let summary = state.db_repo.report_summary(query.year, query.month).await?;
    Ok(ApiResponse::with_message(
        SummaryReport {
            period: summary_period(query.year, query.month),
            year: query.year,
            month: query.month,
            summary,
        },
        "Report summary retrieved successfully",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    fn errors_of(err: AppError) -> core_types::ValidationErrors {
        match err {
            AppError::Validation(errors) => errors,
            other => panic!("expected validation errors, got {:?}", other),
        }
    }

    #[test]
    fn new_report_requires_month_and_total() {
        let errors = errors_of(ReportRequest::default().into_record(2026).unwrap_err());
        assert!(errors.has("report_month"));
        assert!(errors.has("total_attendees"));
        assert_eq!(
            errors.get("report_month").unwrap()[0],
            "The Report Month field is required."
        );
    }

    #[test]
    fn counts_are_bounded() {
        let req = ReportRequest {
            report_month: Some(13),
            total_attendees: Some(MAX_ATTENDEES + 1),
            male_attendees: Some(-1),
            age_groups: Some(json!([1, 2])),
            ..ReportRequest::default()
        };
        let errors = errors_of(req.into_record(2026).unwrap_err());
        for field in ["report_month", "total_attendees", "male_attendees", "age_groups"] {
            assert!(errors.has(field), "{}", field);
        }
    }

    #[test]
    fn report_keys_on_first_of_month() {
        let record = ReportRequest {
            report_month: Some(3),
            total_attendees: Some(120),
            male_attendees: Some(70),
            narrative: Some("  Robotics showcase  ".into()),
            ..ReportRequest::default()
        }
        .into_record(2026)
        .unwrap();
        assert_eq!(record.report_date, NaiveDate::from_ymd_opt(2026, 3, 1).unwrap());
        assert_eq!(record.female_attendees, 0);
        assert_eq!(record.narrative.as_deref(), Some("Robotics showcase"));
    }

    #[test]
    fn update_keeps_untouched_fields() {
        let now = Utc::now();
        let existing = MonthlyReport {
            id: 4,
            report_date: NaiveDate::from_ymd_opt(2026, 2, 1).unwrap(),
            total_attendees: 90,
            male_attendees: 40,
            female_attendees: 50,
            age_groups: Some(json!({"13-15": 60})),
            narrative: Some("Busy month".into()),
            challenges: None,
            created_by: Some(1),
            created_at: now,
            updated_at: now,
        };
        let record = ReportRequest {
            total_attendees: Some(95),
            narrative: Some("".into()),
            ..ReportRequest::default()
        }
        .merge_into(existing)
        .unwrap();
        assert_eq!(record.report_date, NaiveDate::from_ymd_opt(2026, 2, 1).unwrap());
        assert_eq!(record.total_attendees, 95);
        assert_eq!(record.male_attendees, 40);
        assert!(record.age_groups.is_some());
        assert_eq!(record.narrative, None);
    }

    #[test]
    fn summary_period_labels() {
        assert_eq!(summary_period(Some(2026), Some(1)).as_deref(), Some("January 2026"));
        assert_eq!(summary_period(Some(2026), None).as_deref(), Some("2026"));
        assert_eq!(summary_period(None, Some(1)), None);
        assert!(check_month(Some(0)).is_err());
        assert!(check_month(None).is_ok());
    }
}
