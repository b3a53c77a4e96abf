use crate::error::CoreError;
use chrono::NaiveDate;

/// Upper bound for any attendee count on a monthly report.
pub const MAX_ATTENDEES: i64 = 10_000;

/// The first day of the reporting month, which keys a monthly report.
pub fn report_date(year: i32, month: u32) -> Result<NaiveDate, CoreError> {
    NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(|| {
        CoreError::InvalidInput(
            "report_month".to_string(),
            format!("{}-{} is not a valid reporting month", year, month),
        )
    })
}

/// `January 2026`.
pub fn period_label(year: i32, month: u32) -> Option<String> {
    NaiveDate::from_ymd_opt(year, month, 1).map(|d| d.format("%B %Y").to_string())
}
