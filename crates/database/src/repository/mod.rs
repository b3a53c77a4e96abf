use sqlx::postgres::PgPool;

mod api_logs;
mod attendance;
mod courses;
mod enrollments;
mod lessons;
mod programs;
mod reports;
mod users;

pub use api_logs::{ApiLogFilter, ApiPerformanceStats, ApiRequestLog, NewApiLog};
pub use attendance::{AttendanceRecord, AttendanceStats, CurrentAttendee, DailyAttendance};
pub use courses::{
    Course, CourseChanges, CourseFilter, CourseModule, CourseSection, CourseStatistics, NewCourse,
    NewModule, NewSection,
};
pub use enrollments::{Enrollment, EnrollmentWithCourse};
pub use lessons::{Lesson, LessonChanges, NewLesson};
pub use programs::{
    Attendee, HolidayProgram, NewAttendee, ProgramRecord, RegistrationOutcome,
};
pub use reports::{MonthlyReport, ReportRecord, ReportSummary};
pub use users::{NewUser, User, UserChanges, UserFilter, UserStats};

/// The `DbRepository` provides a high-level, application-specific interface
/// to the database. It encapsulates all SQL queries and data access logic.
///
/// Queries are grouped by table in the submodules; each adds an
/// `impl DbRepository` block.
#[derive(Debug, Clone)]
pub struct DbRepository {
    pool: PgPool,
}

impl DbRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Round-trips a trivial query; used by the readiness check.
    pub async fn ping(&self) -> Result<(), crate::DbError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// A page window for list queries. `page` is 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: i64,
    pub per_page: i64,
}

impl PageRequest {
    pub const MAX_PER_PAGE: i64 = 100;

    /// Clamps client supplied values into a usable window.
    pub fn new(page: i64, per_page: i64) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.clamp(1, Self::MAX_PER_PAGE),
        }
    }

    pub fn limit(&self) -> i64 {
        self.per_page
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.per_page
    }
}

/// Turns a free-text search term into an `ILIKE` pattern, escaping the
/// wildcard characters the user typed.
pub(crate) fn like_pattern(term: Option<&str>) -> Option<String> {
    let term = term.map(str::trim).filter(|t| !t.is_empty())?;
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    Some(format!("%{}%", escaped))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_request_clamps() {
        let page = PageRequest::new(0, 500);
        assert_eq!(page.page, 1);
        assert_eq!(page.per_page, PageRequest::MAX_PER_PAGE);
        assert_eq!(page.offset(), 0);
        assert_eq!(PageRequest::new(3, 20).offset(), 40);
    }

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern(Some(" robo ")).as_deref(), Some("%robo%"));
        assert_eq!(like_pattern(Some("100%_done")).as_deref(), Some("%100\\%\\_done%"));
        assert_eq!(like_pattern(Some("   ")), None);
        assert_eq!(like_pattern(None), None);
    }
}
