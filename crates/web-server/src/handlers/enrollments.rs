use crate::{
    auth::CurrentUser,
    error::AppError,
    extract::parse_id,
    handlers::OrNotFound,
    response::ApiResponse,
    AppState,
};
use axum::extract::{Path, State};
use chrono::{DateTime, Utc};
use core_types::CourseStatus;
use database::{DbError, Enrollment, EnrollmentWithCourse};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CourseProgress {
    pub percent: Decimal,
    pub completed: bool,
    pub last_accessed: Option<DateTime<Utc>>,
    pub started: bool,
}

impl From<Option<Enrollment>> for CourseProgress {
    fn from(enrollment: Option<Enrollment>) -> Self {
        match enrollment {
            Some(e) => Self {
                percent: e.progress,
                completed: e.completed,
                last_accessed: e.last_accessed_at,
                started: true,
            },
            None => Self {
                percent: Decimal::ZERO,
                completed: false,
                last_accessed: None,
                started: false,
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LessonCompleted {
    pub lesson_id: i64,
    pub course_id: i64,
    pub progress: Decimal,
    pub course_completed: bool,
}

/// # POST /api/v1/courses/:id/enroll
pub async fn enroll(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> Result<ApiResponse<Enrollment>, AppError> {
    let course_id = parse_id(&id, "course")?;
    let course = state
        .db_repo
        .get_course(course_id)
        .await
        .or_not_found("Course not found")?;
    if !(course.is_published && course.status == CourseStatus::Active) {
        return Err(AppError::NotFound("Course not found".to_string()));
    }

    let enrollment = match state.db_repo.enroll_user(user.id, course_id).await {
        Ok(enrollment) => enrollment,
        Err(DbError::Conflict(_)) => {
            return Err(AppError::Conflict(
                "User is already enrolled in this course".to_string(),
            ));
        }
        Err(e) => return Err(e.into()),
    };
    tracing::info!(user_id = user.id, course_id, "User enrolled in course");
    Ok(ApiResponse::created(enrollment, "Enrolled successfully"))
}

/// # DELETE /api/v1/courses/:id/enroll
pub async fn unenroll(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> Result<ApiResponse<()>, AppError> {
    let course_id = parse_id(&id, "course")?;
    state
        .db_repo
        .unenroll_user(user.id, course_id)
        .await
        .or_not_found("You are not enrolled in this course")?;
    tracing::info!(user_id = user.id, course_id, "User unenrolled from course");
    Ok(ApiResponse::deleted("Unenrolled successfully"))
}

/// # GET /api/v1/courses/:id/progress
pub async fn progress(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> Result<ApiResponse<CourseProgress>, AppError> {
    let course_id = parse_id(&id, "course")?;
    let enrollment = state.db_repo.get_enrollment(user.id, course_id).await?;
    Ok(ApiResponse::with_message(
        CourseProgress::from(enrollment),
        "Progress retrieved successfully",
    ))
}

/// # POST /api/v1/lessons/:id/complete
pub async fn complete_lesson(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> Result<ApiResponse<LessonCompleted>, AppError> {
    let lesson_id = parse_id(&id, "lesson")?;
    let course_id = state
        .db_repo
        .lesson_course_id(lesson_id)
        .await
        .or_not_found("Lesson not found")?;
    if state.db_repo.get_enrollment(user.id, course_id).await?.is_none() {
        return Err(AppError::Forbidden(
            "You must be enrolled in this course to complete lessons".to_string(),
        ));
    }

    let enrollment = state
        .db_repo
        .complete_lesson(user.id, course_id, lesson_id)
        .await
        .or_not_found("Enrollment not found")?;
    tracing::info!(
        user_id = user.id,
        course_id,
        lesson_id,
        progress = %enrollment.progress,
        "Lesson completed"
    );
    if enrollment.completed {
        tracing::info!(user_id = user.id, course_id, "Course completed");
    }
    Ok(ApiResponse::with_message(
        LessonCompleted {
            lesson_id,
            course_id,
            progress: enrollment.progress,
            course_completed: enrollment.completed,
        },
        "Lesson marked as complete",
    ))
}

/// # GET /api/v1/users/me/enrollments
pub async fn my_enrollments(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
) -> Result<ApiResponse<Vec<EnrollmentWithCourse>>, AppError> {
    let enrollments = state.db_repo.list_user_enrollments(user.id).await?;
    Ok(ApiResponse::with_message(enrollments, "Enrollments retrieved successfully"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn progress_without_enrollment_is_zeroed() {
        let progress = CourseProgress::from(None);
        assert_eq!(progress.percent, Decimal::ZERO);
        assert!(!progress.started);
        assert!(!progress.completed);
        assert!(progress.last_accessed.is_none());
    }

    #[test]
    fn progress_reflects_enrollment() {
        let now = Utc::now();
        let progress = CourseProgress::from(Some(Enrollment {
            id: 1,
            user_id: 2,
            course_id: 3,
            progress: dec!(66.67),
            completed: false,
            enrolled_at: now,
            completion_date: None,
            last_accessed_at: Some(now),
        }));
        assert_eq!(progress.percent, dec!(66.67));
        assert!(progress.started);
        assert_eq!(progress.last_accessed, Some(now));
        let json = serde_json::to_value(&progress).unwrap();
        assert_eq!(json["percent"], 66.67);
    }
}
