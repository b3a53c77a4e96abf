use crate::{
    auth::AdminUser,
    error::AppError,
    extract::{flag, parse_id, Payload},
    handlers::{parse_filter, OrNotFound},
    response::ApiResponse,
    AppState,
};
use axum::extract::{Path, State};
use core_types::{validation::clean, LessonType};
use database::{Lesson, LessonChanges, NewLesson};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Default, Deserialize)]
pub struct LessonRequest {
    pub section_id: Option<i64>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub content: Option<String>,
    pub lesson_type: Option<String>,
    pub order_number: Option<i32>,
    pub duration: Option<i32>,
    #[serde(default, deserialize_with = "flag::option")]
    pub is_published: Option<bool>,
}

impl LessonRequest {
    /// Validates a new lesson, returning its section and the insert payload.
    fn into_new_lesson(self) -> Result<(i64, NewLesson), AppError> {
        let section_id = self
            .section_id
            .filter(|id| *id > 0)
            .ok_or_else(|| AppError::BadRequest("Section ID is required".to_string()))?;
        let title = clean(self.title)
            .ok_or_else(|| AppError::BadRequest("Lesson title is required".to_string()))?;
        let lesson = NewLesson {
            title,
            description: clean(self.description),
            content: self.content,
            lesson_type: parse_filter(self.lesson_type.as_deref())?.unwrap_or_default(),
            order_number: self.order_number.filter(|n| *n > 0),
            duration: self.duration.unwrap_or(0).max(0),
            is_published: self.is_published.unwrap_or(false),
        };
        Ok((section_id, lesson))
    }

    fn into_changes(self) -> Result<LessonChanges, AppError> {
        if matches!(&self.title, Some(t) if t.trim().is_empty()) {
            return Err(AppError::BadRequest("Lesson title cannot be empty".to_string()));
        }
        Ok(LessonChanges {
            title: clean(self.title),
            description: clean(self.description),
            content: self.content,
            lesson_type: parse_filter::<LessonType>(self.lesson_type.as_deref())?,
            order_number: self.order_number.filter(|n| *n > 0),
            duration: self.duration.map(|d| d.max(0)),
            is_published: self.is_published,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct LessonCreated {
    pub lesson_id: i64,
    pub lesson: Lesson,
    pub section_id: i64,
    pub course_id: i64,
}

#[derive(Debug, Serialize)]
pub struct SectionLessons {
    pub section_id: i64,
    pub lessons: Vec<Lesson>,
    pub count: usize,
}

/// # POST /api/v1/admin/courses/:id/lessons
pub async fn create_lesson(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(course_id): Path<String>,
    Payload(req): Payload<LessonRequest>,
) -> Result<ApiResponse<LessonCreated>, AppError> {
    let course_id = parse_id(&course_id, "course")?;
    let (section_id, new_lesson) = req.into_new_lesson()?;

    let section = state
        .db_repo
        .get_course_section(section_id)
        .await
        .or_not_found("Section not found")?;
    if section.course_id != course_id {
        return Err(AppError::BadRequest(
            "Section does not belong to this course".to_string(),
        ));
    }

    let lesson = state.db_repo.create_lesson(section_id, &new_lesson).await?;
    tracing::info!(lesson_id = lesson.id, section_id, course_id, admin_id = admin.id, "Lesson created");
    Ok(ApiResponse::created(
        LessonCreated {
            lesson_id: lesson.id,
            lesson,
            section_id,
            course_id,
        },
        "Lesson created successfully",
    ))
}

/// # GET /api/v1/admin/lessons/:id
pub async fn get_lesson(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Path(id): Path<String>,
) -> Result<ApiResponse<Lesson>, AppError> {
    let id = parse_id(&id, "lesson")?;
    let lesson = state.db_repo.get_lesson(id).await.or_not_found("Lesson not found")?;
    Ok(ApiResponse::with_message(lesson, "Lesson retrieved successfully"))
}

/// # PUT /api/v1/admin/lessons/:id
pub async fn update_lesson(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
    Payload(req): Payload<LessonRequest>,
) -> Result<ApiResponse<Lesson>, AppError> {
    let id = parse_id(&id, "lesson")?;
    state.db_repo.get_lesson(id).await.or_not_found("Lesson not found")?;
    let changes = req.into_changes()?;
    let lesson = state
        .db_repo
        .update_lesson(id, &changes)
        .await
        .or_not_found("Lesson not found")?;
    tracing::info!(lesson_id = id, admin_id = admin.id, "Lesson updated");
    Ok(ApiResponse::with_message(lesson, "Lesson updated successfully"))
}

/// # DELETE /api/v1/admin/lessons/:id
pub async fn delete_lesson(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
) -> Result<ApiResponse<()>, AppError> {
    let id = parse_id(&id, "lesson")?;
    state.db_repo.delete_lesson(id).await.or_not_found("Lesson not found")?;
    tracing::info!(lesson_id = id, admin_id = admin.id, "Lesson deleted");
    Ok(ApiResponse::deleted("Lesson deleted successfully"))
}

/// # GET /api/v1/admin/sections/:id/lessons
pub async fn list_section_lessons(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Path(section_id): Path<String>,
) -> Result<ApiResponse<SectionLessons>, AppError> {
    let section_id = parse_id(&section_id, "section")?;
    state
        .db_repo
        .get_course_section(section_id)
        .await
        .or_not_found("Section not found")?;
    let lessons = state.db_repo.list_section_lessons(section_id).await?;
    Ok(ApiResponse::with_message(
        SectionLessons {
            section_id,
            count: lessons.len(),
            lessons,
        },
        "Section lessons retrieved successfully",
    ))
}
