use crate::{
    auth::AdminUser,
    error::AppError,
    extract::{flag, parse_id, ApiQuery, Payload},
    handlers::{page_request, parse_filter, OrNotFound},
    response::{ApiResponse, Paginated},
    AppState,
};
use axum::extract::{Path, State};
use core_types::{
    course::generate_course_code, validation::clean, CourseStatus, CourseType, DifficultyLevel,
};
use database::{
    Course, CourseChanges, CourseFilter, CourseModule, CourseSection, CourseStatistics, DbError,
    NewCourse, NewModule, NewSection,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const COURSE_CODE_CONSTRAINT: &str = "courses_course_code_key";
/// Inserts tried with freshly generated codes before giving up.
const COURSE_CODE_ATTEMPTS: u32 = 5;

#[derive(Debug, Deserialize)]
pub struct CourseListQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    pub status: Option<String>,
    #[serde(rename = "type")]
    pub course_type: Option<String>,
    pub search: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CourseRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub course_code: Option<String>,
    #[serde(rename = "type")]
    pub course_type: Option<String>,
    pub difficulty_level: Option<String>,
    pub duration: Option<i32>,
    pub image_path: Option<String>,
    #[serde(default, deserialize_with = "flag::option")]
    pub is_featured: Option<bool>,
    #[serde(default, deserialize_with = "flag::option")]
    pub is_published: Option<bool>,
    pub status: Option<String>,
}

impl CourseRequest {
    fn into_new_course(self, created_by: i64) -> Result<NewCourse, AppError> {
        let title = clean(self.title)
            .ok_or_else(|| AppError::BadRequest("Course title is required".to_string()))?;
        let description = clean(self.description)
            .ok_or_else(|| AppError::BadRequest("Course description is required".to_string()))?;
        let course_type = parse_filter(self.course_type.as_deref())?.unwrap_or_default();
        let course_code =
            clean(self.course_code).unwrap_or_else(|| generate_course_code(&title, course_type));

        Ok(NewCourse {
            course_code,
            title,
            description,
            course_type,
            difficulty_level: parse_filter(self.difficulty_level.as_deref())?.unwrap_or_default(),
            duration: self.duration.unwrap_or(0).max(0),
            image_path: clean(self.image_path),
            is_featured: self.is_featured.unwrap_or(false),
            is_published: self.is_published.unwrap_or(false),
            status: parse_filter(self.status.as_deref())?.unwrap_or_default(),
            created_by,
        })
    }

    fn into_changes(self) -> Result<CourseChanges, AppError> {
        if matches!(&self.title, Some(t) if t.trim().is_empty()) {
            return Err(AppError::BadRequest("Course title cannot be empty".to_string()));
        }
        if matches!(&self.description, Some(d) if d.trim().is_empty()) {
            return Err(AppError::BadRequest("Course description cannot be empty".to_string()));
        }
        Ok(CourseChanges {
            title: clean(self.title),
            description: clean(self.description),
            course_type: parse_filter::<CourseType>(self.course_type.as_deref())?,
            difficulty_level: parse_filter::<DifficultyLevel>(self.difficulty_level.as_deref())?,
            duration: self.duration.map(|d| d.max(0)),
            image_path: clean(self.image_path),
            is_featured: self.is_featured,
            is_published: self.is_published,
            status: parse_filter::<CourseStatus>(self.status.as_deref())?,
        })
    }
}

/// A course with its outline.
#[derive(Debug, Serialize)]
pub struct CourseDetail {
    #[serde(flatten)]
    pub course: Course,
    pub modules: Vec<CourseModule>,
    pub sections: Vec<CourseSection>,
}

#[derive(Debug, Serialize)]
pub struct CourseCreated {
    pub course_id: i64,
    pub course: Course,
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StatusChanged {
    pub course_id: i64,
    pub status: CourseStatus,
    pub old_status: CourseStatus,
}

#[derive(Debug, Serialize)]
pub struct FeaturedToggled {
    pub course_id: i64,
    pub is_featured: bool,
    pub was_featured: bool,
}

#[derive(Debug, Deserialize)]
pub struct OutlineItemRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub order_number: Option<i32>,
    pub module_id: Option<i64>,
}

impl OutlineItemRequest {
    /// Zero and absent both mean "append".
    fn order(&self) -> Option<i32> {
        self.order_number.filter(|n| *n > 0)
    }
}

#[derive(Debug, Serialize)]
pub struct ModuleList {
    pub course_id: i64,
    pub modules: Vec<CourseModule>,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct SectionList {
    pub course_id: i64,
    pub sections: Vec<CourseSection>,
    pub count: usize,
}

async fn course_detail(state: &AppState, course: Course) -> Result<CourseDetail, AppError> {
    let modules = state.db_repo.list_course_modules(course.id).await?;
    let sections = state.db_repo.list_course_sections(course.id).await?;
    Ok(CourseDetail {
        course,
        modules,
        sections,
    })
}

async fn list(
    state: &AppState,
    query: CourseListQuery,
    public_only: bool,
) -> Result<Paginated<Course>, AppError> {
    let filter = CourseFilter {
        status: parse_filter(query.status.as_deref())?,
        course_type: parse_filter(query.course_type.as_deref())?,
        search: clean(query.search),
        public_only,
    };
    let page = page_request(query.page, query.per_page);
    let (courses, total) = state.db_repo.list_courses(&filter, page).await?;
    Ok(Paginated::new(courses, page.page, page.per_page, total))
}

fn is_public(course: &Course) -> bool {
    course.is_published && course.status == CourseStatus::Active
}

/// # GET /api/v1/admin/courses
pub async fn list_courses(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    ApiQuery(query): ApiQuery<CourseListQuery>,
) -> Result<ApiResponse<Paginated<Course>>, AppError> {
    let page = list(&state, query, false).await?;
    Ok(ApiResponse::with_message(page, "Courses retrieved successfully"))
}

/// # GET /api/v1/admin/courses/:id
pub async fn get_course(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Path(id): Path<String>,
) -> Result<ApiResponse<CourseDetail>, AppError> {
    let id = parse_id(&id, "course")?;
    let course = state.db_repo.get_course(id).await.or_not_found("Course not found")?;
    let detail = course_detail(&state, course).await?;
    Ok(ApiResponse::with_message(detail, "Course retrieved successfully"))
}

/// # POST /api/v1/admin/courses
pub async fn create_course(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Payload(req): Payload<CourseRequest>,
) -> Result<ApiResponse<CourseCreated>, AppError> {
    let generated_code = clean(req.course_code.clone()).is_none();
    let mut new_course = req.into_new_course(admin.id)?;
    let mut attempt = 1;
    let course = loop {
        match state.db_repo.create_course(&new_course).await {
            Err(DbError::Conflict(constraint)) => {
                retry_on_code_clash(constraint, generated_code, attempt)?;
                tracing::debug!(course_code = %new_course.course_code, attempt, "Generated course code taken, retrying.");
                new_course.course_code = generate_course_code(&new_course.title, new_course.course_type);
                attempt += 1;
            }
            result => break result?,
        }
    };
    tracing::info!(course_id = course.id, course_code = %course.course_code, created_by = admin.id, "Course created");
    Ok(ApiResponse::created(
        CourseCreated {
            course_id: course.id,
            course,
        },
        "Course created successfully",
    ))
}

/// Decides whether a unique violation on insert is worth another attempt.
/// Only generated course codes are regenerated; a code supplied by the
/// caller is reported as taken.
fn retry_on_code_clash(constraint: String, generated_code: bool, attempt: u32) -> Result<(), AppError> {
    if constraint != COURSE_CODE_CONSTRAINT {
        return Err(DbError::Conflict(constraint).into());
    }
    if generated_code && attempt < COURSE_CODE_ATTEMPTS {
        return Ok(());
    }
    Err(AppError::Conflict("Course code already exists".to_string()))
}

/// # PUT /api/v1/admin/courses/:id
pub async fn update_course(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
    Payload(req): Payload<CourseRequest>,
) -> Result<ApiResponse<Course>, AppError> {
    let id = parse_id(&id, "course")?;
    state.db_repo.get_course(id).await.or_not_found("Course not found")?;
    let changes = req.into_changes()?;
    let course = state
        .db_repo
        .update_course(id, &changes)
        .await
        .or_not_found("Course not found")?;
    tracing::info!(course_id = id, updated_by = admin.id, "Course updated");
    Ok(ApiResponse::with_message(course, "Course updated successfully"))
}

/// # DELETE /api/v1/admin/courses/:id
/// Removes the course together with its outline, lessons and enrollments.
pub async fn delete_course(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
) -> Result<ApiResponse<()>, AppError> {
    let id = parse_id(&id, "course")?;
    state.db_repo.delete_course(id).await.or_not_found("Course not found")?;
    tracing::info!(course_id = id, deleted_by = admin.id, "Course deleted");
    Ok(ApiResponse::deleted("Course deleted successfully"))
}

/// # PUT|POST /api/v1/admin/courses/:id/status
pub async fn update_course_status(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
    Payload(req): Payload<StatusRequest>,
) -> Result<ApiResponse<StatusChanged>, AppError> {
    let id = parse_id(&id, "course")?;
    let status: CourseStatus = req
        .status
        .as_deref()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| {
            AppError::BadRequest(format!(
                "Invalid status. Must be one of: {}",
                CourseStatus::allowed()
            ))
        })?;

    let old_status = state
        .db_repo
        .set_course_status(id, status)
        .await
        .or_not_found("Course not found")?;
    tracing::info!(
        course_id = id,
        old_status = %old_status,
        new_status = %status,
        admin_id = admin.id,
        "Course status updated"
    );
    Ok(ApiResponse::with_message(
        StatusChanged {
            course_id: id,
            status,
            old_status,
        },
        "Course status updated successfully",
    ))
}

/// # POST /api/v1/admin/courses/:id/featured
pub async fn toggle_featured(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
) -> Result<ApiResponse<FeaturedToggled>, AppError> {
    let id = parse_id(&id, "course")?;
    let is_featured = state
        .db_repo
        .toggle_course_featured(id)
        .await
        .or_not_found("Course not found")?;
    tracing::info!(course_id = id, is_featured, admin_id = admin.id, "Course featured status toggled");
    let message = if is_featured {
        "Course featured successfully"
    } else {
        "Course unfeatured successfully"
    };
    Ok(ApiResponse::with_message(
        FeaturedToggled {
            course_id: id,
            is_featured,
            was_featured: !is_featured,
        },
        message,
    ))
}

/// # GET /api/v1/admin/courses/:id/modules
pub async fn list_modules(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Path(id): Path<String>,
) -> Result<ApiResponse<ModuleList>, AppError> {
    let id = parse_id(&id, "course")?;
    state.db_repo.get_course(id).await.or_not_found("Course not found")?;
    let modules = state.db_repo.list_course_modules(id).await?;
    Ok(ApiResponse::with_message(
        ModuleList {
            course_id: id,
            count: modules.len(),
            modules,
        },
        "Modules retrieved successfully",
    ))
}

/// # POST /api/v1/admin/courses/:id/modules
pub async fn create_module(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
    Payload(req): Payload<OutlineItemRequest>,
) -> Result<ApiResponse<CourseModule>, AppError> {
    let id = parse_id(&id, "course")?;
    state.db_repo.get_course(id).await.or_not_found("Course not found")?;
    let order_number = req.order();
    let title = clean(req.title)
        .ok_or_else(|| AppError::BadRequest("Module title is required".to_string()))?;

    let module = state
        .db_repo
        .create_course_module(
            id,
            &NewModule {
                title,
                description: clean(req.description),
                order_number,
            },
        )
        .await?;
    tracing::info!(course_id = id, module_id = module.id, admin_id = admin.id, "Course module created");
    Ok(ApiResponse::created(module, "Module created successfully"))
}

/// # GET /api/v1/admin/courses/:id/sections
pub async fn list_sections(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Path(id): Path<String>,
) -> Result<ApiResponse<SectionList>, AppError> {
    let id = parse_id(&id, "course")?;
    state.db_repo.get_course(id).await.or_not_found("Course not found")?;
    let sections = state.db_repo.list_course_sections(id).await?;
    Ok(ApiResponse::with_message(
        SectionList {
            course_id: id,
            count: sections.len(),
            sections,
        },
        "Sections retrieved successfully",
    ))
}

/// # POST /api/v1/admin/courses/:id/sections
pub async fn create_section(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
    Payload(req): Payload<OutlineItemRequest>,
) -> Result<ApiResponse<CourseSection>, AppError> {
    let id = parse_id(&id, "course")?;
    state.db_repo.get_course(id).await.or_not_found("Course not found")?;
    let order_number = req.order();
    let module_id = req.module_id.filter(|m| *m > 0);
    let title = clean(req.title)
        .ok_or_else(|| AppError::BadRequest("Section title is required".to_string()))?;

    if let Some(module_id) = module_id {
        if !state.db_repo.module_belongs_to_course(module_id, id).await? {
            return Err(AppError::BadRequest(
                "Module does not belong to this course".to_string(),
            ));
        }
    }

    let section = state
        .db_repo
        .create_course_section(
            id,
            &NewSection {
                module_id,
                title,
                description: clean(req.description),
                order_number,
            },
        )
        .await?;
    tracing::info!(course_id = id, section_id = section.id, admin_id = admin.id, "Course section created");
    Ok(ApiResponse::created(section, "Section created successfully"))
}

/// # GET /api/v1/admin/courses/:id/statistics
pub async fn course_statistics(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Path(id): Path<String>,
) -> Result<ApiResponse<CourseStatistics>, AppError> {
    let id = parse_id(&id, "course")?;
    state.db_repo.get_course(id).await.or_not_found("Course not found")?;
    let stats = state.db_repo.course_statistics(id).await?;
    Ok(ApiResponse::with_message(stats, "Course statistics retrieved successfully"))
}

/// # GET /api/v1/courses
/// Published, active courses only.
pub async fn list_public_courses(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<CourseListQuery>,
) -> Result<ApiResponse<Paginated<Course>>, AppError> {
    let page = list(&state, query, true).await?;
    Ok(ApiResponse::with_message(page, "Courses retrieved successfully"))
}

/// # GET /api/v1/courses/:id
pub async fn get_public_course(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<ApiResponse<CourseDetail>, AppError> {
    let id = parse_id(&id, "course")?;
    let course = state
        .db_repo
        .get_course(id)
        .await
        .or_not_found("Course not found")?;
    if !is_public(&course) {
        return Err(AppError::NotFound("Course not found".to_string()));
    }
    let detail = course_detail(&state, course).await?;
    Ok(ApiResponse::with_message(detail, "Course retrieved successfully"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn create_requires_title_then_description() {
        let err = CourseRequest::default().into_new_course(1).unwrap_err();
        assert_eq!(err.to_string(), "Bad request: Course title is required");

        let err = CourseRequest {
            title: Some("Intro to Robotics".into()),
            description: Some("   ".into()),
            ..CourseRequest::default()
        }
        .into_new_course(1)
        .unwrap_err();
        assert_eq!(err.to_string(), "Bad request: Course description is required");
    }

    #[test]
    fn create_applies_defaults_and_code() {
        let course = CourseRequest {
            title: Some("  Intro to Robotics ".into()),
            description: Some("Build a line follower".into()),
            course_type: Some("short_course".into()),
            ..CourseRequest::default()
        }
        .into_new_course(9)
        .unwrap();
        assert_eq!(course.title, "Intro to Robotics");
        assert_eq!(course.course_type, CourseType::ShortCourse);
        assert_eq!(course.difficulty_level, DifficultyLevel::Beginner);
        assert_eq!(course.status, CourseStatus::Draft);
        assert_eq!(course.duration, 0);
        assert!(!course.is_featured && !course.is_published);
        assert_eq!(course.created_by, 9);
        assert!(course.course_code.starts_with("INT-SC-"));
        assert_eq!(course.course_code.len(), "INT-SC-0000".len());
    }

    #[test]
    fn generated_code_clashes_are_retried() {
        assert!(retry_on_code_clash(COURSE_CODE_CONSTRAINT.to_string(), true, 1).is_ok());
        assert!(retry_on_code_clash(COURSE_CODE_CONSTRAINT.to_string(), true, COURSE_CODE_ATTEMPTS - 1).is_ok());

        let err = retry_on_code_clash(COURSE_CODE_CONSTRAINT.to_string(), true, COURSE_CODE_ATTEMPTS).unwrap_err();
        assert_eq!(err.to_string(), "Conflict: Course code already exists");
    }

    #[test]
    fn supplied_code_clashes_are_reported() {
        let err = retry_on_code_clash(COURSE_CODE_CONSTRAINT.to_string(), false, 1).unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::CONFLICT);
        assert_eq!(err.to_string(), "Conflict: Course code already exists");

        let err = retry_on_code_clash("courses_pkey".to_string(), true, 1).unwrap_err();
        assert!(matches!(err, AppError::Database(DbError::Conflict(ref c)) if c == "courses_pkey"));
    }

    #[test]
    fn create_rejects_unknown_type() {
        let err = CourseRequest {
            title: Some("Coding".into()),
            description: Some("Scratch basics".into()),
            course_type: Some("bootcamp".into()),
            ..CourseRequest::default()
        }
        .into_new_course(1)
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn update_refuses_blanking() {
        let err = CourseRequest {
            title: Some("".into()),
            ..CourseRequest::default()
        }
        .into_changes()
        .unwrap_err();
        assert_eq!(err.to_string(), "Bad request: Course title cannot be empty");

        let changes = CourseRequest {
            status: Some("archived".into()),
            is_featured: Some(true),
            ..CourseRequest::default()
        }
        .into_changes()
        .unwrap();
        assert_eq!(changes.status, Some(CourseStatus::Archived));
        assert_eq!(changes.is_featured, Some(true));
        assert!(changes.title.is_none());
    }

    #[test]
    fn outline_order_zero_appends() {
        let req = OutlineItemRequest {
            title: Some("Week 1".into()),
            description: None,
            order_number: Some(0),
            module_id: None,
        };
        assert_eq!(req.order(), None);
    }
}
