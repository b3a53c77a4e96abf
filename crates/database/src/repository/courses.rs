use super::{like_pattern, DbRepository, PageRequest};
use crate::DbError;
use chrono::{DateTime, Utc};
use core_types::{CourseStatus, CourseType, DifficultyLevel};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Represents a row from the `courses` table.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Course {
    pub id: i64,
    pub course_code: String,
    pub title: String,
    pub description: String,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub course_type: CourseType,
    pub difficulty_level: DifficultyLevel,
    pub duration: i32,
    pub image_path: Option<String>,
    pub is_featured: bool,
    pub is_published: bool,
    pub status: CourseStatus,
    pub enrollment_count: i32,
    pub created_by: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewCourse {
    pub course_code: String,
    pub title: String,
    pub description: String,
    pub course_type: CourseType,
    pub difficulty_level: DifficultyLevel,
    pub duration: i32,
    pub image_path: Option<String>,
    pub is_featured: bool,
    pub is_published: bool,
    pub status: CourseStatus,
    pub created_by: i64,
}

/// A partial update; `None` leaves the column untouched.
#[derive(Debug, Clone, Default)]
pub struct CourseChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub course_type: Option<CourseType>,
    pub difficulty_level: Option<DifficultyLevel>,
    pub duration: Option<i32>,
    pub image_path: Option<String>,
    pub is_featured: Option<bool>,
    pub is_published: Option<bool>,
    pub status: Option<CourseStatus>,
}

#[derive(Debug, Clone, Default)]
pub struct CourseFilter {
    pub status: Option<CourseStatus>,
    pub course_type: Option<CourseType>,
    pub search: Option<String>,
    /// Restrict to courses learners can see (published and active).
    pub public_only: bool,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct CourseModule {
    pub id: i64,
    pub course_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub order_number: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct CourseSection {
    pub id: i64,
    pub course_id: i64,
    pub module_id: Option<i64>,
    pub title: String,
    pub description: Option<String>,
    pub order_number: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewModule {
    pub title: String,
    pub description: Option<String>,
    /// Appended after the last module when absent.
    pub order_number: Option<i32>,
}

#[derive(Debug, Clone)]
pub struct NewSection {
    pub module_id: Option<i64>,
    pub title: String,
    pub description: Option<String>,
    pub order_number: Option<i32>,
}

/// Enrollment aggregates for one course.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct CourseStatistics {
    pub total_enrollments: i64,
    pub total_completed: i64,
    pub in_progress_count: i64,
    pub avg_progress: f64,
    pub lesson_count: i64,
}

impl DbRepository {
    pub async fn create_course(&self, course: &NewCourse) -> Result<Course, DbError> {
        sqlx::query_as::<_, Course>(
            r#"
            INSERT INTO courses (course_code, title, description, type, difficulty_level, duration,
                                 image_path, is_featured, is_published, status, created_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING *
            "#,
        )
        .bind(&course.course_code)
        .bind(&course.title)
        .bind(&course.description)
        .bind(course.course_type)
        .bind(course.difficulty_level)
        .bind(course.duration)
        .bind(&course.image_path)
        .bind(course.is_featured)
        .bind(course.is_published)
        .bind(course.status)
        .bind(course.created_by)
        .fetch_one(&self.pool)
        .await
        .map_err(DbError::from_write)
    }

    pub async fn get_course(&self, id: i64) -> Result<Course, DbError> {
        sqlx::query_as::<_, Course>("SELECT * FROM courses WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(DbError::NotFound)
    }

    pub async fn list_courses(
        &self,
        filter: &CourseFilter,
        page: PageRequest,
    ) -> Result<(Vec<Course>, i64), DbError> {
        let pattern = like_pattern(filter.search.as_deref());
        let conditions = r#"
            ($1::text IS NULL OR status = $1)
            AND ($2::text IS NULL OR type = $2)
            AND ($3::text IS NULL OR title ILIKE $3 OR description ILIKE $3 OR course_code ILIKE $3)
            AND (NOT $4 OR (is_published AND status = 'active'))
        "#;

        let total = sqlx::query_scalar::<_, i64>(&format!(
            "SELECT COUNT(*) FROM courses WHERE {conditions}"
        ))
        .bind(filter.status)
        .bind(filter.course_type)
        .bind(&pattern)
        .bind(filter.public_only)
        .fetch_one(&self.pool)
        .await?;

        let courses = sqlx::query_as::<_, Course>(&format!(
            "SELECT * FROM courses WHERE {conditions} ORDER BY is_featured DESC, created_at DESC, id DESC LIMIT $5 OFFSET $6"
        ))
        .bind(filter.status)
        .bind(filter.course_type)
        .bind(&pattern)
        .bind(filter.public_only)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;

        Ok((courses, total))
    }

    pub async fn update_course(&self, id: i64, changes: &CourseChanges) -> Result<Course, DbError> {
        sqlx::query_as::<_, Course>(
            r#"
            UPDATE courses SET
                title = COALESCE($2, title),
                description = COALESCE($3, description),
                type = COALESCE($4, type),
                difficulty_level = COALESCE($5, difficulty_level),
                duration = COALESCE($6, duration),
                image_path = COALESCE($7, image_path),
                is_featured = COALESCE($8, is_featured),
                is_published = COALESCE($9, is_published),
                status = COALESCE($10, status),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&changes.title)
        .bind(&changes.description)
        .bind(changes.course_type)
        .bind(changes.difficulty_level)
        .bind(changes.duration)
        .bind(&changes.image_path)
        .bind(changes.is_featured)
        .bind(changes.is_published)
        .bind(changes.status)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(DbError::NotFound)
    }

    /// Deletes a course. Modules, sections, lessons, enrollments and lesson
    /// progress go with it through `ON DELETE CASCADE`.
    pub async fn delete_course(&self, id: i64) -> Result<(), DbError> {
        let result = sqlx::query("DELETE FROM courses WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    /// Sets the status and returns the previous one.
    pub async fn set_course_status(
        &self,
        id: i64,
        status: CourseStatus,
    ) -> Result<CourseStatus, DbError> {
        sqlx::query_scalar::<_, CourseStatus>(
            r#"
            WITH previous AS (SELECT id, status FROM courses WHERE id = $1 FOR UPDATE)
            UPDATE courses c SET status = $2, updated_at = NOW()
            FROM previous
            WHERE c.id = previous.id
            RETURNING previous.status
            "#,
        )
        .bind(id)
        .bind(status)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(DbError::NotFound)
    }

    /// Flips `is_featured` and returns the new value.
    pub async fn toggle_course_featured(&self, id: i64) -> Result<bool, DbError> {
        sqlx::query_scalar::<_, bool>(
            "UPDATE courses SET is_featured = NOT is_featured, updated_at = NOW() WHERE id = $1 RETURNING is_featured",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(DbError::NotFound)
    }

    pub async fn list_course_modules(&self, course_id: i64) -> Result<Vec<CourseModule>, DbError> {
        let modules = sqlx::query_as::<_, CourseModule>(
            "SELECT * FROM course_modules WHERE course_id = $1 ORDER BY order_number, id",
        )
        .bind(course_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(modules)
    }

    pub async fn create_course_module(
        &self,
        course_id: i64,
        module: &NewModule,
    ) -> Result<CourseModule, DbError> {
        sqlx::query_as::<_, CourseModule>(
            r#"
            INSERT INTO course_modules (course_id, title, description, order_number)
            VALUES ($1, $2, $3, COALESCE($4,
                (SELECT COALESCE(MAX(order_number), 0) + 1 FROM course_modules WHERE course_id = $1)))
            RETURNING *
            "#,
        )
        .bind(course_id)
        .bind(&module.title)
        .bind(&module.description)
        .bind(module.order_number)
        .fetch_one(&self.pool)
        .await
        .map_err(DbError::from_write)
    }

    pub async fn list_course_sections(&self, course_id: i64) -> Result<Vec<CourseSection>, DbError> {
        let sections = sqlx::query_as::<_, CourseSection>(
            "SELECT * FROM course_sections WHERE course_id = $1 ORDER BY order_number, id",
        )
        .bind(course_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(sections)
    }

    pub async fn create_course_section(
        &self,
        course_id: i64,
        section: &NewSection,
    ) -> Result<CourseSection, DbError> {
        sqlx::query_as::<_, CourseSection>(
            r#"
            INSERT INTO course_sections (course_id, module_id, title, description, order_number)
            VALUES ($1, $2, $3, $4, COALESCE($5,
                (SELECT COALESCE(MAX(order_number), 0) + 1 FROM course_sections WHERE course_id = $1)))
            RETURNING *
            "#,
        )
        .bind(course_id)
        .bind(section.module_id)
        .bind(&section.title)
        .bind(&section.description)
        .bind(section.order_number)
        .fetch_one(&self.pool)
        .await
        .map_err(DbError::from_write)
    }

    pub async fn get_course_section(&self, id: i64) -> Result<CourseSection, DbError> {
        sqlx::query_as::<_, CourseSection>("SELECT * FROM course_sections WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(DbError::NotFound)
    }

    /// Whether `module_id` exists and belongs to `course_id`.
    pub async fn module_belongs_to_course(&self, module_id: i64, course_id: i64) -> Result<bool, DbError> {
        let found = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM course_modules WHERE id = $1 AND course_id = $2)",
        )
        .bind(module_id)
        .bind(course_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(found)
    }

    pub async fn course_statistics(&self, course_id: i64) -> Result<CourseStatistics, DbError> {
        let stats = sqlx::query_as::<_, CourseStatistics>(
            r#"
            SELECT
                COUNT(e.id) AS total_enrollments,
                COUNT(e.id) FILTER (WHERE e.completed) AS total_completed,
                COUNT(e.id) FILTER (WHERE e.progress > 0 AND e.progress < 100) AS in_progress_count,
                COALESCE(ROUND(AVG(e.progress), 2), 0)::float8 AS avg_progress,
                (SELECT COUNT(*) FROM lessons l
                   JOIN course_sections s ON s.id = l.section_id
                  WHERE s.course_id = $1) AS lesson_count
            FROM enrollments e
            WHERE e.course_id = $1
            "#,
        )
        .bind(course_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(stats)
    }
}
