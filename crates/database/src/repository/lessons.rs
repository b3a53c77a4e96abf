use super::enrollments::refresh_course_progress;
use super::DbRepository;
use crate::DbError;
use chrono::{DateTime, Utc};
use core_types::LessonType;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Represents a row from the `lessons` table.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Lesson {
    pub id: i64,
    pub section_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub content: Option<String>,
    pub lesson_type: LessonType,
    pub order_number: i32,
    pub duration: i32,
    pub is_published: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewLesson {
    pub title: String,
    pub description: Option<String>,
    pub content: Option<String>,
    pub lesson_type: LessonType,
    /// Appended after the section's last lesson when absent.
    pub order_number: Option<i32>,
    pub duration: i32,
    pub is_published: bool,
}

#[derive(Debug, Clone, Default)]
pub struct LessonChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub content: Option<String>,
    pub lesson_type: Option<LessonType>,
    pub order_number: Option<i32>,
    pub duration: Option<i32>,
    pub is_published: Option<bool>,
}

impl DbRepository {
    /// Inserts a lesson and refreshes progress for the course's enrollments,
    /// which now have one more lesson to finish.
    pub async fn create_lesson(&self, section_id: i64, lesson: &NewLesson) -> Result<Lesson, DbError> {
        let mut tx = self.pool.begin().await?;

        let created = sqlx::query_as::<_, Lesson>(
            r#"
            INSERT INTO lessons (section_id, title, description, content, lesson_type, order_number, duration, is_published)
            VALUES ($1, $2, $3, $4, $5, COALESCE($6,
                (SELECT COALESCE(MAX(order_number), 0) + 1 FROM lessons WHERE section_id = $1)), $7, $8)
            RETURNING *
            "#,
        )
        .bind(section_id)
        .bind(&lesson.title)
        .bind(&lesson.description)
        .bind(&lesson.content)
        .bind(lesson.lesson_type)
        .bind(lesson.order_number)
        .bind(lesson.duration)
        .bind(lesson.is_published)
        .fetch_one(&mut *tx)
        .await
        .map_err(DbError::from_write)?;

        let course_id: i64 = sqlx::query_scalar("SELECT course_id FROM course_sections WHERE id = $1")
            .bind(section_id)
            .fetch_one(&mut *tx)
            .await?;
        refresh_course_progress(&mut tx, course_id).await?;

        tx.commit().await?;
        Ok(created)
    }

    pub async fn get_lesson(&self, id: i64) -> Result<Lesson, DbError> {
        sqlx::query_as::<_, Lesson>("SELECT * FROM lessons WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(DbError::NotFound)
    }

    pub async fn list_section_lessons(&self, section_id: i64) -> Result<Vec<Lesson>, DbError> {
        let lessons = sqlx::query_as::<_, Lesson>(
            "SELECT * FROM lessons WHERE section_id = $1 ORDER BY order_number, id",
        )
        .bind(section_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(lessons)
    }

    pub async fn update_lesson(&self, id: i64, changes: &LessonChanges) -> Result<Lesson, DbError> {
        sqlx::query_as::<_, Lesson>(
            r#"
            UPDATE lessons SET
                title = COALESCE($2, title),
                description = COALESCE($3, description),
                content = COALESCE($4, content),
                lesson_type = COALESCE($5, lesson_type),
                order_number = COALESCE($6, order_number),
                duration = COALESCE($7, duration),
                is_published = COALESCE($8, is_published),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&changes.title)
        .bind(&changes.description)
        .bind(&changes.content)
        .bind(changes.lesson_type)
        .bind(changes.order_number)
        .bind(changes.duration)
        .bind(changes.is_published)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(DbError::NotFound)
    }

    /// Deletes a lesson and its progress rows, then refreshes progress for
    /// the course's enrollments.
    pub async fn delete_lesson(&self, id: i64) -> Result<(), DbError> {
        let mut tx = self.pool.begin().await?;

        let course_id: i64 = sqlx::query_scalar(
            r#"
            DELETE FROM lessons l
            USING course_sections s
            WHERE l.id = $1 AND s.id = l.section_id
            RETURNING s.course_id
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(DbError::NotFound)?;
        refresh_course_progress(&mut tx, course_id).await?;

        tx.commit().await?;
        Ok(())
    }

    /// The course a lesson belongs to, through its section.
    pub async fn lesson_course_id(&self, lesson_id: i64) -> Result<i64, DbError> {
        sqlx::query_scalar::<_, i64>(
            "SELECT s.course_id FROM lessons l JOIN course_sections s ON s.id = l.section_id WHERE l.id = $1",
        )
        .bind(lesson_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(DbError::NotFound)
    }
}
