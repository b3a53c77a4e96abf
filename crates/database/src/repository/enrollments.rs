use super::DbRepository;
use crate::DbError;
use chrono::{DateTime, Utc};
use core_types::course::{is_complete, progress_percent};
use core_types::CourseType;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgConnection};

/// Represents a row from the `enrollments` table.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Enrollment {
    pub id: i64,
    pub user_id: i64,
    pub course_id: i64,
    pub progress: Decimal,
    pub completed: bool,
    pub enrolled_at: DateTime<Utc>,
    pub completion_date: Option<DateTime<Utc>>,
    pub last_accessed_at: Option<DateTime<Utc>>,
}

/// An enrollment joined with the course it refers to.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct EnrollmentWithCourse {
    pub enrollment_id: i64,
    pub course_id: i64,
    pub course_code: String,
    pub title: String,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub course_type: CourseType,
    pub progress: Decimal,
    pub completed: bool,
    pub enrolled_at: DateTime<Utc>,
    pub last_accessed_at: Option<DateTime<Utc>>,
}

impl DbRepository {
    /// Enrolls a user and bumps the course's `enrollment_count` in the same
    /// transaction. A repeat enrollment yields `DbError::Conflict` and leaves
    /// the count alone.
    pub async fn enroll_user(&self, user_id: i64, course_id: i64) -> Result<Enrollment, DbError> {
        let mut tx = self.pool.begin().await?;

        let enrollment = sqlx::query_as::<_, Enrollment>(
            r#"
            INSERT INTO enrollments (user_id, course_id, last_accessed_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (user_id, course_id) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(course_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| DbError::Conflict("enrollments_user_id_course_id_key".to_string()))?;

        sqlx::query("UPDATE courses SET enrollment_count = enrollment_count + 1 WHERE id = $1")
            .bind(course_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(enrollment)
    }

    /// Removes an enrollment together with the user's lesson progress in that
    /// course.
    pub async fn unenroll_user(&self, user_id: i64, course_id: i64) -> Result<(), DbError> {
        let mut tx = self.pool.begin().await?;

        let removed = sqlx::query("DELETE FROM enrollments WHERE user_id = $1 AND course_id = $2")
            .bind(user_id)
            .bind(course_id)
            .execute(&mut *tx)
            .await?;
        if removed.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }

        sqlx::query(
            r#"
            DELETE FROM lesson_progress lp
            USING lessons l, course_sections s
            WHERE lp.lesson_id = l.id AND l.section_id = s.id
              AND lp.user_id = $1 AND s.course_id = $2
            "#,
        )
        .bind(user_id)
        .bind(course_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE courses SET enrollment_count = GREATEST(enrollment_count - 1, 0) WHERE id = $1",
        )
        .bind(course_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    pub async fn get_enrollment(
        &self,
        user_id: i64,
        course_id: i64,
    ) -> Result<Option<Enrollment>, DbError> {
        let enrollment = sqlx::query_as::<_, Enrollment>(
            "SELECT * FROM enrollments WHERE user_id = $1 AND course_id = $2",
        )
        .bind(user_id)
        .bind(course_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(enrollment)
    }

    /// Marks a lesson complete and recomputes the enrollment's progress from
    /// the share of the course's lessons the user has finished.
    pub async fn complete_lesson(
        &self,
        user_id: i64,
        course_id: i64,
        lesson_id: i64,
    ) -> Result<Enrollment, DbError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO lesson_progress (user_id, lesson_id, completed, completed_at)
            VALUES ($1, $2, TRUE, NOW())
            ON CONFLICT (user_id, lesson_id)
            DO UPDATE SET completed = TRUE,
                          completed_at = COALESCE(lesson_progress.completed_at, NOW()),
                          updated_at = NOW()
            "#,
        )
        .bind(user_id)
        .bind(lesson_id)
        .execute(&mut *tx)
        .await?;

        let (total, done): (i64, i64) = sqlx::query_as(
            r#"
            SELECT COUNT(l.id),
                   COUNT(lp.id) FILTER (WHERE lp.completed)
            FROM lessons l
            JOIN course_sections s ON s.id = l.section_id
            LEFT JOIN lesson_progress lp ON lp.lesson_id = l.id AND lp.user_id = $1
            WHERE s.course_id = $2
            "#,
        )
        .bind(user_id)
        .bind(course_id)
        .fetch_one(&mut *tx)
        .await?;

        let progress = progress_percent(done, total);
        let enrollment = sqlx::query_as::<_, Enrollment>(
            r#"
            UPDATE enrollments SET
                progress = $3,
                completed = $4,
                completion_date = CASE WHEN $4 THEN COALESCE(completion_date, NOW()) ELSE NULL END,
                last_accessed_at = NOW()
            WHERE user_id = $1 AND course_id = $2
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(course_id)
        .bind(progress)
        .bind(is_complete(progress))
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(DbError::NotFound)?;

        tx.commit().await?;
        Ok(enrollment)
    }

    pub async fn list_user_enrollments(&self, user_id: i64) -> Result<Vec<EnrollmentWithCourse>, DbError> {
        let rows = sqlx::query_as::<_, EnrollmentWithCourse>(
            r#"
            SELECT e.id AS enrollment_id, c.id AS course_id, c.course_code, c.title, c.type,
                   e.progress, e.completed, e.enrolled_at, e.last_accessed_at
            FROM enrollments e
            JOIN courses c ON c.id = e.course_id
            WHERE e.user_id = $1
            ORDER BY e.last_accessed_at DESC NULLS LAST, e.enrolled_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

/// Recomputes progress for every enrollment in a course inside the caller's
/// transaction. Returns how many enrollments were rewritten.
pub(crate) async fn refresh_course_progress(conn: &mut PgConnection, course_id: i64) -> Result<u64, DbError> {
    let total: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(l.id)
        FROM lessons l
        JOIN course_sections s ON s.id = l.section_id
        WHERE s.course_id = $1
        "#,
    )
    .bind(course_id)
    .fetch_one(&mut *conn)
    .await?;

    let done_per_enrollment: Vec<(i64, i64)> = sqlx::query_as(
        r#"
        SELECT e.id,
               COUNT(lp.id) FILTER (WHERE lp.completed AND s.course_id IS NOT NULL)
        FROM enrollments e
        LEFT JOIN lesson_progress lp ON lp.user_id = e.user_id
        LEFT JOIN lessons l ON l.id = lp.lesson_id
        LEFT JOIN course_sections s ON s.id = l.section_id AND s.course_id = e.course_id
        WHERE e.course_id = $1
        GROUP BY e.id
        "#,
    )
    .bind(course_id)
    .fetch_all(&mut *conn)
    .await?;

    for (enrollment_id, done) in &done_per_enrollment {
        let progress = progress_percent(*done, total);
        sqlx::query(
            r#"
            UPDATE enrollments SET
                progress = $2,
                completed = $3,
                completion_date = CASE WHEN $3 THEN COALESCE(completion_date, NOW()) ELSE NULL END
            WHERE id = $1
            "#,
        )
        .bind(enrollment_id)
        .bind(progress)
        .bind(is_complete(progress))
        .execute(&mut *conn)
        .await?;
    }

    Ok(done_per_enrollment.len() as u64)
}
