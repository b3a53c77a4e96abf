use super::{like_pattern, DbRepository, PageRequest};
use crate::DbError;
use chrono::{DateTime, Utc};
use core_types::UserType;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Represents a row from the `users` table. The password hash is never serialized.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub name: String,
    pub surname: String,
    pub user_type: UserType,
    pub phone: Option<String>,
    pub school: Option<String>,
    pub grade: Option<String>,
    pub active: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub name: String,
    pub surname: String,
    pub user_type: UserType,
    pub phone: Option<String>,
    pub school: Option<String>,
    pub grade: Option<String>,
}

/// A partial update; `None` leaves the column untouched.
#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub email: Option<String>,
    pub name: Option<String>,
    pub surname: Option<String>,
    pub user_type: Option<UserType>,
    pub phone: Option<String>,
    pub school: Option<String>,
    pub grade: Option<String>,
    pub active: Option<bool>,
    pub password_hash: Option<String>,
}

impl UserChanges {
    pub fn is_empty(&self) -> bool {
        self.email.is_none()
            && self.name.is_none()
            && self.surname.is_none()
            && self.user_type.is_none()
            && self.phone.is_none()
            && self.school.is_none()
            && self.grade.is_none()
            && self.active.is_none()
            && self.password_hash.is_none()
    }
}

#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    pub user_type: Option<UserType>,
    pub active: Option<bool>,
    pub search: Option<String>,
}

/// Activity summary shown on the admin user detail endpoint.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct UserStats {
    pub courses_enrolled: i64,
    pub courses_completed: i64,
    pub programs_registered: i64,
    pub total_activity_hours: f64,
}

impl DbRepository {
    pub async fn create_user(&self, user: &NewUser) -> Result<User, DbError> {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (username, email, password_hash, name, surname, user_type, phone, school, grade)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.name)
        .bind(&user.surname)
        .bind(user.user_type)
        .bind(&user.phone)
        .bind(&user.school)
        .bind(&user.grade)
        .fetch_one(&self.pool)
        .await
        .map_err(DbError::from_write)
    }

    pub async fn get_user(&self, id: i64) -> Result<User, DbError> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(DbError::NotFound)
    }

    /// Looks a user up by username or email, case-insensitively.
    pub async fn find_user_by_login(&self, login: &str) -> Result<Option<User>, DbError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT * FROM users WHERE LOWER(username) = LOWER($1) OR LOWER(email) = LOWER($1) LIMIT 1",
        )
        .bind(login)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    pub async fn username_exists(&self, username: &str) -> Result<bool, DbError> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM users WHERE LOWER(username) = LOWER($1))",
        )
        .bind(username)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    /// Whether another account already uses `email`. `exclude_id` skips the
    /// account being updated.
    pub async fn email_exists(&self, email: &str, exclude_id: Option<i64>) -> Result<bool, DbError> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM users WHERE LOWER(email) = LOWER($1) AND ($2::bigint IS NULL OR id <> $2))",
        )
        .bind(email)
        .bind(exclude_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    pub async fn list_users(
        &self,
        filter: &UserFilter,
        page: PageRequest,
    ) -> Result<(Vec<User>, i64), DbError> {
        let pattern = like_pattern(filter.search.as_deref());
        let conditions = r#"
            ($1::text IS NULL OR user_type = $1)
            AND ($2::boolean IS NULL OR active = $2)
            AND ($3::text IS NULL OR username ILIKE $3 OR email ILIKE $3 OR name ILIKE $3 OR surname ILIKE $3)
        "#;

        let total = sqlx::query_scalar::<_, i64>(&format!(
            "SELECT COUNT(*) FROM users WHERE {conditions}"
        ))
        .bind(filter.user_type)
        .bind(filter.active)
        .bind(&pattern)
        .fetch_one(&self.pool)
        .await?;

        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT * FROM users WHERE {conditions} ORDER BY created_at DESC, id DESC LIMIT $4 OFFSET $5"
        ))
        .bind(filter.user_type)
        .bind(filter.active)
        .bind(&pattern)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;

        Ok((users, total))
    }

    pub async fn update_user(&self, id: i64, changes: &UserChanges) -> Result<User, DbError> {
        sqlx::query_as::<_, User>(
            r#"
            UPDATE users SET
                email = COALESCE($2, email),
                name = COALESCE($3, name),
                surname = COALESCE($4, surname),
                user_type = COALESCE($5, user_type),
                phone = COALESCE($6, phone),
                school = COALESCE($7, school),
                grade = COALESCE($8, grade),
                active = COALESCE($9, active),
                password_hash = COALESCE($10, password_hash),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&changes.email)
        .bind(&changes.name)
        .bind(&changes.surname)
        .bind(changes.user_type)
        .bind(&changes.phone)
        .bind(&changes.school)
        .bind(&changes.grade)
        .bind(changes.active)
        .bind(&changes.password_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::from_write)?
        .ok_or(DbError::NotFound)
    }

    /// Soft delete: the account is kept but can no longer sign in.
    pub async fn deactivate_user(&self, id: i64) -> Result<(), DbError> {
        let result = sqlx::query("UPDATE users SET active = FALSE, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    pub async fn count_active_admins(&self) -> Result<i64, DbError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM users WHERE user_type = 'admin' AND active",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    pub async fn record_login(&self, id: i64) -> Result<(), DbError> {
        sqlx::query("UPDATE users SET last_login_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn get_user_stats(&self, id: i64) -> Result<UserStats, DbError> {
        let stats = sqlx::query_as::<_, UserStats>(
            r#"
            SELECT
                (SELECT COUNT(*) FROM enrollments WHERE user_id = $1) AS courses_enrolled,
                (SELECT COUNT(*) FROM enrollments WHERE user_id = $1 AND completed) AS courses_completed,
                (SELECT COUNT(*) FROM holiday_program_attendees WHERE user_id = $1) AS programs_registered,
                (SELECT ROUND(COALESCE(SUM(duration_minutes), 0) / 60.0, 2)
                   FROM attendance WHERE user_id = $1)::float8 AS total_activity_hours
            "#,
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        Ok(stats)
    }
}
