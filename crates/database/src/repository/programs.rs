use super::{DbRepository, PageRequest};
use crate::DbError;
use chrono::{DateTime, NaiveDate, Utc};
use core_types::{MentorStatus, ProgramStatus, RegistrationCounts, RegistrationStatus};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Represents a row from the `holiday_programs` table.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct HolidayProgram {
    pub id: i64,
    pub term: String,
    pub title: String,
    pub description: Option<String>,
    pub dates: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub time: String,
    pub location: String,
    pub age_range: String,
    pub max_participants: i32,
    pub lunch_included: bool,
    pub registration_open: bool,
    pub status: ProgramStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Every writable program column. Updates merge the request into the stored
/// program first, so the same record serves both inserts and updates.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgramRecord {
    pub term: String,
    pub title: String,
    pub description: Option<String>,
    pub dates: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub time: String,
    pub location: String,
    pub age_range: String,
    pub max_participants: i32,
    pub lunch_included: bool,
    pub registration_open: bool,
    pub status: ProgramStatus,
}

impl From<HolidayProgram> for ProgramRecord {
    fn from(program: HolidayProgram) -> Self {
        Self {
            term: program.term,
            title: program.title,
            description: program.description,
            dates: program.dates,
            start_date: program.start_date,
            end_date: program.end_date,
            time: program.time,
            location: program.location,
            age_range: program.age_range,
            max_participants: program.max_participants,
            lunch_included: program.lunch_included,
            registration_open: program.registration_open,
            status: program.status,
        }
    }
}

/// Represents a row from the `holiday_program_attendees` table.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Attendee {
    pub id: i64,
    pub program_id: i64,
    pub user_id: Option<i64>,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub date_of_birth: NaiveDate,
    pub gender: String,
    pub school: String,
    pub grade: String,
    pub mentor_registration: bool,
    pub mentor_status: Option<MentorStatus>,
    pub status: RegistrationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAttendee {
    pub program_id: i64,
    pub user_id: Option<i64>,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub date_of_birth: NaiveDate,
    pub gender: String,
    pub school: String,
    pub grade: String,
    pub mentor_registration: bool,
}

/// Result of a registration attempt. Rejections are ordinary outcomes, not
/// database failures.
#[derive(Debug, Clone)]
pub enum RegistrationOutcome {
    Registered(Attendee),
    RegistrationClosed,
    EmailTaken,
    ProgramFull,
    MemberCapacityFull,
    MentorCapacityFull,
}

impl DbRepository {
    pub async fn create_program(&self, program: &ProgramRecord) -> Result<HolidayProgram, DbError> {
        sqlx::query_as::<_, HolidayProgram>(
            r#"
            INSERT INTO holiday_programs (term, title, description, dates, start_date, end_date, time,
                                          location, age_range, max_participants, lunch_included,
                                          registration_open, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING *
            "#,
        )
        .bind(&program.term)
        .bind(&program.title)
        .bind(&program.description)
        .bind(&program.dates)
        .bind(program.start_date)
        .bind(program.end_date)
        .bind(&program.time)
        .bind(&program.location)
        .bind(&program.age_range)
        .bind(program.max_participants)
        .bind(program.lunch_included)
        .bind(program.registration_open)
        .bind(program.status)
        .fetch_one(&self.pool)
        .await
        .map_err(DbError::from_write)
    }

    pub async fn get_program(&self, id: i64) -> Result<HolidayProgram, DbError> {
        sqlx::query_as::<_, HolidayProgram>("SELECT * FROM holiday_programs WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(DbError::NotFound)
    }

    /// Lists programs, newest start date first. `public_only` keeps programs
    /// that are published or running and still accept registrations.
    pub async fn list_programs(
        &self,
        status: Option<ProgramStatus>,
        public_only: bool,
        page: PageRequest,
    ) -> Result<(Vec<HolidayProgram>, i64), DbError> {
        let conditions = r#"
            ($1::text IS NULL OR status = $1)
            AND (NOT $2 OR (registration_open AND status IN ('published', 'active')))
        "#;

        let total = sqlx::query_scalar::<_, i64>(&format!(
            "SELECT COUNT(*) FROM holiday_programs WHERE {conditions}"
        ))
        .bind(status)
        .bind(public_only)
        .fetch_one(&self.pool)
        .await?;

        let programs = sqlx::query_as::<_, HolidayProgram>(&format!(
            "SELECT * FROM holiday_programs WHERE {conditions} ORDER BY start_date DESC, id DESC LIMIT $3 OFFSET $4"
        ))
        .bind(status)
        .bind(public_only)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;

        Ok((programs, total))
    }

    pub async fn update_program(&self, id: i64, program: &ProgramRecord) -> Result<HolidayProgram, DbError> {
        sqlx::query_as::<_, HolidayProgram>(
            r#"
            UPDATE holiday_programs SET
                term = $2, title = $3, description = $4, dates = $5, start_date = $6, end_date = $7,
                time = $8, location = $9, age_range = $10, max_participants = $11,
                lunch_included = $12, registration_open = $13, status = $14, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&program.term)
        .bind(&program.title)
        .bind(&program.description)
        .bind(&program.dates)
        .bind(program.start_date)
        .bind(program.end_date)
        .bind(&program.time)
        .bind(&program.location)
        .bind(&program.age_range)
        .bind(program.max_participants)
        .bind(program.lunch_included)
        .bind(program.registration_open)
        .bind(program.status)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(DbError::NotFound)
    }

    pub async fn delete_program(&self, id: i64) -> Result<(), DbError> {
        let result = sqlx::query("DELETE FROM holiday_programs WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    pub async fn set_program_capacity(&self, id: i64, max_participants: i32) -> Result<(), DbError> {
        let result = sqlx::query(
            "UPDATE holiday_programs SET max_participants = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(max_participants)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    /// Every registration row for the program, canceled ones included.
    pub async fn count_program_registrations(&self, program_id: i64) -> Result<i64, DbError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM holiday_program_attendees WHERE program_id = $1",
        )
        .bind(program_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    /// Head counts by status and participant kind. Canceled registrations
    /// do not hold a seat and are left out of the totals.
    pub async fn registration_counts(&self, program_id: i64) -> Result<RegistrationCounts, DbError> {
        let (total, confirmed, pending, mentors, members): (i64, i64, i64, i64, i64) =
            sqlx::query_as(
                r#"
                SELECT
                    COUNT(*) FILTER (WHERE status <> 'canceled'),
                    COUNT(*) FILTER (WHERE status = 'confirmed'),
                    COUNT(*) FILTER (WHERE status = 'pending'),
                    COUNT(*) FILTER (WHERE mentor_registration AND status <> 'canceled'),
                    COUNT(*) FILTER (WHERE NOT mentor_registration AND status <> 'canceled')
                FROM holiday_program_attendees
                WHERE program_id = $1
                "#,
            )
            .bind(program_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(RegistrationCounts {
            total,
            confirmed,
            pending,
            mentors,
            members,
        })
    }

    pub async fn list_program_registrations(
        &self,
        program_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Attendee>, i64), DbError> {
        let total = self.count_program_registrations(program_id).await?;
        let attendees = sqlx::query_as::<_, Attendee>(
            "SELECT * FROM holiday_program_attendees WHERE program_id = $1 ORDER BY created_at DESC, id DESC LIMIT $2 OFFSET $3",
        )
        .bind(program_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok((attendees, total))
    }

    /// Registers an attendee while holding a row lock on the program, so
    /// concurrent sign-ups cannot overshoot the seat limits.
    pub async fn register_attendee(
        &self,
        attendee: &NewAttendee,
        member_capacity: i64,
        mentor_capacity: i64,
    ) -> Result<RegistrationOutcome, DbError> {
        let mut tx = self.pool.begin().await?;

        let (max_participants, registration_open, status): (i32, bool, ProgramStatus) =
            sqlx::query_as(
                "SELECT max_participants, registration_open, status FROM holiday_programs WHERE id = $1 FOR UPDATE",
            )
            .bind(attendee.program_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(DbError::NotFound)?;

        if !registration_open || !status.is_public() {
            return Ok(RegistrationOutcome::RegistrationClosed);
        }

        let email_taken = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM holiday_program_attendees WHERE program_id = $1 AND LOWER(email) = LOWER($2))",
        )
        .bind(attendee.program_id)
        .bind(&attendee.email)
        .fetch_one(&mut *tx)
        .await?;
        if email_taken {
            return Ok(RegistrationOutcome::EmailTaken);
        }

        let (mentors, members): (i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE mentor_registration),
                COUNT(*) FILTER (WHERE NOT mentor_registration)
            FROM holiday_program_attendees
            WHERE program_id = $1 AND status <> 'canceled'
            "#,
        )
        .bind(attendee.program_id)
        .fetch_one(&mut *tx)
        .await?;

        if attendee.mentor_registration {
            if mentors >= mentor_capacity {
                return Ok(RegistrationOutcome::MentorCapacityFull);
            }
        } else {
            if members >= member_capacity {
                return Ok(RegistrationOutcome::MemberCapacityFull);
            }
            if members >= i64::from(max_participants) {
                return Ok(RegistrationOutcome::ProgramFull);
            }
        }

        let mentor_status = attendee.mentor_registration.then_some(MentorStatus::Pending);
        let created = sqlx::query_as::<_, Attendee>(
            r#"
            INSERT INTO holiday_program_attendees (program_id, user_id, first_name, last_name, email, phone,
                                                   date_of_birth, gender, school, grade,
                                                   mentor_registration, mentor_status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING *
            "#,
        )
        .bind(attendee.program_id)
        .bind(attendee.user_id)
        .bind(&attendee.first_name)
        .bind(&attendee.last_name)
        .bind(&attendee.email)
        .bind(&attendee.phone)
        .bind(attendee.date_of_birth)
        .bind(&attendee.gender)
        .bind(&attendee.school)
        .bind(&attendee.grade)
        .bind(attendee.mentor_registration)
        .bind(mentor_status)
        .fetch_one(&mut *tx)
        .await
        .map_err(DbError::from_write)?;

        tx.commit().await?;
        Ok(RegistrationOutcome::Registered(created))
    }

    pub async fn set_registration_status(
        &self,
        id: i64,
        status: RegistrationStatus,
    ) -> Result<Attendee, DbError> {
        sqlx::query_as::<_, Attendee>(
            "UPDATE holiday_program_attendees SET status = $2, updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(status)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(DbError::NotFound)
    }

    /// Sets the review status of a mentor application. Member registrations
    /// are left untouched and reported as not found.
    pub async fn set_mentor_status(&self, id: i64, status: MentorStatus) -> Result<Attendee, DbError> {
        sqlx::query_as::<_, Attendee>(
            r#"
            UPDATE holiday_program_attendees SET mentor_status = $2, updated_at = NOW()
            WHERE id = $1 AND mentor_registration
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(status)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(DbError::NotFound)
    }
}
