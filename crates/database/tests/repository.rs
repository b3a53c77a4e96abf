//! Repository tests against a live Postgres. `sqlx::test` creates a fresh
//! database per test from `DATABASE_URL` and applies the migrations.
//!
//! Run with `cargo test -p database -- --ignored`.

use chrono::NaiveDate;
use core_types::{
    CourseStatus, CourseType, DifficultyLevel, LessonType, ProgramStatus, SignInMethod, UserType,
};
use database::{
    DbError, DbRepository, NewAttendee, NewCourse, NewLesson, NewSection, NewUser, ProgramRecord,
    RegistrationOutcome,
};
use rust_decimal::Decimal;
use sqlx::PgPool;

async fn member(repo: &DbRepository, username: &str) -> i64 {
    repo.create_user(&NewUser {
        username: username.to_string(),
        email: format!("{username}@example.org"),
        password_hash: "not-a-real-hash".to_string(),
        name: "Test".to_string(),
        surname: "Member".to_string(),
        user_type: UserType::Member,
        phone: None,
        school: None,
        grade: None,
    })
    .await
    .unwrap()
    .id
}

async fn course(repo: &DbRepository, created_by: i64, code: &str) -> i64 {
    repo.create_course(&NewCourse {
        course_code: code.to_string(),
        title: "Intro to Robotics".to_string(),
        description: "Build and program a small robot.".to_string(),
        course_type: CourseType::FullCourse,
        difficulty_level: DifficultyLevel::Beginner,
        duration: 10,
        image_path: None,
        is_featured: false,
        is_published: true,
        status: CourseStatus::Active,
        created_by,
    })
    .await
    .unwrap()
    .id
}

async fn section(repo: &DbRepository, course_id: i64) -> i64 {
    repo.create_course_section(
        course_id,
        &NewSection {
            module_id: None,
            title: "Getting started".to_string(),
            description: None,
            order_number: None,
        },
    )
    .await
    .unwrap()
    .id
}

async fn lesson(repo: &DbRepository, section_id: i64, title: &str) -> i64 {
    repo.create_lesson(
        section_id,
        &NewLesson {
            title: title.to_string(),
            description: None,
            content: Some("Read the notes.".to_string()),
            lesson_type: LessonType::Text,
            order_number: None,
            duration: 15,
            is_published: true,
        },
    )
    .await
    .unwrap()
    .id
}

fn program(max_participants: i32) -> ProgramRecord {
    ProgramRecord {
        term: "Term 3".to_string(),
        title: "Winter Makers Camp".to_string(),
        description: None,
        dates: "1 - 5 July".to_string(),
        start_date: NaiveDate::from_ymd_opt(2026, 7, 1).unwrap(),
        end_date: NaiveDate::from_ymd_opt(2026, 7, 5).unwrap(),
        time: "09:00 - 15:00".to_string(),
        location: "Clubhouse".to_string(),
        age_range: "9-18".to_string(),
        max_participants,
        lunch_included: true,
        registration_open: true,
        status: ProgramStatus::Published,
    }
}

fn attendee(program_id: i64, email: &str, mentor: bool) -> NewAttendee {
    NewAttendee {
        program_id,
        user_id: None,
        first_name: "Lebo".to_string(),
        last_name: "Dlamini".to_string(),
        email: email.to_string(),
        phone: "0110000000".to_string(),
        date_of_birth: NaiveDate::from_ymd_opt(2012, 3, 14).unwrap(),
        gender: "Female".to_string(),
        school: "Sci-Bono Academy".to_string(),
        grade: "8".to_string(),
        mentor_registration: mentor,
    }
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "needs a Postgres DATABASE_URL"]
async fn enrolling_twice_is_a_conflict(pool: PgPool) {
    let repo = DbRepository::new(pool);
    let user = member(&repo, "thandi").await;
    let course = course(&repo, user, "ROB-101").await;

    repo.enroll_user(user, course).await.unwrap();
    let err = repo.enroll_user(user, course).await.unwrap_err();
    assert!(matches!(err, DbError::Conflict(_)));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "needs a Postgres DATABASE_URL"]
async fn enrollment_count_follows_enrollments(pool: PgPool) {
    let repo = DbRepository::new(pool);
    let first = member(&repo, "sipho").await;
    let second = member(&repo, "naledi").await;
    let course = course(&repo, first, "ROB-102").await;

    repo.enroll_user(first, course).await.unwrap();
    repo.enroll_user(second, course).await.unwrap();
    assert_eq!(repo.get_course(course).await.unwrap().enrollment_count, 2);

    repo.unenroll_user(first, course).await.unwrap();
    assert_eq!(repo.get_course(course).await.unwrap().enrollment_count, 1);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "needs a Postgres DATABASE_URL"]
async fn progress_tracks_lessons_completed_and_lesson_changes(pool: PgPool) {
    let repo = DbRepository::new(pool);
    let user = member(&repo, "kabelo").await;
    let course = course(&repo, user, "ROB-103").await;
    let section = section(&repo, course).await;
    let first = lesson(&repo, section, "Motors").await;
    let second = lesson(&repo, section, "Sensors").await;
    repo.enroll_user(user, course).await.unwrap();

    let enrollment = repo.complete_lesson(user, course, first).await.unwrap();
    assert_eq!(enrollment.progress, Decimal::new(5000, 2));
    assert!(!enrollment.completed);

    // A new lesson dilutes progress for everyone enrolled.
    let third = lesson(&repo, section, "Loops").await;
    let enrollment = repo.get_enrollment(user, course).await.unwrap().unwrap();
    assert_eq!(enrollment.progress, Decimal::new(3333, 2));

    // Removing the unfinished lessons completes the course.
    repo.delete_lesson(second).await.unwrap();
    repo.delete_lesson(third).await.unwrap();
    let enrollment = repo.get_enrollment(user, course).await.unwrap().unwrap();
    assert_eq!(enrollment.progress, Decimal::new(10000, 2));
    assert!(enrollment.completed);
    assert!(enrollment.completion_date.is_some());
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "needs a Postgres DATABASE_URL"]
async fn registrations_stop_at_program_and_member_limits(pool: PgPool) {
    let repo = DbRepository::new(pool);
    let small = repo.create_program(&program(1)).await.unwrap();

    let outcome = repo.register_attendee(&attendee(small.id, "a@example.org", false), 30, 5).await;
    assert!(matches!(outcome.unwrap(), RegistrationOutcome::Registered(_)));

    let outcome = repo.register_attendee(&attendee(small.id, "A@example.org", false), 30, 5).await;
    assert!(matches!(outcome.unwrap(), RegistrationOutcome::EmailTaken));

    let outcome = repo.register_attendee(&attendee(small.id, "b@example.org", false), 30, 5).await;
    assert!(matches!(outcome.unwrap(), RegistrationOutcome::ProgramFull));

    let roomy = repo.create_program(&program(50)).await.unwrap();
    repo.register_attendee(&attendee(roomy.id, "c@example.org", false), 1, 1).await.unwrap();
    let outcome = repo.register_attendee(&attendee(roomy.id, "d@example.org", false), 1, 1).await;
    assert!(matches!(outcome.unwrap(), RegistrationOutcome::MemberCapacityFull));

    // Mentors have their own pool of seats.
    let outcome = repo.register_attendee(&attendee(roomy.id, "e@example.org", true), 1, 1).await;
    assert!(matches!(outcome.unwrap(), RegistrationOutcome::Registered(_)));
    let outcome = repo.register_attendee(&attendee(roomy.id, "f@example.org", true), 1, 1).await;
    assert!(matches!(outcome.unwrap(), RegistrationOutcome::MentorCapacityFull));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "needs a Postgres DATABASE_URL"]
async fn second_sign_in_on_the_same_day_is_a_conflict(pool: PgPool) {
    let repo = DbRepository::new(pool);
    let user = member(&repo, "ayanda").await;

    repo.sign_in(user, SignInMethod::Manual, Some("Main hall"), None).await.unwrap();
    let err = repo.sign_in(user, SignInMethod::Manual, None, None).await.unwrap_err();
    assert!(matches!(err, DbError::Conflict(_)));
    let today = repo.todays_attendance(user).await.unwrap().unwrap();
    assert_eq!(today.location.as_deref(), Some("Main hall"));
    assert_eq!(today.attendance_date, repo.current_date().await.unwrap());
}
