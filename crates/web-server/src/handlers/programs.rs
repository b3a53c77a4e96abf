use crate::{
    auth::AdminUser,
    error::AppError,
    extract::{flag, parse_id, ApiQuery, Payload},
    handlers::{page_request, parse_filter, OrNotFound},
    response::{ApiResponse, Paginated},
    AppState,
};
use axum::{
    extract::{Path, State},
    http::HeaderMap,
};
use core_types::{
    program::{
        check_program_window, parse_program_window, plan_capacity_change, program_dates_label,
        DEFAULT_AGE_RANGE, DEFAULT_LOCATION, DEFAULT_MAX_PARTICIPANTS, DEFAULT_TIME,
    },
    validation::{clean, parse_flexible_date, parse_iso_date},
    CapacityChange, CapacityInfo, MentorStatus, ProgramStatus, RegistrationStatus, Validator,
};
use database::{Attendee, HolidayProgram, NewAttendee, ProgramRecord, RegistrationOutcome};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const DEFAULT_REGISTRATION_LIMIT: i64 = 50;
const MAX_REGISTRATION_LIMIT: i64 = 500;

#[derive(Debug, Deserialize)]
pub struct ProgramListQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    pub status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ProgramRequest {
    pub term: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub dates: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub time: Option<String>,
    pub location: Option<String>,
    pub age_range: Option<String>,
    pub max_participants: Option<i32>,
    #[serde(default, deserialize_with = "flag::option")]
    pub lunch_included: Option<bool>,
    #[serde(default, deserialize_with = "flag::option")]
    pub registration_open: Option<bool>,
    pub status: Option<String>,
}

fn bad_request(message: &str) -> AppError {
    AppError::BadRequest(message.to_string())
}

fn check_max_participants(value: Option<i32>) -> Result<(), AppError> {
    match value {
        Some(max) if max < 1 => Err(bad_request("Maximum participants must be at least 1")),
        _ => Ok(()),
    }
}

/// Rejects a field that is present but blank.
fn reject_blank(value: &Option<String>, message: &str) -> Result<(), AppError> {
    if matches!(value, Some(v) if v.trim().is_empty()) {
        return Err(bad_request(message));
    }
    Ok(())
}

impl ProgramRequest {
    fn into_record(self) -> Result<ProgramRecord, AppError> {
        let term = clean(self.term).ok_or_else(|| bad_request("Program term is required"))?;
        let title = clean(self.title).ok_or_else(|| bad_request("Program title is required"))?;
        let start = clean(self.start_date).ok_or_else(|| bad_request("Start date is required"))?;
        let end = clean(self.end_date).ok_or_else(|| bad_request("End date is required"))?;
        let (start_date, end_date) = parse_program_window(&start, &end)?;
        check_max_participants(self.max_participants)?;

        Ok(ProgramRecord {
            term,
            title,
            description: clean(self.description),
            dates: clean(self.dates).unwrap_or_else(|| program_dates_label(start_date, end_date)),
            start_date,
            end_date,
            time: clean(self.time).unwrap_or_else(|| DEFAULT_TIME.to_string()),
            location: clean(self.location).unwrap_or_else(|| DEFAULT_LOCATION.to_string()),
            age_range: clean(self.age_range).unwrap_or_else(|| DEFAULT_AGE_RANGE.to_string()),
            max_participants: self.max_participants.unwrap_or(DEFAULT_MAX_PARTICIPANTS),
            lunch_included: self.lunch_included.unwrap_or(true),
            registration_open: self.registration_open.unwrap_or(true),
            status: parse_filter(self.status.as_deref())?.unwrap_or_default(),
        })
    }

    /// Applies the provided fields over the stored program.
    fn merge_into(self, mut record: ProgramRecord) -> Result<ProgramRecord, AppError> {
        reject_blank(&self.term, "Program term cannot be empty")?;
        reject_blank(&self.title, "Program title cannot be empty")?;
        reject_blank(&self.start_date, "Start date cannot be empty")?;
        reject_blank(&self.end_date, "End date cannot be empty")?;
        check_max_participants(self.max_participants)?;

        let mut window_changed = false;
        if let Some(start) = clean(self.start_date) {
            record.start_date = parse_iso_date(&start)
                .ok_or_else(|| bad_request("Invalid start date format. Use YYYY-MM-DD"))?;
            window_changed = true;
        }
        if let Some(end) = clean(self.end_date) {
            record.end_date = parse_iso_date(&end)
                .ok_or_else(|| bad_request("Invalid end date format. Use YYYY-MM-DD"))?;
            window_changed = true;
        }
        check_program_window(record.start_date, record.end_date)?;

        if let Some(term) = clean(self.term) {
            record.term = term;
        }
        if let Some(title) = clean(self.title) {
            record.title = title;
        }
        if let Some(description) = self.description {
            record.description = clean(Some(description));
        }
        match clean(self.dates) {
            Some(dates) => record.dates = dates,
            None if window_changed => {
                record.dates = program_dates_label(record.start_date, record.end_date)
            }
            None => {}
        }
        if let Some(time) = clean(self.time) {
            record.time = time;
        }
        if let Some(location) = clean(self.location) {
            record.location = location;
        }
        if let Some(age_range) = clean(self.age_range) {
            record.age_range = age_range;
        }
        if let Some(max) = self.max_participants {
            record.max_participants = max;
        }
        if let Some(lunch) = self.lunch_included {
            record.lunch_included = lunch;
        }
        if let Some(open) = self.registration_open {
            record.registration_open = open;
        }
        if let Some(status) = parse_filter::<ProgramStatus>(self.status.as_deref())? {
            record.status = status;
        }
        Ok(record)
    }
}

#[derive(Debug, Serialize)]
pub struct ProgramDetail {
    #[serde(flatten)]
    pub program: HolidayProgram,
    pub capacity: CapacityInfo,
}

#[derive(Debug, Deserialize)]
pub struct RegistrationListQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct RegistrationList {
    pub program_id: i64,
    pub registrations: Vec<Attendee>,
    pub count: usize,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Deserialize)]
pub struct CapacityRequest {
    pub max_participants: Option<i32>,
}

#[derive(Debug, Serialize)]
pub struct CapacityUpdated {
    pub program_id: i64,
    #[serde(flatten)]
    pub change: CapacityChange,
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RegistrationRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub date_of_birth: Option<String>,
    pub gender: Option<String>,
    pub school: Option<String>,
    pub grade: Option<String>,
    #[serde(default, deserialize_with = "flag::option")]
    pub mentor_registration: Option<bool>,
}

impl RegistrationRequest {
    fn into_attendee(self, program_id: i64, user_id: Option<i64>) -> Result<NewAttendee, AppError> {
        let mut v = Validator::new();
        v.required("first_name", self.first_name.as_deref())
            .required("last_name", self.last_name.as_deref())
            .required("email", self.email.as_deref())
            .email("email", self.email.as_deref())
            .required("phone", self.phone.as_deref())
            .phone("phone", self.phone.as_deref())
            .required("date_of_birth", self.date_of_birth.as_deref())
            .date("date_of_birth", self.date_of_birth.as_deref())
            .required("gender", self.gender.as_deref())
            .required("school", self.school.as_deref())
            .required("grade", self.grade.as_deref());
        v.finish()?;

        let date_of_birth = self
            .date_of_birth
            .as_deref()
            .map(str::trim)
            .and_then(parse_flexible_date)
            .ok_or_else(|| AppError::field("date_of_birth", "The Date Of Birth field must be a valid date."))?;

        Ok(NewAttendee {
            program_id,
            user_id,
            first_name: clean(self.first_name).unwrap_or_default(),
            last_name: clean(self.last_name).unwrap_or_default(),
            email: clean(self.email).unwrap_or_default().to_lowercase(),
            phone: clean(self.phone).unwrap_or_default(),
            date_of_birth,
            gender: clean(self.gender).unwrap_or_default(),
            school: clean(self.school).unwrap_or_default(),
            grade: clean(self.grade).unwrap_or_default(),
            mentor_registration: self.mentor_registration.unwrap_or(false),
        })
    }
}

async fn program_detail(state: &AppState, program: HolidayProgram) -> Result<ProgramDetail, AppError> {
    let counts = state.db_repo.registration_counts(program.id).await?;
    let capacity = CapacityInfo::new(
        program.max_participants,
        counts,
        state.settings.programs.member_capacity,
        state.settings.programs.mentor_capacity,
    );
    Ok(ProgramDetail { program, capacity })
}

/// # GET /api/v1/admin/programs
pub async fn list_programs(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    ApiQuery(query): ApiQuery<ProgramListQuery>,
) -> Result<ApiResponse<Paginated<HolidayProgram>>, AppError> {
    let status = parse_filter(query.status.as_deref())?;
    let page = page_request(query.page, query.per_page);
    let (programs, total) = state.db_repo.list_programs(status, false, page).await?;
    Ok(ApiResponse::with_message(
        Paginated::new(programs, page.page, page.per_page, total),
        "Programs retrieved successfully",
    ))
}

/// # GET /api/v1/admin/programs/:id
pub async fn get_program(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Path(id): Path<String>,
) -> Result<ApiResponse<ProgramDetail>, AppError> {
    let id = parse_id(&id, "program")?;
    let program = state.db_repo.get_program(id).await.or_not_found("Program not found")?;
    let detail = program_detail(&state, program).await?;
    Ok(ApiResponse::with_message(detail, "Program retrieved successfully"))
}

/// # POST /api/v1/admin/programs
pub async fn create_program(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Payload(req): Payload<ProgramRequest>,
) -> Result<ApiResponse<HolidayProgram>, AppError> {
    let record = req.into_record()?;
    let program = state.db_repo.create_program(&record).await?;
    tracing::info!(program_id = program.id, term = %program.term, admin_id = admin.id, "Holiday program created");
    Ok(ApiResponse::created(program, "Holiday program created successfully"))
}

/// # PUT /api/v1/admin/programs/:id
pub async fn update_program(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
    Payload(req): Payload<ProgramRequest>,
) -> Result<ApiResponse<HolidayProgram>, AppError> {
    let id = parse_id(&id, "program")?;
    let existing = state.db_repo.get_program(id).await.or_not_found("Program not found")?;
    let previous_max = existing.max_participants;
    let record = req.merge_into(ProgramRecord::from(existing))?;
    if record.max_participants < previous_max {
        let registrations = state.db_repo.registration_counts(id).await?.total;
        plan_capacity_change(record.max_participants, registrations)?;
    }
    let program = state
        .db_repo
        .update_program(id, &record)
        .await
        .or_not_found("Program not found")?;
    tracing::info!(program_id = id, admin_id = admin.id, "Holiday program updated");
    Ok(ApiResponse::with_message(program, "Holiday program updated successfully"))
}

/// # DELETE /api/v1/admin/programs/:id
pub async fn delete_program(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
) -> Result<ApiResponse<()>, AppError> {
    let id = parse_id(&id, "program")?;
    state.db_repo.get_program(id).await.or_not_found("Program not found")?;
    if state.db_repo.count_program_registrations(id).await? > 0 {
        return Err(bad_request("Cannot delete program with existing registrations"));
    }
    state.db_repo.delete_program(id).await.or_not_found("Program not found")?;
    tracing::info!(program_id = id, admin_id = admin.id, "Holiday program deleted");
    Ok(ApiResponse::deleted("Holiday program deleted successfully"))
}

/// # GET /api/v1/admin/programs/:id/registrations
pub async fn list_registrations(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Path(id): Path<String>,
    ApiQuery(query): ApiQuery<RegistrationListQuery>,
) -> Result<ApiResponse<RegistrationList>, AppError> {
    let id = parse_id(&id, "program")?;
    state.db_repo.get_program(id).await.or_not_found("Program not found")?;
    let limit = query
        .limit
        .unwrap_or(DEFAULT_REGISTRATION_LIMIT)
        .clamp(1, MAX_REGISTRATION_LIMIT);
    let offset = query.offset.unwrap_or(0).max(0);
    let (registrations, total) = state.db_repo.list_program_registrations(id, limit, offset).await?;
    Ok(ApiResponse::with_message(
        RegistrationList {
            program_id: id,
            count: registrations.len(),
            registrations,
            total,
            limit,
            offset,
        },
        "Registrations retrieved successfully",
    ))
}

/// # PUT /api/v1/admin/programs/:id/capacity
pub async fn update_capacity(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
    Payload(req): Payload<CapacityRequest>,
) -> Result<ApiResponse<CapacityUpdated>, AppError> {
    let id = parse_id(&id, "program")?;
    state.db_repo.get_program(id).await.or_not_found("Program not found")?;
    let max_participants = req
        .max_participants
        .ok_or_else(|| bad_request("Maximum participants is required"))?;

    let current = state.db_repo.registration_counts(id).await?.total;
    let change = plan_capacity_change(max_participants, current)?;
    state
        .db_repo
        .set_program_capacity(id, change.max_participants)
        .await
        .or_not_found("Program not found")?;
    tracing::info!(
        program_id = id,
        max_participants = change.max_participants,
        current_registrations = change.current_registrations,
        admin_id = admin.id,
        "Program capacity updated"
    );
    Ok(ApiResponse::with_message(
        CapacityUpdated {
            program_id: id,
            change,
        },
        "Program capacity updated successfully",
    ))
}

/// # PUT /api/v1/admin/registrations/:id/status
pub async fn update_registration_status(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
    Payload(req): Payload<StatusRequest>,
) -> Result<ApiResponse<Attendee>, AppError> {
    let id = parse_id(&id, "registration")?;
    let status: RegistrationStatus = req
        .status
        .as_deref()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| {
            AppError::BadRequest(format!(
                "Invalid status. Must be one of: {}",
                RegistrationStatus::allowed()
            ))
        })?;
    let attendee = state
        .db_repo
        .set_registration_status(id, status)
        .await
        .or_not_found("Registration not found")?;
    tracing::info!(registration_id = id, status = %status, admin_id = admin.id, "Registration status updated");
    Ok(ApiResponse::with_message(attendee, "Registration status updated successfully"))
}

/// # PUT /api/v1/admin/registrations/:id/mentor-status
/// Approves or declines a mentor application.
pub async fn update_mentor_status(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
    Payload(req): Payload<StatusRequest>,
) -> Result<ApiResponse<Attendee>, AppError> {
    let id = parse_id(&id, "registration")?;
    let status: MentorStatus = req
        .status
        .as_deref()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| {
            AppError::BadRequest(format!(
                "Invalid status. Must be one of: {}",
                MentorStatus::allowed()
            ))
        })?;
    let attendee = state
        .db_repo
        .set_mentor_status(id, status)
        .await
        .or_not_found("Mentor registration not found")?;
    tracing::info!(registration_id = id, status = %status, admin_id = admin.id, "Mentor status updated");
    Ok(ApiResponse::with_message(attendee, "Mentor status updated successfully"))
}

/// # GET /api/v1/programs
/// Programs that are published or running and still taking registrations.
pub async fn list_public_programs(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<ProgramListQuery>,
) -> Result<ApiResponse<Paginated<HolidayProgram>>, AppError> {
    let page = page_request(query.page, query.per_page);
    let (programs, total) = state.db_repo.list_programs(None, true, page).await?;
    Ok(ApiResponse::with_message(
        Paginated::new(programs, page.page, page.per_page, total),
        "Programs retrieved successfully",
    ))
}

/// # GET /api/v1/programs/:id
pub async fn get_public_program(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<ApiResponse<ProgramDetail>, AppError> {
    let id = parse_id(&id, "program")?;
    let program = state.db_repo.get_program(id).await.or_not_found("Program not found")?;
    if !program.status.is_public() {
        return Err(AppError::NotFound("Program not found".to_string()));
    }
    let detail = program_detail(&state, program).await?;
    Ok(ApiResponse::with_message(detail, "Program retrieved successfully"))
}

/// # POST /api/v1/programs/:id/register
/// Open to visitors; a valid bearer token links the registration to the account.
pub async fn register(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Payload(req): Payload<RegistrationRequest>,
) -> Result<ApiResponse<Attendee>, AppError> {
    let program_id = parse_id(&id, "program")?;
    let user_id = state.jwt.user_id_from_headers(&headers);
    let attendee = req.into_attendee(program_id, user_id)?;

    let outcome = state
        .db_repo
        .register_attendee(
            &attendee,
            state.settings.programs.member_capacity,
            state.settings.programs.mentor_capacity,
        )
        .await
        .or_not_found("Program not found")?;

    match outcome {
        RegistrationOutcome::Registered(attendee) => {
            tracing::info!(
                program_id,
                registration_id = attendee.id,
                mentor = attendee.mentor_registration,
                "Program registration received"
            );
            Ok(ApiResponse::created(attendee, "Registration successful"))
        }
        RegistrationOutcome::RegistrationClosed => {
            Err(bad_request("Registration is closed for this program"))
        }
        RegistrationOutcome::EmailTaken => Err(AppError::Conflict(
            "This email is already registered for this program".to_string(),
        )),
        RegistrationOutcome::ProgramFull => Err(AppError::Conflict("Program is full".to_string())),
        RegistrationOutcome::MemberCapacityFull => {
            Err(AppError::Conflict("Member capacity is full".to_string()))
        }
        RegistrationOutcome::MentorCapacityFull => {
            Err(AppError::Conflict("Mentor capacity is full".to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn valid_program() -> ProgramRequest {
        ProgramRequest {
            term: Some("Term 1".into()),
            title: Some("Robotics Week".into()),
            start_date: Some("2026-01-05".into()),
            end_date: Some("2026-01-16".into()),
            ..ProgramRequest::default()
        }
    }

    #[test]
    fn create_fills_defaults() {
        let record = valid_program().into_record().unwrap();
        assert_eq!(record.dates, "Jan 5 - Jan 16, 2026");
        assert_eq!(record.time, DEFAULT_TIME);
        assert_eq!(record.location, DEFAULT_LOCATION);
        assert_eq!(record.age_range, DEFAULT_AGE_RANGE);
        assert_eq!(record.max_participants, 30);
        assert!(record.lunch_included && record.registration_open);
        assert_eq!(record.status, ProgramStatus::Draft);
    }

    #[test]
    fn create_checks_required_fields_in_order() {
        let err = ProgramRequest::default().into_record().unwrap_err();
        assert_eq!(err.to_string(), "Bad request: Program term is required");

        let err = ProgramRequest {
            end_date: None,
            ..valid_program()
        }
        .into_record()
        .unwrap_err();
        assert_eq!(err.to_string(), "Bad request: End date is required");
    }

    #[test]
    fn create_validates_dates() {
        let err = ProgramRequest {
            start_date: Some("05/01/2026".into()),
            ..valid_program()
        }
        .into_record()
        .unwrap_err();
        assert_eq!(err.to_string(), "Bad request: Invalid start date format. Use YYYY-MM-DD");

        let err = ProgramRequest {
            end_date: Some("2026-01-01".into()),
            ..valid_program()
        }
        .into_record()
        .unwrap_err();
        assert_eq!(err.to_string(), "Bad request: End date must be after start date");
    }

    #[test]
    fn update_merges_and_relabels() {
        let stored = valid_program().into_record().unwrap();
        let merged = ProgramRequest {
            end_date: Some("2026-01-09".into()),
            location: Some("Main Hall".into()),
            ..ProgramRequest::default()
        }
        .merge_into(stored.clone())
        .unwrap();
        assert_eq!(merged.end_date, date(2026, 1, 9));
        assert_eq!(merged.dates, "Jan 5 - Jan 9, 2026");
        assert_eq!(merged.location, "Main Hall");
        assert_eq!(merged.title, stored.title);
    }

    #[test]
    fn lowered_limit_must_hold_current_registrations() {
        let stored = valid_program().into_record().unwrap();
        let merged = ProgramRequest {
            max_participants: Some(10),
            ..ProgramRequest::default()
        }
        .merge_into(stored)
        .unwrap();
        assert_eq!(merged.max_participants, 10);

        let err = AppError::from(plan_capacity_change(merged.max_participants, 12).unwrap_err());
        assert_eq!(
            err.to_string(),
            "Bad request: Cannot set capacity to 10. Current registrations: 12"
        );
        assert!(plan_capacity_change(merged.max_participants, 10).is_ok());
    }

    #[test]
    fn update_rejects_blank_and_inverted_windows() {
        let stored = valid_program().into_record().unwrap();
        let err = ProgramRequest {
            title: Some(" ".into()),
            ..ProgramRequest::default()
        }
        .merge_into(stored.clone())
        .unwrap_err();
        assert_eq!(err.to_string(), "Bad request: Program title cannot be empty");

        let err = ProgramRequest {
            start_date: Some("2026-02-01".into()),
            ..ProgramRequest::default()
        }
        .merge_into(stored)
        .unwrap_err();
        assert_eq!(err.to_string(), "Bad request: End date must be after start date");
    }

    #[test]
    fn registration_requires_contact_details() {
        let err = RegistrationRequest::default().into_attendee(1, None).unwrap_err();
        match err {
            AppError::Validation(errors) => {
                for field in ["first_name", "last_name", "email", "phone", "date_of_birth", "gender", "school", "grade"] {
                    assert!(errors.has(field), "{}", field);
                }
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn registration_normalises_input() {
        let attendee = RegistrationRequest {
            first_name: Some(" Lerato ".into()),
            last_name: Some("Nkosi".into()),
            email: Some("Lerato@Example.com".into()),
            phone: Some("082 555 0101".into()),
            date_of_birth: Some("2011-04-23".into()),
            gender: Some("Female".into()),
            school: Some("Soweto High".into()),
            grade: Some("9".into()),
            mentor_registration: None,
        }
        .into_attendee(4, Some(12))
        .unwrap();
        assert_eq!(attendee.first_name, "Lerato");
        assert_eq!(attendee.email, "lerato@example.com");
        assert_eq!(attendee.date_of_birth, date(2011, 4, 23));
        assert_eq!(attendee.user_id, Some(12));
        assert!(!attendee.mentor_registration);
    }
}
