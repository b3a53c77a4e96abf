use crate::{
    auth::{hash_password, AdminUser},
    error::AppError,
    extract::{flag, parse_id, ApiQuery, Payload},
    handlers::{page_request, parse_filter, OrNotFound},
    response::{ApiResponse, Paginated},
    AppState,
};
use axum::extract::{Path, State};
use core_types::{validation::clean, UserType, Validator};
use database::{NewUser, User, UserChanges, UserFilter, UserStats};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Deserialize)]
pub struct UserListQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    pub user_type: Option<String>,
    #[serde(default, deserialize_with = "flag::option")]
    pub active: Option<bool>,
    pub search: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UserDetail {
    #[serde(flatten)]
    pub user: User,
    pub stats: UserStats,
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub password_confirmation: Option<String>,
    pub name: Option<String>,
    pub surname: Option<String>,
    pub user_type: Option<String>,
    pub phone: Option<String>,
    pub school: Option<String>,
    pub grade: Option<String>,
}

impl CreateUserRequest {
    fn validate(&self) -> Result<(), AppError> {
        let user_types: Vec<&str> = UserType::ALL.iter().map(|t| t.as_str()).collect();
        let mut v = Validator::new();
        v.required("username", self.username.as_deref())
            .max_len("username", self.username.as_deref(), 50)
            .required("email", self.email.as_deref())
            .email("email", self.email.as_deref())
            .required("password", self.password.as_deref())
            .min_len("password", self.password.as_deref(), MIN_PASSWORD_LEN)
            .required("password_confirmation", self.password_confirmation.as_deref())
            .required("name", self.name.as_deref())
            .required("surname", self.surname.as_deref())
            .required("user_type", self.user_type.as_deref())
            .one_of("user_type", self.user_type.as_deref(), &user_types)
            .phone("phone", self.phone.as_deref());
        if self.password.is_some() && self.password_confirmation.is_some() {
            v.confirmed(
                "password",
                self.password.as_deref(),
                self.password_confirmation.as_deref(),
            );
        }
        v.finish()?;
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateUserRequest {
    pub email: Option<String>,
    pub name: Option<String>,
    pub surname: Option<String>,
    pub user_type: Option<String>,
    pub phone: Option<String>,
    pub school: Option<String>,
    pub grade: Option<String>,
    #[serde(default, deserialize_with = "flag::option")]
    pub active: Option<bool>,
    pub password: Option<String>,
}

impl UpdateUserRequest {
    fn validate(&self) -> Result<(), AppError> {
        let user_types: Vec<&str> = UserType::ALL.iter().map(|t| t.as_str()).collect();
        let mut v = Validator::new();
        v.not_blank("email", self.email.as_deref())
            .email("email", self.email.as_deref())
            .not_blank("name", self.name.as_deref())
            .not_blank("surname", self.surname.as_deref())
            .one_of("user_type", self.user_type.as_deref(), &user_types)
            .phone("phone", self.phone.as_deref())
            .min_len("password", self.password.as_deref(), MIN_PASSWORD_LEN);
        v.finish()?;
        Ok(())
    }
}

/// # GET /api/v1/admin/users
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    ApiQuery(query): ApiQuery<UserListQuery>,
) -> Result<ApiResponse<Paginated<User>>, AppError> {
    let filter = UserFilter {
        user_type: parse_filter(query.user_type.as_deref())?,
        active: query.active,
        search: clean(query.search),
    };
    let page = page_request(query.page, query.per_page);
    let (users, total) = state.db_repo.list_users(&filter, page).await?;
    Ok(ApiResponse::with_message(
        Paginated::new(users, page.page, page.per_page, total),
        "Users retrieved successfully",
    ))
}

/// # GET /api/v1/admin/users/:id
pub async fn get_user(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Path(id): Path<String>,
) -> Result<ApiResponse<UserDetail>, AppError> {
    let id = parse_id(&id, "user")?;
    let user = state.db_repo.get_user(id).await.or_not_found("User not found")?;
    let stats = state.db_repo.get_user_stats(id).await?;
    Ok(ApiResponse::with_message(
        UserDetail { user, stats },
        "User retrieved successfully",
    ))
}

/// # POST /api/v1/admin/users
pub async fn create_user(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Payload(req): Payload<CreateUserRequest>,
) -> Result<ApiResponse<User>, AppError> {
    req.validate()?;

    let username = clean(req.username).unwrap_or_default();
    let email = clean(req.email).unwrap_or_default();
    if state.db_repo.username_exists(&username).await? {
        return Err(AppError::field("username", "Username already exists"));
    }
    if state.db_repo.email_exists(&email, None).await? {
        return Err(AppError::field("email", "Email already exists"));
    }

    let user_type = parse_filter::<UserType>(req.user_type.as_deref())?.unwrap_or(UserType::Member);
    let password_hash = hash_password(req.password.as_deref().unwrap_or_default()).await?;
    let new_user = NewUser {
        username,
        email,
        password_hash,
        name: clean(req.name).unwrap_or_default(),
        surname: clean(req.surname).unwrap_or_default(),
        user_type,
        phone: clean(req.phone),
        school: clean(req.school),
        grade: clean(req.grade),
    };

    let user = state.db_repo.create_user(&new_user).await?;
    tracing::info!(user_id = user.id, created_by = admin.id, user_type = %user.user_type, "User created");
    Ok(ApiResponse::created(user, "User created successfully"))
}

/// # PUT /api/v1/admin/users/:id
pub async fn update_user(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
    Payload(req): Payload<UpdateUserRequest>,
) -> Result<ApiResponse<User>, AppError> {
    let id = parse_id(&id, "user")?;
    req.validate()?;
    let target = state.db_repo.get_user(id).await.or_not_found("User not found")?;

    let email = clean(req.email);
    if let Some(email) = &email {
        if state.db_repo.email_exists(email, Some(id)).await? {
            return Err(AppError::field("email", "Email already exists"));
        }
    }
    let password_hash = match clean(req.password) {
        Some(password) => Some(hash_password(&password).await?),
        None => None,
    };

    let changes = UserChanges {
        email,
        name: clean(req.name),
        surname: clean(req.surname),
        user_type: parse_filter(req.user_type.as_deref())?,
        phone: clean(req.phone),
        school: clean(req.school),
        grade: clean(req.grade),
        active: req.active,
        password_hash,
    };
    if changes.is_empty() {
        return Err(AppError::unprocessable("No valid fields provided for update"));
    }
    if revokes_access(&changes) {
        let active_admins = if target.user_type.is_admin() && target.active {
            state.db_repo.count_active_admins().await?
        } else {
            0
        };
        guard_access_change(admin.id, &target, active_admins)?;
    }

    let user = state
        .db_repo
        .update_user(id, &changes)
        .await
        .or_not_found("User not found")?;
    tracing::info!(user_id = id, updated_by = admin.id, "User updated");
    Ok(ApiResponse::with_message(user, "User updated successfully"))
}

/// True when the update deactivates the account or takes away admin rights.
fn revokes_access(changes: &UserChanges) -> bool {
    changes.active == Some(false) || changes.user_type.is_some_and(|t| !t.is_admin())
}

/// Applies the delete rules to updates that revoke access.
fn guard_access_change(acting_admin: i64, target: &User, active_admins: i64) -> Result<(), AppError> {
    if target.id == acting_admin {
        return Err(AppError::unprocessable("You cannot deactivate or demote your own account"));
    }
    if target.user_type.is_admin() && target.active && active_admins <= 1 {
        return Err(AppError::unprocessable("Cannot deactivate or demote the last active admin"));
    }
    Ok(())
}

/// # DELETE /api/v1/admin/users/:id
/// Deactivates the account; the row is kept.
pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
) -> Result<ApiResponse<()>, AppError> {
    let id = parse_id(&id, "user")?;
    if id == admin.id {
        return Err(AppError::unprocessable("You cannot delete your own account"));
    }

    let user = state.db_repo.get_user(id).await.or_not_found("User not found")?;
    if user.user_type.is_admin() && user.active && state.db_repo.count_active_admins().await? <= 1 {
        return Err(AppError::unprocessable("Cannot delete the last active admin"));
    }

    state.db_repo.deactivate_user(id).await.or_not_found("User not found")?;
    tracing::info!(user_id = id, deleted_by = admin.id, "User deactivated");
    Ok(ApiResponse::deleted("User deleted successfully"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> CreateUserRequest {
        CreateUserRequest {
            username: Some("sipho".into()),
            email: Some("sipho@example.com".into()),
            password: Some("Robotics2026".into()),
            password_confirmation: Some("Robotics2026".into()),
            name: Some("Sipho".into()),
            surname: Some("Dlamini".into()),
            user_type: Some("member".into()),
            phone: None,
            school: None,
            grade: None,
        }
    }

    fn field_errors(err: AppError) -> core_types::ValidationErrors {
        match err {
            AppError::Validation(errors) => errors,
            other => panic!("expected validation errors, got {:?}", other),
        }
    }

    #[test]
    fn create_accepts_complete_payload() {
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn create_reports_every_problem() {
        let req = CreateUserRequest {
            email: Some("not-an-email".into()),
            password: Some("short".into()),
            password_confirmation: Some("different".into()),
            user_type: Some("wizard".into()),
            name: Some("   ".into()),
            ..valid()
        };
        let errors = field_errors(req.validate().unwrap_err());
        assert!(errors.has("email"));
        assert!(errors.has("password"));
        assert!(errors.has("user_type"));
        assert!(errors.has("name"));
        assert!(!errors.has("username"));
        assert_eq!(errors.get("name").unwrap()[0], "The Name field is required.");
    }

    fn account(id: i64, user_type: UserType) -> User {
        let now = chrono::Utc::now();
        User {
            id,
            username: format!("user{}", id),
            email: format!("user{}@example.com", id),
            password_hash: String::new(),
            name: "Lerato".into(),
            surname: "Mokoena".into(),
            user_type,
            phone: None,
            school: None,
            grade: None,
            active: true,
            last_login_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn message(err: AppError) -> String {
        match err {
            AppError::Unprocessable { message, .. } => message,
            other => panic!("expected 422, got {:?}", other),
        }
    }

    #[test]
    fn only_deactivation_or_demotion_revokes_access() {
        assert!(!revokes_access(&UserChanges {
            name: Some("Lerato".into()),
            active: Some(true),
            user_type: Some(UserType::Admin),
            ..UserChanges::default()
        }));
        assert!(revokes_access(&UserChanges {
            active: Some(false),
            ..UserChanges::default()
        }));
        assert!(revokes_access(&UserChanges {
            user_type: Some(UserType::Mentor),
            ..UserChanges::default()
        }));
    }

    #[test]
    fn admins_cannot_revoke_their_own_access() {
        let err = guard_access_change(1, &account(1, UserType::Admin), 3).unwrap_err();
        assert_eq!(message(err), "You cannot deactivate or demote your own account");
    }

    #[test]
    fn last_active_admin_keeps_access() {
        let err = guard_access_change(1, &account(2, UserType::Admin), 1).unwrap_err();
        assert_eq!(message(err), "Cannot deactivate or demote the last active admin");
        assert!(guard_access_change(1, &account(2, UserType::Admin), 2).is_ok());
        assert!(guard_access_change(1, &account(3, UserType::Member), 0).is_ok());
    }

    #[test]
    fn update_rejects_blanked_fields() {
        let req = UpdateUserRequest {
            name: Some("".into()),
            email: Some("x@".into()),
            ..UpdateUserRequest::default()
        };
        let errors = field_errors(req.validate().unwrap_err());
        assert!(errors.has("name"));
        assert!(errors.has("email"));
        assert!(UpdateUserRequest::default().validate().is_ok());
    }
}
