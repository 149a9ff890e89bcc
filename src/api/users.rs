//! Back-office user management (admin only).

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use tracing::info;

use crate::db::{
    CreateUserRequest, ListParams, ListQuery, MessageResponse, Patch, Repository,
    UpdateUserRequest, User, UserRole, UserStatus,
};
use crate::AppState;

use super::auth::{hash_password, CurrentUser};
use super::error::{ApiError, ApiJson, ApiQuery, ValidationErrorBuilder};
use super::validation::{
    clean, clean_nullable, non_blank, validate_email, validate_name, validate_password,
    validate_phone,
};

fn validate_create_request(req: &CreateUserRequest) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();

    errors.check("name", validate_name(non_blank(&req.name), "Name"));
    match non_blank(&req.email) {
        Some(email) => errors.check("email", validate_email(email)),
        None => errors.add("email", "Email is required"),
    };
    match req.password.as_deref() {
        Some(password) => errors.check("password", validate_password(password)),
        None => errors.add("password", "Password is required"),
    };
    if let Some(phone) = non_blank(&req.phone) {
        errors.check("phone", validate_phone(phone));
    }

    errors.finish()
}

fn validate_update_request(req: &UpdateUserRequest) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();

    if req.name.is_some() {
        errors.check("name", validate_name(non_blank(&req.name), "Name"));
    }
    if req.email.is_some() {
        match non_blank(&req.email) {
            Some(email) => errors.check("email", validate_email(email)),
            None => errors.add("email", "Email cannot be empty"),
        };
    }
    if let Some(password) = req.password.as_deref() {
        errors.check("password", validate_password(password));
    }
    if let Some(Some(phone)) = req.phone.as_ref().map(non_blank) {
        errors.check("phone", validate_phone(phone));
    }

    errors.finish()
}

/// List users, newest first
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    ApiQuery(params): ApiQuery<ListParams>,
) -> Result<Json<Vec<User>>, ApiError> {
    let mut query = ListQuery::new().order_by("u.created_at DESC");
    if let Some(status) = params.status {
        query = query.eq("u.status", status);
    }

    let users = Repository::<User>::new(&state.db).list(query).await?;
    Ok(Json(users))
}

pub async fn get_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<User>, ApiError> {
    let user = Repository::<User>::new(&state.db).get(&id).await?;
    Ok(Json(user))
}

/// Create a back-office user; role defaults to staff
pub async fn create_user(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<CreateUserRequest>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    validate_create_request(&req)?;

    let password_hash = hash_password(
        req.password.as_deref().unwrap_or_default(),
        state.config.auth.bcrypt_cost,
    )
    .await?;

    let mut patch = Patch::new();
    patch
        .set("name", clean(req.name))
        .set("email", clean(req.email).map(|e| e.to_lowercase()))
        .set("password_hash", password_hash)
        .set("phone", clean(req.phone))
        .set("role", req.role.unwrap_or(UserRole::Staff).to_string())
        .set("status", req.status.unwrap_or(UserStatus::Active).to_string());

    let user = Repository::<User>::new(&state.db).insert(patch).await?;
    info!(user_id = %user.id, role = %user.role, "User created");

    Ok((StatusCode::CREATED, Json(user)))
}

/// Update the supplied fields; a new password is re-hashed
pub async fn update_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<UpdateUserRequest>,
) -> Result<Json<User>, ApiError> {
    validate_update_request(&req)?;

    let mut patch = Patch::new();
    patch
        .set_opt("name", clean(req.name))
        .set_opt("email", clean(req.email).map(|e| e.to_lowercase()))
        .set_nullable("phone", clean_nullable(req.phone))
        .set_opt("role", req.role.map(|r| r.to_string()))
        .set_opt("status", req.status.map(|s| s.to_string()));

    if let Some(password) = req.password.as_deref() {
        patch.set(
            "password_hash",
            hash_password(password, state.config.auth.bcrypt_cost).await?,
        );
    }

    let user = Repository::<User>::new(&state.db).update(&id, patch).await?;
    info!(user_id = %user.id, "User updated");

    Ok(Json(user))
}

pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    CurrentUser(current): CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    if current.id == id {
        return Err(ApiError::bad_request("You cannot delete your own account"));
    }

    Repository::<User>::new(&state.db).delete(&id).await?;
    info!(user_id = %id, "User deleted");

    Ok(Json(MessageResponse::new("User deleted successfully")))
}
