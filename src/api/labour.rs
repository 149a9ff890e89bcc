//! Labour profiles: admin management and the public directory.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use tracing::info;

use crate::db::{
    CreateLabourRequest, Filter, LabourProfile, LabourSearchParams, LabourStatus, ListParams,
    ListQuery, MessageResponse, Patch, Repository, UpdateLabourRequest,
};
use crate::AppState;

use super::error::{ApiError, ApiJson, ApiQuery, ValidationErrorBuilder};
use super::validation::{
    clean, clean_nullable, non_blank, non_blank_nullable, validate_amount, validate_email,
    validate_experience, validate_name, validate_phone, validate_rating, validate_text,
    MAX_LONG_TEXT_LEN,
};

/// Largest page the public directory serves
const MAX_DIRECTORY_LIMIT: u32 = 100;

fn check_numbers(
    errors: &mut ValidationErrorBuilder,
    rating: Option<f64>,
    hourly_rate: Option<f64>,
    experience_years: Option<i64>,
) {
    if let Some(rating) = rating {
        errors.check("rating", validate_rating(rating));
    }
    if let Some(rate) = hourly_rate {
        errors.check("hourly_rate", validate_amount(rate, "Hourly rate"));
    }
    if let Some(years) = experience_years {
        errors.check("experience_years", validate_experience(years));
    }
}

fn validate_create_request(req: &CreateLabourRequest) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();

    errors.check("name", validate_name(non_blank(&req.name), "Name"));
    if non_blank(&req.category_id).is_none() {
        errors.add("category_id", "Category is required");
    }
    errors.check("city", validate_name(non_blank(&req.city), "City"));
    match non_blank(&req.phone) {
        Some(phone) => errors.check("phone", validate_phone(phone)),
        None => errors.add("phone", "Phone is required"),
    };
    if let Some(email) = non_blank(&req.email) {
        errors.check("email", validate_email(email));
    }
    if let Some(description) = non_blank(&req.description) {
        errors.check(
            "description",
            validate_text(description, "Description", MAX_LONG_TEXT_LEN),
        );
    }
    check_numbers(&mut errors, req.rating, req.hourly_rate, req.experience_years);

    errors.finish()
}

fn validate_update_request(req: &UpdateLabourRequest) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();

    if req.name.is_some() {
        errors.check("name", validate_name(non_blank(&req.name), "Name"));
    }
    if req.category_id.is_some() && non_blank(&req.category_id).is_none() {
        errors.add("category_id", "Category cannot be empty");
    }
    if req.city.is_some() {
        errors.check("city", validate_name(non_blank(&req.city), "City"));
    }
    if req.phone.is_some() {
        match non_blank(&req.phone) {
            Some(phone) => errors.check("phone", validate_phone(phone)),
            None => errors.add("phone", "Phone cannot be empty"),
        };
    }
    if let Some(email) = non_blank_nullable(&req.email) {
        errors.check("email", validate_email(email));
    }
    if let Some(description) = non_blank_nullable(&req.description) {
        errors.check(
            "description",
            validate_text(description, "Description", MAX_LONG_TEXT_LEN),
        );
    }
    check_numbers(&mut errors, req.rating, req.hourly_rate, req.experience_years);

    errors.finish()
}

pub async fn list_labour(
    State(state): State<Arc<AppState>>,
    ApiQuery(params): ApiQuery<ListParams>,
) -> Result<Json<Vec<LabourProfile>>, ApiError> {
    let mut query = ListQuery::new().order_by("lp.created_at DESC");
    if let Some(status) = params.status {
        query = query.eq("lp.status", status);
    }

    let profiles = Repository::<LabourProfile>::new(&state.db).list(query).await?;
    Ok(Json(profiles))
}

pub async fn get_labour(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<LabourProfile>, ApiError> {
    let profile = Repository::<LabourProfile>::new(&state.db).get(&id).await?;
    Ok(Json(profile))
}

/// Create a labour profile; new profiles await approval unless a status is given
pub async fn create_labour(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<CreateLabourRequest>,
) -> Result<(StatusCode, Json<LabourProfile>), ApiError> {
    validate_create_request(&req)?;

    let mut patch = Patch::new();
    patch
        .set("name", clean(req.name))
        .set("category_id", clean(req.category_id))
        .set("city", clean(req.city))
        .set("phone", clean(req.phone))
        .set("email", clean(req.email).map(|e| e.to_lowercase()))
        .set("description", clean(req.description))
        .set("experience_years", req.experience_years.unwrap_or(0))
        .set("rating", req.rating.unwrap_or(0.0))
        .set("hourly_rate", req.hourly_rate.unwrap_or(0.0))
        .set("status", req.status.unwrap_or(LabourStatus::Pending).to_string());

    let profile = Repository::<LabourProfile>::new(&state.db).insert(patch).await?;
    info!(labour_id = %profile.id, category_id = %profile.category_id, "Labour profile created");

    Ok((StatusCode::CREATED, Json(profile)))
}

pub async fn update_labour(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<UpdateLabourRequest>,
) -> Result<Json<LabourProfile>, ApiError> {
    validate_update_request(&req)?;

    let mut patch = Patch::new();
    patch
        .set_opt("name", clean(req.name))
        .set_opt("category_id", clean(req.category_id))
        .set_opt("city", clean(req.city))
        .set_opt("phone", clean(req.phone))
        .set_nullable(
            "email",
            clean_nullable(req.email).map(|e| e.map(|e| e.to_lowercase())),
        )
        .set_nullable("description", clean_nullable(req.description))
        .set_opt("experience_years", req.experience_years)
        .set_opt("rating", req.rating)
        .set_opt("hourly_rate", req.hourly_rate)
        .set_opt("status", req.status.map(|s| s.to_string()));

    let profile = Repository::<LabourProfile>::new(&state.db)
        .update(&id, patch)
        .await?;
    info!(labour_id = %profile.id, status = %profile.status, "Labour profile updated");

    Ok(Json(profile))
}

pub async fn delete_labour(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    Repository::<LabourProfile>::new(&state.db).delete(&id).await?;
    info!(labour_id = %id, "Labour profile deleted");

    Ok(Json(MessageResponse::new("Labour profile deleted successfully")))
}

// -------------------------------------------------------------------------
// Public directory
// -------------------------------------------------------------------------

/// Approved profiles, filtered by category, city and a free-text term
pub async fn search_labour(
    State(state): State<Arc<AppState>>,
    ApiQuery(params): ApiQuery<LabourSearchParams>,
) -> Result<Json<Vec<LabourProfile>>, ApiError> {
    let mut query = ListQuery::new().eq("lp.status", LabourStatus::Approved.to_string());

    if let Some(category_id) = non_blank(&params.category_id) {
        query = query.eq("lp.category_id", category_id);
    }
    if let Some(city) = non_blank(&params.city) {
        query = query.filter(Filter::EqIgnoreCase("lp.city", city.to_string()));
    }
    if let Some(term) = non_blank(&params.q) {
        query = query.filter(Filter::Contains(
            &["lp.name", "lp.description"],
            term.to_string(),
        ));
    }

    query = match params.sort.as_deref() {
        Some("rating") => query.order_by("lp.rating DESC, lp.created_at DESC"),
        _ => query.order_by("lp.created_at DESC"),
    };
    let limit = params.limit.unwrap_or(MAX_DIRECTORY_LIMIT).clamp(1, MAX_DIRECTORY_LIMIT);

    let profiles = Repository::<LabourProfile>::new(&state.db)
        .list(query.limit(limit))
        .await?;
    Ok(Json(profiles))
}

/// A single approved profile; anything else is hidden from the public
pub async fn get_public_labour(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<LabourProfile>, ApiError> {
    let profile = Repository::<LabourProfile>::new(&state.db)
        .find(&id)
        .await?
        .filter(|p| p.status == LabourStatus::Approved.to_string())
        .ok_or_else(|| ApiError::not_found("Labour profile not found"))?;
    Ok(Json(profile))
}
