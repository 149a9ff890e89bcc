//! Worker referrals: public submission and back-office follow-up.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use tracing::info;

use crate::db::{
    CreateReferralRequest, ListParams, ListQuery, MessageResponse, Patch, Referral,
    ReferralStatus, Repository, UpdateReferralRequest,
};
use crate::AppState;

use super::auth::MaybeUser;
use super::error::{ApiError, ApiJson, ApiQuery, ValidationErrorBuilder};
use super::validation::{
    clean, clean_nullable, non_blank, non_blank_nullable, validate_email, validate_name,
    validate_phone, validate_text, MAX_LONG_TEXT_LEN,
};

const CONTACT_REQUIRED: &str = "A phone number or email for the referred worker is required";

fn check_contact(
    errors: &mut ValidationErrorBuilder,
    prefix: &str,
    email: Option<&str>,
    phone: Option<&str>,
) {
    if let Some(email) = email {
        errors.check(&format!("{}_email", prefix), validate_email(email));
    }
    if let Some(phone) = phone {
        errors.check(&format!("{}_phone", prefix), validate_phone(phone));
    }
}

fn validate_create_request(req: &CreateReferralRequest) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();

    errors.check(
        "referrer_name",
        validate_name(non_blank(&req.referrer_name), "Your name"),
    );
    errors.check(
        "referred_name",
        validate_name(non_blank(&req.referred_name), "Worker name"),
    );
    if non_blank(&req.referred_phone).is_none() && non_blank(&req.referred_email).is_none() {
        errors.add("referred_phone", CONTACT_REQUIRED);
    }
    check_contact(
        &mut errors,
        "referrer",
        non_blank(&req.referrer_email),
        non_blank(&req.referrer_phone),
    );
    check_contact(
        &mut errors,
        "referred",
        non_blank(&req.referred_email),
        non_blank(&req.referred_phone),
    );
    if let Some(notes) = non_blank(&req.notes) {
        errors.check("notes", validate_text(notes, "Notes", MAX_LONG_TEXT_LEN));
    }

    errors.finish()
}

/// What a nullable column holds once the update is applied
fn after_update<'a>(
    update: &'a Option<Option<String>>,
    current: &'a Option<String>,
) -> Option<&'a str> {
    match update {
        Some(value) => non_blank(value),
        None => non_blank(current),
    }
}

fn validate_update_request(
    req: &UpdateReferralRequest,
    current: &Referral,
) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();

    if req.referrer_name.is_some() {
        errors.check(
            "referrer_name",
            validate_name(non_blank(&req.referrer_name), "Referrer name"),
        );
    }
    if req.referred_name.is_some() {
        errors.check(
            "referred_name",
            validate_name(non_blank(&req.referred_name), "Worker name"),
        );
    }
    check_contact(
        &mut errors,
        "referrer",
        non_blank_nullable(&req.referrer_email),
        non_blank_nullable(&req.referrer_phone),
    );
    check_contact(
        &mut errors,
        "referred",
        non_blank_nullable(&req.referred_email),
        non_blank_nullable(&req.referred_phone),
    );
    if after_update(&req.referred_phone, &current.referred_phone).is_none()
        && after_update(&req.referred_email, &current.referred_email).is_none()
    {
        errors.add("referred_phone", CONTACT_REQUIRED);
    }
    if let Some(notes) = non_blank_nullable(&req.notes) {
        errors.check("notes", validate_text(notes, "Notes", MAX_LONG_TEXT_LEN));
    }

    errors.finish()
}

fn insert_patch(req: CreateReferralRequest, status: ReferralStatus) -> Patch {
    let mut patch = Patch::new();
    patch
        .set("referrer_name", clean(req.referrer_name))
        .set("referrer_email", clean(req.referrer_email).map(|e| e.to_lowercase()))
        .set("referrer_phone", clean(req.referrer_phone))
        .set("referred_name", clean(req.referred_name))
        .set("referred_email", clean(req.referred_email).map(|e| e.to_lowercase()))
        .set("referred_phone", clean(req.referred_phone))
        .set("category_id", clean(req.category_id))
        .set("notes", clean(req.notes))
        .set("status", status.to_string());
    patch
}

pub async fn list_referrals(
    State(state): State<Arc<AppState>>,
    ApiQuery(params): ApiQuery<ListParams>,
) -> Result<Json<Vec<Referral>>, ApiError> {
    let mut query = ListQuery::new().order_by("r.created_at DESC");
    if let Some(status) = params.status {
        query = query.eq("r.status", status);
    }

    let referrals = Repository::<Referral>::new(&state.db).list(query).await?;
    Ok(Json(referrals))
}

pub async fn get_referral(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Referral>, ApiError> {
    let referral = Repository::<Referral>::new(&state.db).get(&id).await?;
    Ok(Json(referral))
}

pub async fn create_referral(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<CreateReferralRequest>,
) -> Result<(StatusCode, Json<Referral>), ApiError> {
    validate_create_request(&req)?;

    let status = req.status.unwrap_or(ReferralStatus::Pending);
    let referral = Repository::<Referral>::new(&state.db)
        .insert(insert_patch(req, status))
        .await?;
    info!(referral_id = %referral.id, "Referral created");

    Ok((StatusCode::CREATED, Json(referral)))
}

pub async fn update_referral(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<UpdateReferralRequest>,
) -> Result<Json<Referral>, ApiError> {
    let repo = Repository::<Referral>::new(&state.db);
    let current = repo.get(&id).await?;
    validate_update_request(&req, &current)?;

    let mut patch = Patch::new();
    patch
        .set_opt("referrer_name", clean(req.referrer_name))
        .set_nullable(
            "referrer_email",
            clean_nullable(req.referrer_email).map(|e| e.map(|e| e.to_lowercase())),
        )
        .set_nullable("referrer_phone", clean_nullable(req.referrer_phone))
        .set_opt("referred_name", clean(req.referred_name))
        .set_nullable(
            "referred_email",
            clean_nullable(req.referred_email).map(|e| e.map(|e| e.to_lowercase())),
        )
        .set_nullable("referred_phone", clean_nullable(req.referred_phone))
        .set_nullable("category_id", clean_nullable(req.category_id))
        .set_nullable("notes", clean_nullable(req.notes))
        .set_opt("status", req.status.map(|s| s.to_string()));

    let referral = repo.update(&id, patch).await?;
    info!(referral_id = %referral.id, status = %referral.status, "Referral updated");

    Ok(Json(referral))
}

pub async fn delete_referral(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    Repository::<Referral>::new(&state.db).delete(&id).await?;
    info!(referral_id = %id, "Referral deleted");

    Ok(Json(MessageResponse::new("Referral deleted successfully")))
}

/// Public referral form. A signed-in user may omit their own name and email.
pub async fn submit_referral(
    State(state): State<Arc<AppState>>,
    MaybeUser(user): MaybeUser,
    ApiJson(mut req): ApiJson<CreateReferralRequest>,
) -> Result<(StatusCode, Json<Referral>), ApiError> {
    if let Some(user) = user {
        if non_blank(&req.referrer_name).is_none() {
            req.referrer_name = Some(user.name);
        }
        if non_blank(&req.referrer_email).is_none() {
            req.referrer_email = Some(user.email);
        }
        if non_blank(&req.referrer_phone).is_none() {
            req.referrer_phone = user.phone;
        }
    }
    validate_create_request(&req)?;

    let referral = Repository::<Referral>::new(&state.db)
        .insert(insert_patch(req, ReferralStatus::Pending))
        .await?;
    info!(referral_id = %referral.id, "Referral submitted");

    Ok((StatusCode::CREATED, Json(referral)))
}
