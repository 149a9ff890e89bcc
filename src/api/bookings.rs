//! Bookings: admin management plus the signed-in customer's own bookings.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use tracing::info;

use crate::db::{
    Booking, BookingStatus, CreateBookingRequest, CustomerBookingRequest, ListParams, ListQuery,
    MessageResponse, Patch, Repository, UpdateBookingRequest,
};
use crate::AppState;

use super::auth::CurrentUser;
use super::error::{ApiError, ApiJson, ApiQuery, ValidationErrorBuilder};
use super::validation::{
    clean, clean_nullable, non_blank, non_blank_nullable, validate_amount,
    validate_schedule_date, validate_text, MAX_ADDRESS_LEN, MAX_LONG_TEXT_LEN,
};

fn check_schedule(errors: &mut ValidationErrorBuilder, date: &Option<String>, required: bool) {
    match non_blank(date) {
        Some(date) => {
            errors.check("scheduled_date", validate_schedule_date(date));
        }
        None if required || date.is_some() => {
            errors.add("scheduled_date", "Scheduled date is required");
        }
        None => {}
    }
}

fn check_details(
    errors: &mut ValidationErrorBuilder,
    description: Option<&str>,
    address: Option<&str>,
) {
    if let Some(description) = description {
        errors.check(
            "description",
            validate_text(description, "Description", MAX_LONG_TEXT_LEN),
        );
    }
    if let Some(address) = address {
        errors.check("address", validate_text(address, "Address", MAX_ADDRESS_LEN));
    }
}

fn validate_create_request(req: &CreateBookingRequest) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();

    if non_blank(&req.customer_id).is_none() {
        errors.add("customer_id", "Customer is required");
    }
    if non_blank(&req.category_id).is_none() {
        errors.add("category_id", "Category is required");
    }
    check_schedule(&mut errors, &req.scheduled_date, true);
    if let Some(amount) = req.amount {
        errors.check("amount", validate_amount(amount, "Amount"));
    }
    check_details(&mut errors, non_blank(&req.description), non_blank(&req.address));

    errors.finish()
}

fn validate_update_request(req: &UpdateBookingRequest) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();

    if req.customer_id.is_some() && non_blank(&req.customer_id).is_none() {
        errors.add("customer_id", "Customer cannot be empty");
    }
    if req.category_id.is_some() && non_blank(&req.category_id).is_none() {
        errors.add("category_id", "Category cannot be empty");
    }
    check_schedule(&mut errors, &req.scheduled_date, false);
    if let Some(amount) = req.amount {
        errors.check("amount", validate_amount(amount, "Amount"));
    }
    check_details(
        &mut errors,
        non_blank_nullable(&req.description),
        non_blank_nullable(&req.address),
    );

    errors.finish()
}

pub async fn list_bookings(
    State(state): State<Arc<AppState>>,
    ApiQuery(params): ApiQuery<ListParams>,
) -> Result<Json<Vec<Booking>>, ApiError> {
    let mut query = ListQuery::new().order_by("b.created_at DESC");
    if let Some(status) = params.status {
        query = query.eq("b.status", status);
    }

    let bookings = Repository::<Booking>::new(&state.db).list(query).await?;
    Ok(Json(bookings))
}

pub async fn get_booking(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Booking>, ApiError> {
    let booking = Repository::<Booking>::new(&state.db).get(&id).await?;
    Ok(Json(booking))
}

pub async fn create_booking(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<CreateBookingRequest>,
) -> Result<(StatusCode, Json<Booking>), ApiError> {
    validate_create_request(&req)?;

    let mut patch = Patch::new();
    patch
        .set("customer_id", clean(req.customer_id))
        .set("labour_id", clean(req.labour_id))
        .set("category_id", clean(req.category_id))
        .set("scheduled_date", clean(req.scheduled_date))
        .set("amount", req.amount.unwrap_or(0.0))
        .set("description", clean(req.description))
        .set("address", clean(req.address))
        .set("status", req.status.unwrap_or(BookingStatus::Pending).to_string());

    let booking = Repository::<Booking>::new(&state.db).insert(patch).await?;
    info!(booking_id = %booking.id, customer_id = %booking.customer_id, "Booking created");

    Ok((StatusCode::CREATED, Json(booking)))
}

pub async fn update_booking(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<UpdateBookingRequest>,
) -> Result<Json<Booking>, ApiError> {
    validate_update_request(&req)?;

    let mut patch = Patch::new();
    patch
        .set_opt("customer_id", clean(req.customer_id))
        .set_nullable("labour_id", clean_nullable(req.labour_id))
        .set_opt("category_id", clean(req.category_id))
        .set_opt("scheduled_date", clean(req.scheduled_date))
        .set_opt("amount", req.amount)
        .set_nullable("description", clean_nullable(req.description))
        .set_nullable("address", clean_nullable(req.address))
        .set_opt("status", req.status.map(|s| s.to_string()));

    let booking = Repository::<Booking>::new(&state.db).update(&id, patch).await?;
    info!(booking_id = %booking.id, status = %booking.status, "Booking updated");

    Ok(Json(booking))
}

pub async fn delete_booking(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    Repository::<Booking>::new(&state.db).delete(&id).await?;
    info!(booking_id = %id, "Booking deleted");

    Ok(Json(MessageResponse::new("Booking deleted successfully")))
}

// -------------------------------------------------------------------------
// Customer endpoints
// -------------------------------------------------------------------------

/// The signed-in customer's bookings, newest first
pub async fn list_my_bookings(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Vec<Booking>>, ApiError> {
    let query = ListQuery::new()
        .eq("b.customer_id", user.id)
        .order_by("b.created_at DESC");

    let bookings = Repository::<Booking>::new(&state.db).list(query).await?;
    Ok(Json(bookings))
}

/// Book a worker or a category; the customer is the session user
pub async fn create_my_booking(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    ApiJson(req): ApiJson<CustomerBookingRequest>,
) -> Result<(StatusCode, Json<Booking>), ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    if non_blank(&req.category_id).is_none() {
        errors.add("category_id", "Category is required");
    }
    check_schedule(&mut errors, &req.scheduled_date, true);
    check_details(&mut errors, non_blank(&req.description), non_blank(&req.address));
    errors.finish()?;

    let mut patch = Patch::new();
    patch
        .set("customer_id", user.id.as_str())
        .set("labour_id", clean(req.labour_id))
        .set("category_id", clean(req.category_id))
        .set("scheduled_date", clean(req.scheduled_date))
        .set("amount", 0.0)
        .set("description", clean(req.description))
        .set("address", clean(req.address))
        .set("status", BookingStatus::Pending.to_string());

    let booking = Repository::<Booking>::new(&state.db).insert(patch).await?;
    info!(booking_id = %booking.id, customer_id = %user.id, "Customer booking placed");

    Ok((StatusCode::CREATED, Json(booking)))
}

/// Cancel one of the customer's own bookings while it is pending or confirmed
pub async fn cancel_my_booking(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<Booking>, ApiError> {
    let repo = Repository::<Booking>::new(&state.db);

    // Other customers' bookings are indistinguishable from missing ones
    let booking = repo
        .find(&id)
        .await?
        .filter(|b| b.customer_id == user.id)
        .ok_or_else(|| ApiError::not_found("Booking not found"))?;

    if !booking.status_enum().is_some_and(|s| s.is_cancellable()) {
        return Err(ApiError::bad_request(format!(
            "A {} booking can no longer be cancelled",
            booking.status
        )));
    }

    let mut patch = Patch::new();
    patch.set("status", BookingStatus::Cancelled.to_string());
    let booking = repo.update(&id, patch).await?;
    info!(booking_id = %booking.id, customer_id = %user.id, "Booking cancelled by customer");

    Ok(Json(booking))
}
