//! Category management plus the public category list.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use tracing::info;

use crate::db::{
    Category, CategoryStatus, CreateCategoryRequest, ListParams, ListQuery, MessageResponse,
    Patch, Repository, UpdateCategoryRequest,
};
use crate::AppState;

use super::error::{ApiError, ApiJson, ApiQuery, ValidationErrorBuilder};
use super::validation::{
    clean, clean_nullable, non_blank, non_blank_nullable, validate_name, validate_text,
    MAX_LONG_TEXT_LEN, MAX_TEXT_LEN,
};

fn check_translations(
    errors: &mut ValidationErrorBuilder,
    name_urdu: Option<&str>,
    description: Option<&str>,
    description_urdu: Option<&str>,
) {
    if let Some(name) = name_urdu {
        errors.check("name_urdu", validate_text(name, "Urdu name", MAX_TEXT_LEN));
    }
    if let Some(text) = description {
        errors.check(
            "description",
            validate_text(text, "Description", MAX_LONG_TEXT_LEN),
        );
    }
    if let Some(text) = description_urdu {
        errors.check(
            "description_urdu",
            validate_text(text, "Urdu description", MAX_LONG_TEXT_LEN),
        );
    }
}

pub async fn list_categories(
    State(state): State<Arc<AppState>>,
    ApiQuery(params): ApiQuery<ListParams>,
) -> Result<Json<Vec<Category>>, ApiError> {
    let mut query = ListQuery::new().order_by("c.name_en ASC");
    if let Some(status) = params.status {
        query = query.eq("c.status", status);
    }

    let categories = Repository::<Category>::new(&state.db).list(query).await?;
    Ok(Json(categories))
}

/// Active categories for the customer-facing site
pub async fn list_active_categories(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Category>>, ApiError> {
    let query = ListQuery::new()
        .eq("c.status", CategoryStatus::Active.to_string())
        .order_by("c.name_en ASC");

    let categories = Repository::<Category>::new(&state.db).list(query).await?;
    Ok(Json(categories))
}

pub async fn get_category(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Category>, ApiError> {
    let category = Repository::<Category>::new(&state.db).get(&id).await?;
    Ok(Json(category))
}

pub async fn create_category(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<CreateCategoryRequest>,
) -> Result<(StatusCode, Json<Category>), ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    errors.check("name", validate_name(non_blank(&req.name), "Name"));
    check_translations(
        &mut errors,
        non_blank(&req.name_urdu),
        non_blank(&req.description),
        non_blank(&req.description_urdu),
    );
    errors.finish()?;

    let mut patch = Patch::new();
    patch
        .set("name_en", clean(req.name))
        .set("name_ur", clean(req.name_urdu))
        .set("description_en", clean(req.description))
        .set("description_ur", clean(req.description_urdu))
        .set("status", req.status.unwrap_or(CategoryStatus::Active).to_string());

    let category = Repository::<Category>::new(&state.db).insert(patch).await?;
    info!(category_id = %category.id, name = %category.name, "Category created");

    Ok((StatusCode::CREATED, Json(category)))
}

pub async fn update_category(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<UpdateCategoryRequest>,
) -> Result<Json<Category>, ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    if req.name.is_some() {
        errors.check("name", validate_name(non_blank(&req.name), "Name"));
    }
    check_translations(
        &mut errors,
        non_blank_nullable(&req.name_urdu),
        non_blank_nullable(&req.description),
        non_blank_nullable(&req.description_urdu),
    );
    errors.finish()?;

    let mut patch = Patch::new();
    patch
        .set_opt("name_en", clean(req.name))
        .set_nullable("name_ur", clean_nullable(req.name_urdu))
        .set_nullable("description_en", clean_nullable(req.description))
        .set_nullable("description_ur", clean_nullable(req.description_urdu))
        .set_opt("status", req.status.map(|s| s.to_string()));

    let category = Repository::<Category>::new(&state.db).update(&id, patch).await?;
    info!(category_id = %category.id, "Category updated");

    Ok(Json(category))
}

/// Refused while labour profiles, bookings or referrals point at the category
pub async fn delete_category(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    Repository::<Category>::new(&state.db).delete(&id).await?;
    info!(category_id = %id, "Category deleted");

    Ok(Json(MessageResponse::new("Category deleted successfully")))
}

#[cfg(test)]
mod tests {
    use crate::api::test_support::{send, session_for, test_app};
    use crate::db::UserRole;
    use axum::http::{Method, StatusCode};
    use serde_json::{json, Value};

    async fn create(app: &axum::Router, cookie: &str, body: Value) -> Value {
        let (status, created) =
            send(app, Method::POST, "/api/admin/categories", Some(cookie), Some(body)).await;
        assert_eq!(status, StatusCode::CREATED);
        created
    }

    #[tokio::test]
    async fn test_bilingual_fields_round_trip() {
        let (app, state) = test_app().await;
        let staff = session_for(&state, UserRole::Staff).await;

        let created = create(
            &app,
            &staff,
            json!({ "name": "Electrician", "name_urdu": "بجلی والا", "description": "Wiring" }),
        )
        .await;
        assert_eq!(created["name_urdu"], "بجلی والا");
        assert_eq!(created["status"], "active");

        let uri = format!("/api/admin/categories/{}", created["id"].as_str().unwrap());
        let (status, updated) = send(
            &app,
            Method::PUT,
            &uri,
            Some(&staff),
            Some(json!({ "name": "Electrical", "description": null })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["name"], "Electrical");
        assert!(updated["description"].is_null());
        assert_eq!(updated["name_urdu"], "بجلی والا");
    }

    #[tokio::test]
    async fn test_description_is_bounded_by_column_width() {
        let (app, state) = test_app().await;
        let staff = session_for(&state, UserRole::Staff).await;

        let longest = "ب".repeat(2000);
        let created = create(
            &app,
            &staff,
            json!({ "name": "Tiling", "description_urdu": longest.as_str() }),
        )
        .await;
        assert_eq!(created["description_urdu"], longest.as_str());

        let (status, err) = send(
            &app,
            Method::POST,
            "/api/admin/categories",
            Some(&staff),
            Some(json!({ "name": "Roofing", "description": "x".repeat(2001) })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(err["error"]["details"]["description"].is_array());
    }

    #[tokio::test]
    async fn test_category_in_use_cannot_be_deleted() {
        let (app, state) = test_app().await;
        let staff = session_for(&state, UserRole::Staff).await;

        let used = create(&app, &staff, json!({ "name": "Plumbing" })).await;
        let unused = create(&app, &staff, json!({ "name": "Carpentry" })).await;

        let (status, _) = send(
            &app,
            Method::POST,
            "/api/admin/labour",
            Some(&staff),
            Some(json!({
                "name": "Asad",
                "category_id": used["id"],
                "city": "Lahore",
                "phone": "03001234567"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let uri = format!("/api/admin/categories/{}", used["id"].as_str().unwrap());
        let (status, err) = send(&app, Method::DELETE, &uri, Some(&staff), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(err["error"]["code"], "conflict");

        let uri = format!("/api/admin/categories/{}", unused["id"].as_str().unwrap());
        let (status, body) = send(&app, Method::DELETE, &uri, Some(&staff), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Category deleted successfully");
        let (status, _) = send(&app, Method::GET, &uri, Some(&staff), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_category_referenced_by_booking_cannot_be_deleted() {
        let (app, state) = test_app().await;
        let staff = session_for(&state, UserRole::Staff).await;
        let customer = session_for(&state, UserRole::Customer).await;
        let category = create(&app, &staff, json!({ "name": "Painting" })).await;

        let (status, _) = send(
            &app,
            Method::POST,
            "/api/bookings",
            Some(&customer),
            Some(json!({ "category_id": category["id"], "scheduled_date": "2030-05-01" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let uri = format!("/api/admin/categories/{}", category["id"].as_str().unwrap());
        let (status, _) = send(&app, Method::DELETE, &uri, Some(&staff), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_public_list_hides_inactive() {
        let (app, state) = test_app().await;
        let staff = session_for(&state, UserRole::Staff).await;
        create(&app, &staff, json!({ "name": "Plumbing" })).await;
        create(&app, &staff, json!({ "name": "Masonry", "status": "inactive" })).await;

        let (status, body) = send(&app, Method::GET, "/api/categories", None, None).await;
        assert_eq!(status, StatusCode::OK);
        let names: Vec<&str> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["Plumbing"]);

        let (_, all) = send(&app, Method::GET, "/api/admin/categories", Some(&staff), None).await;
        assert_eq!(all.as_array().unwrap().len(), 2);
    }
}
