pub mod auth;
mod bookings;
mod categories;
pub mod error;
mod labour;
mod referrals;
mod users;
mod validation;

use axum::{
    extract::State,
    http::{header, HeaderValue, Method},
    middleware,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // Auth routes (public)
    let auth_routes = Router::new()
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout))
        .route("/me", get(auth::me))
        .route("/register", post(auth::register));

    // Back-office user management (admin only)
    let user_routes = Router::new()
        .route("/users", get(users::list_users).post(users::create_user))
        .route(
            "/users/:id",
            get(users::get_user)
                .put(users::update_user)
                .delete(users::delete_user),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_admin,
        ));

    // Back-office API (admin or staff)
    let admin_routes = Router::new()
        // Categories
        .route(
            "/categories",
            get(categories::list_categories).post(categories::create_category),
        )
        .route(
            "/categories/:id",
            get(categories::get_category)
                .put(categories::update_category)
                .delete(categories::delete_category),
        )
        // Labour profiles
        .route("/labour", get(labour::list_labour).post(labour::create_labour))
        .route(
            "/labour/:id",
            get(labour::get_labour)
                .put(labour::update_labour)
                .delete(labour::delete_labour),
        )
        // Bookings
        .route(
            "/bookings",
            get(bookings::list_bookings).post(bookings::create_booking),
        )
        .route(
            "/bookings/:id",
            get(bookings::get_booking)
                .put(bookings::update_booking)
                .delete(bookings::delete_booking),
        )
        // Referrals
        .route(
            "/referrals",
            get(referrals::list_referrals).post(referrals::create_referral),
        )
        .route(
            "/referrals/:id",
            get(referrals::get_referral)
                .put(referrals::update_referral)
                .delete(referrals::delete_referral),
        )
        .merge(user_routes)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_staff,
        ));

    // Customer-facing API
    let public_routes = Router::new()
        .route("/categories", get(categories::list_active_categories))
        .route("/labour", get(labour::search_labour))
        .route("/labour/:id", get(labour::get_public_labour))
        .route(
            "/bookings",
            get(bookings::list_my_bookings).post(bookings::create_my_booking),
        )
        .route("/bookings/:id/cancel", post(bookings::cancel_my_booking))
        .route("/referrals", post(referrals::submit_referral));

    let mut router = Router::new()
        .route("/health", get(health_check))
        .nest("/api/auth", auth_routes)
        .nest("/api/admin", admin_routes)
        .nest("/api", public_routes)
        .layer(TraceLayer::new_for_http());

    if let Some(cors) = cors_layer(&state.config.server.cors_origins) {
        router = router.layer(cors);
    }

    router.with_state(state)
}

/// Credentialed CORS for the configured frontends
fn cors_layer(origins: &[String]) -> Option<CorsLayer> {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    if origins.is_empty() {
        return None;
    }

    Some(
        CorsLayer::new()
            .allow_origin(origins)
            .allow_credentials(true)
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]),
    )
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    database: DatabaseHealth,
    timestamp: String,
}

#[derive(Serialize)]
struct DatabaseHealth {
    connected: bool,
    connection_type: &'static str,
    connection_limit: u32,
}

/// Liveness plus a database probe through the connection manager
async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let connected = state.db.test_connection().await;
    Json(HealthResponse {
        status: if connected { "healthy" } else { "degraded" },
        database: DatabaseHealth {
            connected,
            connection_type: "single",
            connection_limit: 1,
        },
        timestamp: crate::db::now(),
    })
}


#[cfg(test)]
mod tests {
    use super::test_support::{request, send, test_app};
    use axum::http::{Method, StatusCode};

    #[tokio::test]
    async fn test_health_reports_single_connection() {
        let (app, _state) = test_app().await;
        let (status, body) = send(&app, Method::GET, "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["database"]["connected"], true);
        assert_eq!(body["database"]["connection_type"], "single");
        assert_eq!(body["database"]["connection_limit"], 1);
    }

    #[tokio::test]
    async fn test_malformed_json_uses_error_envelope() {
        let (app, _state) = test_app().await;
        let response = request(&app, Method::POST, "/api/auth/login", None, None).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/referrals",
            None,
            Some(serde_json::json!({ "referrer_name": 42 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "bad_request");
    }

    #[tokio::test]
    async fn test_admin_api_requires_session() {
        let (app, _state) = test_app().await;
        for uri in [
            "/api/admin/categories",
            "/api/admin/labour",
            "/api/admin/bookings",
            "/api/admin/referrals",
            "/api/admin/users",
        ] {
            let (status, body) = send(&app, Method::GET, uri, None, None).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED, "{}", uri);
            assert_eq!(body["error"]["code"], "unauthorized");
        }
    }
}
