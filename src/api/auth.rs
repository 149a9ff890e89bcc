//! Authentication: bcrypt passwords, JWT session cookies and role guards.

use axum::{
    async_trait,
    body::Body,
    extract::{FromRequestParts, State},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap, Request, StatusCode},
    middleware::Next,
    response::Response,
    Json,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::error::{ApiError, ApiJson, ValidationErrorBuilder};
use super::validation::{non_blank, validate_email, validate_name, validate_password, validate_phone};
use crate::config::AuthConfig;
use crate::db::{
    Database, LoginRequest, LoginResponse, Patch, RegisterRequest, Repository, Statement, User,
    UserCredentials, UserRole, UserStatus,
};
use crate::AppState;

/// Name of the HTTP-only session cookie
pub const SESSION_COOKIE: &str = "token";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("password hashing failed: {0}")]
    Hashing(String),

    #[error("token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
}

/// Hash a password with bcrypt on the blocking thread pool
pub async fn hash_password(password: &str, cost: u32) -> Result<String, AuthError> {
    let password = password.to_string();
    tokio::task::spawn_blocking(move || {
        bcrypt::hash(password, cost).map_err(|e| AuthError::Hashing(e.to_string()))
    })
    .await
    .map_err(|e| AuthError::Hashing(format!("Task join error: {}", e)))?
}

/// Verify a password against a bcrypt hash
pub async fn verify_password(password: &str, hash: &str) -> Result<bool, AuthError> {
    let password = password.to_string();
    let hash = hash.to_string();
    tokio::task::spawn_blocking(move || {
        bcrypt::verify(password, &hash).map_err(|e| AuthError::Hashing(e.to_string()))
    })
    .await
    .map_err(|e| AuthError::Hashing(format!("Task join error: {}", e)))?
}

/// JWT claims carried by the session cookie
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    /// User id
    pub sub: String,
    pub email: String,
    pub role: String,
    pub iat: i64,
    pub exp: i64,
}

/// Issues and verifies HS256 session tokens
#[derive(Clone)]
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl TokenIssuer {
    pub fn new(secret: &str, ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn issue(&self, user_id: &str, email: &str, role: &str) -> Result<String, AuthError> {
        self.issue_at(user_id, email, role, Utc::now())
    }

    pub fn issue_at(
        &self,
        user_id: &str,
        email: &str,
        role: &str,
        issued_at: DateTime<Utc>,
    ) -> Result<String, AuthError> {
        let claims = SessionClaims {
            sub: user_id.to_string(),
            email: email.to_string(),
            role: role.to_string(),
            iat: issued_at.timestamp(),
            exp: (issued_at + self.ttl).timestamp(),
        };
        Ok(encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?)
    }

    /// Check signature and expiry, with no leeway
    pub fn verify(&self, token: &str) -> Result<SessionClaims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        Ok(decode::<SessionClaims>(token, &self.decoding, &validation)?.claims)
    }
}

fn session_cookie(token: String, ttl: Duration, secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .max_age(time::Duration::seconds(ttl.num_seconds()))
        .build()
}

/// Session token from the cookie, falling back to `Authorization: Bearer`
pub fn extract_token(headers: &HeaderMap) -> Option<String> {
    let jar = CookieJar::from_headers(headers);
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        return Some(cookie.value().to_string());
    }

    headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

/// Resolve the signed-in user.
///
/// A missing, malformed or expired token, a deleted account and a suspended
/// account all mean "no session". Only database failures are errors.
pub async fn current_user(state: &AppState, headers: &HeaderMap) -> Result<Option<User>, ApiError> {
    let Some(token) = extract_token(headers) else {
        return Ok(None);
    };

    let claims = match state.tokens.verify(&token) {
        Ok(claims) => claims,
        Err(e) => {
            debug!("Rejected session token: {}", e);
            return Ok(None);
        }
    };

    let user = Repository::<User>::new(&state.db).find(&claims.sub).await?;
    Ok(user.filter(User::is_active))
}

/// The signed-in user; rejects with 401 when there is no session
pub struct CurrentUser(pub User);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        // Set by the role guards
        if let Some(user) = parts.extensions.get::<User>() {
            return Ok(CurrentUser(user.clone()));
        }

        current_user(state, &parts.headers)
            .await?
            .map(CurrentUser)
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))
    }
}

/// The signed-in user, if any
pub struct MaybeUser(pub Option<User>);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for MaybeUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        Ok(MaybeUser(current_user(state, &parts.headers).await?))
    }
}

async fn guard(
    state: &AppState,
    mut request: Request<Body>,
    next: Next,
    allowed: fn(UserRole) -> bool,
) -> Result<Response, ApiError> {
    let user = current_user(state, request.headers())
        .await?
        .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;

    if !user.role_enum().is_some_and(allowed) {
        warn!(user_id = %user.id, role = %user.role, path = %request.uri().path(), "Access denied");
        return Err(ApiError::forbidden("You do not have permission to access this resource"));
    }

    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

/// Admin or staff session required
pub async fn require_staff(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    guard(&state, request, next, |role| role.is_staff()).await
}

/// Admin session required
pub async fn require_admin(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    guard(&state, request, next, |role| role == UserRole::Admin).await
}

fn credentials_query(email: &str) -> Statement {
    Statement::new("SELECT id, email, role, status, password_hash FROM users WHERE email = ?")
        .bind(email.trim().to_lowercase())
}

/// Sign `user` in: a fresh token in the session cookie plus the user body
fn start_session(
    state: &AppState,
    jar: CookieJar,
    user: User,
) -> Result<(CookieJar, Json<LoginResponse>), ApiError> {
    let token = state.tokens.issue(&user.id, &user.email, &user.role)?;
    let cookie = session_cookie(token, state.tokens.ttl(), state.config.auth.secure_cookie);
    Ok((jar.add(cookie), Json(LoginResponse { success: true, user })))
}

/// Login endpoint
pub async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    ApiJson(request): ApiJson<LoginRequest>,
) -> Result<(CookieJar, Json<LoginResponse>), ApiError> {
    if request.email.trim().is_empty() || request.password.is_empty() {
        return Err(ApiError::bad_request("Email and password are required"));
    }

    let credentials: Option<UserCredentials> =
        state.db.query_one(credentials_query(&request.email)).await?;
    let credentials =
        credentials.ok_or_else(|| ApiError::unauthorized("Invalid credentials"))?;

    let valid = verify_password(&request.password, &credentials.password_hash)
        .await
        .unwrap_or_else(|e| {
            warn!(user_id = %credentials.id, "Stored password hash is unusable: {}", e);
            false
        });
    if !valid {
        return Err(ApiError::unauthorized("Invalid credentials"));
    }
    if credentials.status == UserStatus::Suspended.to_string() {
        return Err(ApiError::unauthorized("Account is suspended"));
    }

    let user = Repository::<User>::new(&state.db).get(&credentials.id).await?;
    info!(user_id = %user.id, role = %credentials.role, "User logged in");
    start_session(&state, jar, user)
}

/// Clear the session cookie
pub async fn logout(jar: CookieJar) -> (CookieJar, Json<serde_json::Value>) {
    let jar = jar.remove(Cookie::build(SESSION_COOKIE).path("/").build());
    (jar, Json(serde_json::json!({ "success": true })))
}

/// Current session user
pub async fn me(CurrentUser(user): CurrentUser) -> Json<User> {
    Json(user)
}

/// Customer sign-up; signs the new account in
pub async fn register(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    ApiJson(request): ApiJson<RegisterRequest>,
) -> Result<(StatusCode, CookieJar, Json<LoginResponse>), ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    errors.check("name", validate_name(non_blank(&request.name), "Name"));
    match non_blank(&request.email) {
        Some(email) => errors.check("email", validate_email(email)),
        None => errors.add("email", "Email is required"),
    };
    match request.password.as_deref() {
        Some(password) => errors.check("password", validate_password(password)),
        None => errors.add("password", "Password is required"),
    };
    if let Some(phone) = non_blank(&request.phone) {
        errors.check("phone", validate_phone(phone));
    }
    errors.finish()?;

    let password_hash = hash_password(
        request.password.as_deref().unwrap_or_default(),
        state.config.auth.bcrypt_cost,
    )
    .await?;

    let mut patch = Patch::new();
    patch
        .set("name", non_blank(&request.name))
        .set("email", non_blank(&request.email).map(str::to_lowercase))
        .set("password_hash", password_hash)
        .set("phone", non_blank(&request.phone))
        .set("role", UserRole::Customer.to_string())
        .set("status", UserStatus::Active.to_string());

    let user = Repository::<User>::new(&state.db).insert(patch).await?;
    info!(user_id = %user.id, "Customer registered");

    let (jar, body) = start_session(&state, jar, user)?;
    Ok((StatusCode::CREATED, jar, body))
}

/// Create the configured bootstrap admin when no account uses its email
pub async fn ensure_admin_user(db: &Database, config: &AuthConfig) -> anyhow::Result<()> {
    let (Some(email), Some(password)) = (&config.admin_email, &config.admin_password) else {
        debug!("No bootstrap admin configured");
        return Ok(());
    };
    let email = email.trim().to_lowercase();

    let existing = db
        .count(Statement::new("SELECT COUNT(*) FROM users WHERE email = ?").bind(&email))
        .await?;
    if existing > 0 {
        debug!(email = %email, "Bootstrap admin already exists");
        return Ok(());
    }

    if let Err(e) = validate_password(password) {
        anyhow::bail!("ADMIN_PASSWORD rejected: {}", e);
    }

    let mut patch = Patch::new();
    patch
        .set("name", config.admin_name.as_str())
        .set("email", email.as_str())
        .set("password_hash", hash_password(password, config.bcrypt_cost).await?)
        .set("role", UserRole::Admin.to_string())
        .set("status", UserStatus::Active.to_string());
    let admin = Repository::<User>::new(db).insert(patch).await?;

    info!(user_id = %admin.id, email = %email, "Created bootstrap admin user");
    Ok(())
}
