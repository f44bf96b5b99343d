//! services/api/src/web/auth.rs
//!
//! Authentication endpoints for user signup, login, and logout. A successful signup
//! or login also resolves the member profile, creating it on first sign-in.

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;
use utoipa::ToSchema;

use station_fit_core::domain::{Identity, Profile};
use station_fit_core::ports::PortError;

use crate::error::{ApiError, ApiResult};
use crate::web::middleware::{session_id_from_headers, SESSION_COOKIE};
use crate::web::state::AppState;

const MIN_PASSWORD_LEN: usize = 8;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
    pub display_name: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub user_id: Uuid,
    pub email: String,
    /// Absent while the profile is still being created.
    pub profile: Option<Profile>,
}

//=========================================================================================
// Helpers
//=========================================================================================

fn session_cookie(auth_session_id: &str, max_age: Duration) -> String {
    format!(
        "{}={}; HttpOnly; Secure; SameSite=Lax; Path=/; Max-Age={}",
        SESSION_COOKIE,
        auth_session_id,
        max_age.num_seconds()
    )
}

/// Opens an auth session and loads (or creates) the profile behind it.
async fn sign_in(
    state: &AppState,
    user_id: Uuid,
    email: String,
    display_name: Option<String>,
) -> ApiResult<(String, AuthResponse)> {
    let ttl = Duration::days(state.config.session_ttl_days);
    let auth_session_id = Uuid::new_v4().to_string();
    state
        .credentials
        .create_auth_session(&auth_session_id, user_id, Utc::now() + ttl)
        .await
        .map_err(|e| {
            error!("Failed to create auth session: {}", e);
            e
        })?;

    let identity = Identity {
        uid: user_id.to_string(),
        email: Some(email.clone()),
        display_name,
    };
    let resolved = state.resolver_for(&identity.uid).resolve(Some(identity)).await;

    Ok((
        session_cookie(&auth_session_id, ttl),
        AuthResponse {
            user_id,
            email,
            profile: resolved.profile,
        },
    ))
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /auth/signup - Create a new user account
#[utoipa::path(
    post,
    path = "/auth/signup",
    request_body = SignupRequest,
    responses(
        (status = 201, description = "User created successfully", body = AuthResponse),
        (status = 400, description = "Invalid request or email already registered"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn signup_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SignupRequest>,
) -> ApiResult<impl IntoResponse> {
    let email = req.email.trim();
    if !email.contains('@') {
        return Err(ApiError::BadRequest("A valid email is required".to_string()));
    }
    if req.password.len() < MIN_PASSWORD_LEN {
        return Err(ApiError::BadRequest(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }

    // 1. Hash the password
    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(req.password.as_bytes(), &salt)
        .map_err(|e| {
            error!("Failed to hash password: {:?}", e);
            ApiError::Internal("Failed to hash password".to_string())
        })?
        .to_string();

    // 2. Create user in the credential store
    let user = state
        .credentials
        .create_user_with_email(email, &password_hash)
        .await
        .map_err(|e| {
            warn!("Failed to create user: {}", e);
            e
        })?;
    info!(user_id = %user.user_id, "User signed up");

    // 3. Open the session and create the profile
    let (cookie, response) = sign_in(&state, user.user_id, user.email, req.display_name).await?;
    Ok((StatusCode::CREATED, [(header::SET_COOKIE, cookie)], Json(response)))
}

/// POST /auth/login - Login with existing account
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<impl IntoResponse> {
    // 1. Get user by email
    let user_creds = state
        .credentials
        .get_user_by_email(&req.email)
        .await
        .map_err(|e| {
            warn!("Login for unknown user: {}", e);
            ApiError::InvalidCredentials
        })?;

    // 2. Verify password
    let parsed_hash = PasswordHash::new(&user_creds.hashed_password).map_err(|e| {
        error!("Failed to parse password hash: {:?}", e);
        ApiError::Internal("Authentication error".to_string())
    })?;
    let valid = Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .is_ok();
    if !valid {
        return Err(ApiError::InvalidCredentials);
    }

    // 3. Open the session and load the profile
    let (cookie, response) = sign_in(&state, user_creds.user_id, user_creds.email, None).await?;
    Ok((StatusCode::OK, [(header::SET_COOKIE, cookie)], Json(response)))
}

/// POST /auth/logout - Logout and invalidate session
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 200, description = "Logout successful"),
        (status = 401, description = "No active session")
    )
)]
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<impl IntoResponse> {
    let auth_session_id = session_id_from_headers(&headers).ok_or(PortError::Unauthorized)?;

    state
        .credentials
        .delete_auth_session(&auth_session_id)
        .await
        .map_err(|e| {
            error!("Failed to delete auth session: {}", e);
            e
        })?;

    Ok((
        StatusCode::OK,
        [(header::SET_COOKIE, session_cookie("", Duration::zero()))],
    ))
}
