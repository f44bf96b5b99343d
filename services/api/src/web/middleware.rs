//! services/api/src/web/middleware.rs
//!
//! Authentication middleware for protecting routes.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, warn};

use station_fit_core::domain::Identity;

use crate::web::state::AppState;

/// Name of the cookie carrying the auth session id.
pub const SESSION_COOKIE: &str = "session";

/// Reads the auth session id from the `Cookie` header.
pub fn session_id_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())?
        .split(';')
        .find_map(|c| {
            c.trim()
                .strip_prefix(SESSION_COOKIE)
                .and_then(|rest| rest.strip_prefix('='))
                .map(str::to_string)
        })
        .filter(|id| !id.is_empty())
}

/// Middleware that validates the auth session cookie and resolves the caller's profile.
///
/// If valid, inserts the `Identity` and the resolved `Session` into the request
/// extensions for handlers to use. A missing or expired cookie returns 401; a profile
/// that cannot be resolved yet returns 503 so clients show a loading state.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, Response> {
    // 1. Parse session ID from cookie
    let auth_session_id =
        session_id_from_headers(req.headers()).ok_or_else(|| StatusCode::UNAUTHORIZED.into_response())?;

    // 2. Validate auth session in the credential store, get user_id
    let user_id = state
        .credentials
        .validate_auth_session(&auth_session_id)
        .await
        .map_err(|e| {
            warn!("Failed to validate auth session: {}", e);
            StatusCode::UNAUTHORIZED.into_response()
        })?;

    let user = state.credentials.get_user_by_id(user_id).await.map_err(|e| {
        error!("Session {} points at a missing user: {}", auth_session_id, e);
        StatusCode::UNAUTHORIZED.into_response()
    })?;

    // 3. Resolve the profile, creating it on first sign-in
    let identity = Identity {
        uid: user_id.to_string(),
        email: Some(user.email),
        display_name: None,
    };
    let resolved = state.resolver_for(&identity.uid).resolve(Some(identity.clone())).await;
    let Some(session) = resolved.session() else {
        let message = resolved.error.unwrap_or_else(|| "Session is still loading".to_string());
        return Err((StatusCode::SERVICE_UNAVAILABLE, Json(json!({ "error": message, "loading": true }))).into_response());
    };

    // 4. Insert identity and session into request extensions
    req.extensions_mut().insert(identity);
    req.extensions_mut().insert(session);

    // 5. Continue to the handler
    Ok(next.run(req).await)
}
