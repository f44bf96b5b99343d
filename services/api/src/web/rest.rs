//! services/api/src/web/rest.rs
//!
//! Contains the profile and roster handlers, the small payload types shared by every
//! REST module, and the master definition for the OpenAPI specification.

use crate::config::ProjectConfig;
use crate::error::{ApiError, ApiResult};
use crate::web::rules::Caller;
use crate::web::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    Extension,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{IntoParams, OpenApi, ToSchema};

use station_fit_core::document::paths;
use station_fit_core::domain::{FromDocument, Profile, Role, Tier, TierCheckoff};
use station_fit_core::gateway::ProfileUpdate;
use station_fit_core::ports::PortError;
use station_fit_core::session::Session;
use station_fit_core::views::{self, RosterFilter};

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::web::auth::signup_handler,
        crate::web::auth::login_handler,
        crate::web::auth::logout_handler,
        config_handler,
        get_me_handler,
        update_me_handler,
        roster_handler,
        assign_role_handler,
        set_checkoff_handler,
        toggle_checkoff_handler,
        set_tier_checkoff_handler,
        list_tier_checkoffs_handler,
        crate::web::standards::list_standards_handler,
        crate::web::standards::create_standard_handler,
        crate::web::standards::update_standard_handler,
        crate::web::standards::delete_standard_handler,
        crate::web::standards::swap_standards_handler,
        crate::web::standards::normalize_standards_handler,
        crate::web::standards::seed_standards_handler,
        crate::web::standards::get_record_handler,
        crate::web::standards::set_record_handler,
        crate::web::challenges::list_challenges_handler,
        crate::web::challenges::create_challenge_handler,
        crate::web::challenges::set_active_handler,
        crate::web::challenges::weekly_board_handler,
        crate::web::challenges::log_weekly_handler,
        crate::web::challenges::delete_weekly_log_handler,
        crate::web::challenges::monthly_board_handler,
        crate::web::challenges::submit_monthly_handler,
        crate::web::challenges::delete_monthly_handler,
        crate::web::challenges::hall_of_fame_handler,
        crate::web::challenges::streak_handler,
        crate::web::board::list_messages_handler,
        crate::web::board::post_message_handler,
        crate::web::board::edit_message_handler,
        crate::web::board::delete_message_handler,
        crate::web::board::set_pinned_handler,
        crate::web::board::get_settings_handler,
        crate::web::board::put_settings_handler,
    ),
    components(
        schemas(ProjectConfig, Created, Count, DoneBody, RoleBody)
    ),
    tags(
        (name = "Station 1 Fit API", description = "Standards, challenges, leaderboards and announcements for the station.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// Shared Payload Structs
//=========================================================================================

/// Returned after creating a document with a generated id.
#[derive(Serialize, ToSchema)]
pub struct Created {
    pub id: String,
}

#[derive(Serialize, ToSchema)]
pub struct Count {
    pub count: usize,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct DoneBody {
    pub done: bool,
}

#[derive(Deserialize, ToSchema)]
pub struct RoleBody {
    pub role: Role,
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RosterQuery {
    /// member, mentor, admin or owner
    pub role: Option<String>,
    /// committed, developed, advanced or elite
    pub tier: Option<String>,
    pub shift: Option<String>,
}

impl RosterQuery {
    fn into_filter(self) -> ApiResult<RosterFilter> {
        Ok(RosterFilter {
            role: self.role.as_deref().map(str::parse::<Role>).transpose()?,
            tier: self.tier.as_deref().map(str::parse::<Tier>).transpose()?,
            shift: self.shift.filter(|s| !s.trim().is_empty()),
        })
    }
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// The hosted project identifiers the client needs to boot.
#[utoipa::path(
    get,
    path = "/config",
    responses((status = 200, description = "Project configuration", body = ProjectConfig))
)]
pub async fn config_handler(State(state): State<Arc<AppState>>) -> Json<ProjectConfig> {
    Json(state.config.project.clone())
}

/// The caller's profile, as resolved for this request.
#[utoipa::path(
    get,
    path = "/me",
    responses(
        (status = 200, description = "The caller's profile", body = Profile),
        (status = 401, description = "Not signed in")
    )
)]
pub async fn get_me_handler(Extension(session): Extension<Session>) -> Json<Profile> {
    Json(session.profile)
}

/// Update the caller's display name, shift or tier.
#[utoipa::path(
    patch,
    path = "/me",
    request_body = ProfileUpdate,
    responses(
        (status = 200, description = "Profile updated", body = Profile),
        (status = 400, description = "Nothing to update or an empty display name")
    )
)]
pub async fn update_me_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Json(update): Json<ProfileUpdate>,
) -> ApiResult<Json<Profile>> {
    state.gateway(&session).update_own_profile(update).await?;
    let doc = state
        .store_for(Caller::from(&session))
        .get(&paths::profile(session.uid()))
        .await?
        .ok_or_else(|| PortError::NotFound(format!("Profile {} not found", session.uid())))?;
    Ok(Json(Profile::from_document(&doc)?))
}

/// Every profile, filtered by role, tier or shift and sorted by name.
#[utoipa::path(
    get,
    path = "/roster",
    params(RosterQuery),
    responses(
        (status = 200, description = "Matching profiles", body = Vec<Profile>),
        (status = 400, description = "Unknown role or tier")
    )
)]
pub async fn roster_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Query(query): Query<RosterQuery>,
) -> ApiResult<Json<Vec<Profile>>> {
    let filter = query.into_filter()?;
    let store = state.store_for(Caller::from(&session));
    Ok(Json(views::read_roster(store.as_ref(), &filter).await?))
}

/// Change a member's role. Owner only.
#[utoipa::path(
    put,
    path = "/profiles/{id}/role",
    params(("id" = String, Path, description = "Profile id")),
    request_body = RoleBody,
    responses(
        (status = 204, description = "Role assigned"),
        (status = 403, description = "Caller is not the owner"),
        (status = 404, description = "No such profile")
    )
)]
pub async fn assign_role_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Path(id): Path<String>,
    Json(body): Json<RoleBody>,
) -> ApiResult<StatusCode> {
    state.gateway(&session).assign_role(&id, body.role).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Mark one standard passed or not for a member. Staff only.
#[utoipa::path(
    put,
    path = "/profiles/{id}/checkoffs/{standard_id}",
    params(
        ("id" = String, Path, description = "Profile id"),
        ("standard_id" = String, Path, description = "Standard id")
    ),
    request_body = DoneBody,
    responses(
        (status = 204, description = "Checkoff written"),
        (status = 403, description = "Caller is not staff")
    )
)]
pub async fn set_checkoff_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Path((id, standard_id)): Path<(String, String)>,
    Json(body): Json<DoneBody>,
) -> ApiResult<StatusCode> {
    state.gateway(&session).set_checkoff(&id, &standard_id, body.done).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Flip a checkoff, creating it on first use. Staff only.
#[utoipa::path(
    post,
    path = "/profiles/{id}/checkoffs/{standard_id}/toggle",
    params(
        ("id" = String, Path, description = "Profile id"),
        ("standard_id" = String, Path, description = "Standard id")
    ),
    responses(
        (status = 200, description = "The new state", body = DoneBody),
        (status = 403, description = "Caller is not staff")
    )
)]
pub async fn toggle_checkoff_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Path((id, standard_id)): Path<(String, String)>,
) -> ApiResult<Json<DoneBody>> {
    let done = state.gateway(&session).toggle_checkoff(&id, &standard_id).await?;
    Ok(Json(DoneBody { done }))
}

/// Mark a whole tier completed for a member. Staff only.
#[utoipa::path(
    put,
    path = "/profiles/{id}/tiers/{tier}",
    params(
        ("id" = String, Path, description = "Profile id"),
        ("tier" = String, Path, description = "committed, developed, advanced or elite")
    ),
    request_body = DoneBody,
    responses(
        (status = 204, description = "Tier checkoff written"),
        (status = 400, description = "Unknown tier"),
        (status = 403, description = "Caller is not staff")
    )
)]
pub async fn set_tier_checkoff_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Path((id, tier)): Path<(String, String)>,
    Json(body): Json<DoneBody>,
) -> ApiResult<StatusCode> {
    let tier: Tier = tier.parse().map_err(ApiError::from)?;
    state.gateway(&session).set_tier_checkoff(&id, tier, body.done).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Whole-tier sign-offs recorded for a member.
#[utoipa::path(
    get,
    path = "/profiles/{id}/tiers",
    params(("id" = String, Path, description = "Profile id")),
    responses(
        (status = 200, description = "Tier sign-offs, lowest tier first", body = Vec<TierCheckoff>),
        (status = 401, description = "Not signed in")
    )
)]
pub async fn list_tier_checkoffs_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<TierCheckoff>>> {
    let store = state.store_for(Caller::from(&session));
    Ok(Json(views::read_tier_checkoffs(store.as_ref(), &id).await?))
}
