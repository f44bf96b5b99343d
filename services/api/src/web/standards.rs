//! services/api/src/web/standards.rs
//!
//! Handlers for the standards catalog, its ordering, and per-standard records.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    Extension,
};
use serde::Deserialize;
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};

use station_fit_core::domain::{Record, Tier};
use station_fit_core::gateway::{RecordDraft, StandardDraft, StandardUpdate};
use station_fit_core::ports::PortError;
use station_fit_core::session::Session;
use station_fit_core::views::{self, StandardsPage};

use crate::error::ApiResult;
use crate::web::rest::{Count, Created};
use crate::web::rules::Caller;
use crate::web::state::AppState;

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
#[serde(rename_all = "camelCase")]
pub struct StandardsQuery {
    /// Defaults to committed.
    pub tier: Option<String>,
    /// Adds the member's progress through the tier.
    pub profile_id: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct SwapBody {
    pub a: String,
    pub b: String,
}

#[derive(Deserialize, ToSchema)]
pub struct TierBody {
    pub tier: Tier,
}

/// Standards of one tier in display order, with the built-in list while the catalog is empty.
#[utoipa::path(
    get,
    path = "/standards",
    params(StandardsQuery),
    responses(
        (status = 200, description = "The tier's standards and, if asked for, the member's progress"),
        (status = 400, description = "Unknown tier")
    )
)]
pub async fn list_standards_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Query(query): Query<StandardsQuery>,
) -> ApiResult<Json<StandardsPage>> {
    let tier = match query.tier.as_deref() {
        Some(raw) => raw.parse::<Tier>()?,
        None => Tier::Committed,
    };
    let store = state.store_for(Caller::from(&session));
    let page = views::read_standards_page(store.as_ref(), tier, query.profile_id.as_deref()).await?;
    Ok(Json(page))
}

#[utoipa::path(
    post,
    path = "/standards",
    request_body = StandardDraft,
    responses(
        (status = 201, description = "Standard created", body = Created),
        (status = 400, description = "Missing title"),
        (status = 403, description = "Caller is not staff")
    )
)]
pub async fn create_standard_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Json(draft): Json<StandardDraft>,
) -> ApiResult<(StatusCode, Json<Created>)> {
    let id = state.gateway(&session).create_standard(draft).await?;
    Ok((StatusCode::CREATED, Json(Created { id })))
}

#[utoipa::path(
    patch,
    path = "/standards/{id}",
    params(("id" = String, Path, description = "Standard id")),
    request_body = StandardUpdate,
    responses(
        (status = 204, description = "Standard updated"),
        (status = 403, description = "Caller is not staff")
    )
)]
pub async fn update_standard_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Path(id): Path<String>,
    Json(update): Json<StandardUpdate>,
) -> ApiResult<StatusCode> {
    state.gateway(&session).update_standard(&id, update).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    delete,
    path = "/standards/{id}",
    params(("id" = String, Path, description = "Standard id")),
    responses(
        (status = 204, description = "Standard deleted"),
        (status = 403, description = "Caller is not staff")
    )
)]
pub async fn delete_standard_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.gateway(&session).delete_standard(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Exchange the sort keys of two standards atomically.
#[utoipa::path(
    post,
    path = "/standards/swap",
    request_body = SwapBody,
    responses(
        (status = 204, description = "Order swapped"),
        (status = 400, description = "The same standard twice"),
        (status = 403, description = "Caller is not staff"),
        (status = 404, description = "One of the standards does not exist")
    )
)]
pub async fn swap_standards_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Json(body): Json<SwapBody>,
) -> ApiResult<StatusCode> {
    state.gateway(&session).swap_standard_order(&body.a, &body.b).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Renumber a tier 1..n in its current display order.
#[utoipa::path(
    post,
    path = "/standards/normalize",
    request_body = TierBody,
    responses(
        (status = 200, description = "Standards renumbered", body = Count),
        (status = 403, description = "Caller is not staff")
    )
)]
pub async fn normalize_standards_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Json(body): Json<TierBody>,
) -> ApiResult<Json<Count>> {
    let count = state.gateway(&session).normalize_standard_order(body.tier).await?;
    Ok(Json(Count { count }))
}

/// Fill an empty catalog from the built-in list. A populated catalog is left alone.
#[utoipa::path(
    post,
    path = "/standards/seed",
    responses(
        (status = 200, description = "Number of standards written", body = Count),
        (status = 403, description = "Caller is not staff")
    )
)]
pub async fn seed_standards_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
) -> ApiResult<Json<Count>> {
    let count = state.gateway(&session).seed_standards().await?;
    Ok(Json(Count { count }))
}

#[utoipa::path(
    get,
    path = "/standards/{id}/record",
    params(("id" = String, Path, description = "Standard id")),
    responses(
        (status = 200, description = "The current record", body = Record),
        (status = 404, description = "No record set yet")
    )
)]
pub async fn get_record_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Path(id): Path<String>,
) -> ApiResult<Json<Record>> {
    let store = state.store_for(Caller::from(&session));
    let record = views::read_record(store.as_ref(), &id)
        .await?
        .ok_or_else(|| PortError::NotFound(format!("No record for standard {}", id)))?;
    Ok(Json(record))
}

/// Replace the current record of a standard. Admin or owner.
#[utoipa::path(
    put,
    path = "/standards/{id}/record",
    params(("id" = String, Path, description = "Standard id")),
    request_body = RecordDraft,
    responses(
        (status = 204, description = "Record replaced"),
        (status = 400, description = "Missing holder or invalid value"),
        (status = 403, description = "Caller is not admin or owner")
    )
)]
pub async fn set_record_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Path(id): Path<String>,
    Json(draft): Json<RecordDraft>,
) -> ApiResult<StatusCode> {
    state.gateway(&session).set_record(&id, draft).await?;
    Ok(StatusCode::NO_CONTENT)
}
