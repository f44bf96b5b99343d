//! services/api/src/web/challenges.rs
//!
//! Weekly and monthly challenges, their leaderboards, the hall of fame and member streaks.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    Extension,
};
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};

use station_fit_core::domain::PeriodKind;
use station_fit_core::gateway::{ChallengeDraft, ScoreSubmission};
use station_fit_core::period;
use station_fit_core::session::Session;
use station_fit_core::views::{self, BoardPage, ChallengeList, HallOfFame, StreakView};

use crate::error::{ApiError, ApiResult};
use crate::web::rest::Created;
use crate::web::rules::Caller;
use crate::web::state::AppState;

const DEFAULT_HALL_OF_FAME_MONTHS: usize = 12;

#[derive(Deserialize, ToSchema)]
pub struct ActiveBody {
    pub active: bool,
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct HallOfFameQuery {
    /// Last month counted, `YYYY-MM`. Defaults to the current month.
    pub through: Option<String>,
    /// Number of months counted, 1 to 60. Defaults to 12.
    pub months: Option<usize>,
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct StreakQuery {
    /// Last month counted, `YYYY-MM`. Defaults to the current month.
    pub through: Option<String>,
}

fn current_month() -> String {
    period::month_id(Utc::now().date_naive())
}

//=========================================================================================
// Challenges
//=========================================================================================

#[utoipa::path(
    get,
    path = "/challenges/{kind}",
    params(("kind" = String, Path, description = "weekly or monthly")),
    responses(
        (status = 200, description = "Challenges newest first, with the active one"),
        (status = 400, description = "Unknown kind")
    )
)]
pub async fn list_challenges_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Path(kind): Path<String>,
) -> ApiResult<Json<ChallengeList>> {
    let kind: PeriodKind = kind.parse()?;
    let store = state.store_for(Caller::from(&session));
    Ok(Json(views::read_challenges(store.as_ref(), kind).await?))
}

/// Create or replace the challenge for one period. Owner only.
#[utoipa::path(
    post,
    path = "/challenges/{kind}",
    params(("kind" = String, Path, description = "weekly or monthly")),
    request_body = ChallengeDraft,
    responses(
        (status = 201, description = "Challenge written"),
        (status = 400, description = "Bad period id or missing title"),
        (status = 403, description = "Caller is not the owner")
    )
)]
pub async fn create_challenge_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Path(kind): Path<String>,
    Json(draft): Json<ChallengeDraft>,
) -> ApiResult<StatusCode> {
    let kind: PeriodKind = kind.parse()?;
    state.gateway(&session).create_challenge(kind, draft).await?;
    Ok(StatusCode::CREATED)
}

#[utoipa::path(
    put,
    path = "/challenges/{kind}/{id}/active",
    params(
        ("kind" = String, Path, description = "weekly or monthly"),
        ("id" = String, Path, description = "Period id")
    ),
    request_body = ActiveBody,
    responses(
        (status = 204, description = "Active flag written"),
        (status = 403, description = "Caller is not the owner")
    )
)]
pub async fn set_active_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Path((kind, id)): Path<(String, String)>,
    Json(body): Json<ActiveBody>,
) -> ApiResult<StatusCode> {
    let kind: PeriodKind = kind.parse()?;
    state.gateway(&session).set_challenge_active(kind, &id, body.active).await?;
    Ok(StatusCode::NO_CONTENT)
}

//=========================================================================================
// Weekly
//=========================================================================================

/// The week's challenge and its leaderboard, summing every log per member.
#[utoipa::path(
    get,
    path = "/weekly/{week_id}",
    params(("week_id" = String, Path, description = "ISO week, YYYY-Www")),
    responses(
        (status = 200, description = "Challenge and leaderboard"),
        (status = 400, description = "Malformed week id")
    )
)]
pub async fn weekly_board_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Path(week_id): Path<String>,
) -> ApiResult<Json<BoardPage>> {
    let store = state.store_for(Caller::from(&session));
    Ok(Json(views::read_weekly_board(store.as_ref(), &week_id).await?))
}

#[utoipa::path(
    post,
    path = "/weekly/{week_id}/logs",
    params(("week_id" = String, Path, description = "ISO week, YYYY-Www")),
    request_body = ScoreSubmission,
    responses(
        (status = 201, description = "Log appended", body = Created),
        (status = 400, description = "Malformed week id or score")
    )
)]
pub async fn log_weekly_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Path(week_id): Path<String>,
    Json(submission): Json<ScoreSubmission>,
) -> ApiResult<(StatusCode, Json<Created>)> {
    let id = state.gateway(&session).log_weekly(&week_id, submission).await?;
    Ok((StatusCode::CREATED, Json(Created { id })))
}

/// Remove one log. Its author or staff.
#[utoipa::path(
    delete,
    path = "/weekly/{week_id}/logs/{id}",
    params(
        ("week_id" = String, Path, description = "ISO week, YYYY-Www"),
        ("id" = String, Path, description = "Log id")
    ),
    responses(
        (status = 204, description = "Log deleted"),
        (status = 403, description = "Caller is neither the author nor staff")
    )
)]
pub async fn delete_weekly_log_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Path((week_id, id)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    state.gateway(&session).delete_weekly_log(&week_id, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

//=========================================================================================
// Monthly
//=========================================================================================

/// The month's challenge and its leaderboard, one entry per member.
#[utoipa::path(
    get,
    path = "/monthly/{month_id}",
    params(("month_id" = String, Path, description = "YYYY-MM")),
    responses(
        (status = 200, description = "Challenge and leaderboard"),
        (status = 400, description = "Malformed month id")
    )
)]
pub async fn monthly_board_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Path(month_id): Path<String>,
) -> ApiResult<Json<BoardPage>> {
    let store = state.store_for(Caller::from(&session));
    Ok(Json(views::read_monthly_board(store.as_ref(), &month_id).await?))
}

/// Write the caller's entry for the month, replacing any earlier one.
#[utoipa::path(
    put,
    path = "/monthly/{month_id}/entry",
    params(("month_id" = String, Path, description = "YYYY-MM")),
    request_body = ScoreSubmission,
    responses(
        (status = 204, description = "Entry written"),
        (status = 400, description = "Malformed month id or score")
    )
)]
pub async fn submit_monthly_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Path(month_id): Path<String>,
    Json(submission): Json<ScoreSubmission>,
) -> ApiResult<StatusCode> {
    state.gateway(&session).submit_monthly_entry(&month_id, submission).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    delete,
    path = "/monthly/{month_id}/entries/{profile_id}",
    params(
        ("month_id" = String, Path, description = "YYYY-MM"),
        ("profile_id" = String, Path, description = "Entry owner")
    ),
    responses(
        (status = 204, description = "Entry deleted"),
        (status = 403, description = "Caller is neither the author nor staff")
    )
)]
pub async fn delete_monthly_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Path((month_id, profile_id)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    state.gateway(&session).delete_monthly_entry(&month_id, &profile_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

//=========================================================================================
// Standings
//=========================================================================================

/// Gold, silver and bronze finishes per member across recent monthly challenges.
#[utoipa::path(
    get,
    path = "/hall-of-fame",
    params(HallOfFameQuery),
    responses(
        (status = 200, description = "Podium standings"),
        (status = 400, description = "Malformed month id or months out of range")
    )
)]
pub async fn hall_of_fame_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Query(query): Query<HallOfFameQuery>,
) -> ApiResult<Json<HallOfFame>> {
    let through = query.through.unwrap_or_else(current_month);
    let months = query.months.unwrap_or(DEFAULT_HALL_OF_FAME_MONTHS);
    if !(1..=period::MAX_LOOKBACK_MONTHS).contains(&months) {
        return Err(ApiError::BadRequest(format!(
            "months must be between 1 and {}",
            period::MAX_LOOKBACK_MONTHS
        )));
    }
    let store = state.store_for(Caller::from(&session));
    Ok(Json(views::read_hall_of_fame(store.as_ref(), &through, months).await?))
}

#[utoipa::path(
    get,
    path = "/streak/{profile_id}",
    params(
        ("profile_id" = String, Path, description = "Member"),
        StreakQuery
    ),
    responses(
        (status = 200, description = "Consecutive completed months"),
        (status = 400, description = "Malformed month id")
    )
)]
pub async fn streak_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Path(profile_id): Path<String>,
    Query(query): Query<StreakQuery>,
) -> ApiResult<Json<StreakView>> {
    let through = query.through.unwrap_or_else(current_month);
    let store = state.store_for(Caller::from(&session));
    Ok(Json(views::read_monthly_streak(store.as_ref(), &profile_id, &through).await?))
}
