//! services/api/src/web/board.rs
//!
//! The announcement board and the free-form settings documents.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    Extension,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

use station_fit_core::document::{paths, Fields};
use station_fit_core::domain::{FromDocument, Message, Settings};
use station_fit_core::gateway::{MessageDraft, MessageUpdate};
use station_fit_core::ports::PortError;
use station_fit_core::session::Session;
use station_fit_core::views;

use crate::error::ApiResult;
use crate::web::rest::Created;
use crate::web::rules::Caller;
use crate::web::state::AppState;

#[derive(Deserialize, ToSchema)]
pub struct PinnedBody {
    pub pinned: bool,
}

/// Arbitrary fields merged into a settings document.
#[derive(Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
#[schema(value_type = Object)]
pub struct SettingsPatch(pub Fields);

/// Announcements, pinned first and then newest first.
#[utoipa::path(
    get,
    path = "/messages",
    responses((status = 200, description = "The board", body = Vec<Message>))
)]
pub async fn list_messages_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
) -> ApiResult<Json<Vec<Message>>> {
    let store = state.store_for(Caller::from(&session));
    let board = views::read_messages(store.as_ref()).await?;
    if let Some(error) = board.error {
        return Err(PortError::Unavailable(error).into());
    }
    Ok(Json(board.view.unwrap_or_default()))
}

#[utoipa::path(
    post,
    path = "/messages",
    request_body = MessageDraft,
    responses(
        (status = 201, description = "Message posted", body = Created),
        (status = 400, description = "Missing title"),
        (status = 403, description = "Caller is not staff")
    )
)]
pub async fn post_message_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Json(draft): Json<MessageDraft>,
) -> ApiResult<(StatusCode, Json<Created>)> {
    let id = state.gateway(&session).post_message(draft).await?;
    Ok((StatusCode::CREATED, Json(Created { id })))
}

#[utoipa::path(
    patch,
    path = "/messages/{id}",
    params(("id" = String, Path, description = "Message id")),
    request_body = MessageUpdate,
    responses(
        (status = 204, description = "Message edited"),
        (status = 403, description = "Caller is not staff")
    )
)]
pub async fn edit_message_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Path(id): Path<String>,
    Json(update): Json<MessageUpdate>,
) -> ApiResult<StatusCode> {
    state.gateway(&session).edit_message(&id, update).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    delete,
    path = "/messages/{id}",
    params(("id" = String, Path, description = "Message id")),
    responses(
        (status = 204, description = "Message deleted"),
        (status = 403, description = "Caller is not staff")
    )
)]
pub async fn delete_message_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.gateway(&session).delete_message(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    put,
    path = "/messages/{id}/pinned",
    params(("id" = String, Path, description = "Message id")),
    request_body = PinnedBody,
    responses(
        (status = 204, description = "Pin state written"),
        (status = 403, description = "Caller is not staff")
    )
)]
pub async fn set_pinned_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Path(id): Path<String>,
    Json(body): Json<PinnedBody>,
) -> ApiResult<StatusCode> {
    state.gateway(&session).set_pinned(&id, body.pinned).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/settings/{key}",
    params(("key" = String, Path, description = "Settings document, e.g. quote")),
    responses(
        (status = 200, description = "The stored fields", body = SettingsPatch),
        (status = 404, description = "Nothing stored under this key")
    )
)]
pub async fn get_settings_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Path(key): Path<String>,
) -> ApiResult<Json<SettingsPatch>> {
    let doc = state
        .store_for(Caller::from(&session))
        .get(&paths::settings(&key))
        .await?
        .ok_or_else(|| PortError::NotFound(format!("No settings under {}", key)))?;
    let settings = Settings::from_document(&doc)?;
    Ok(Json(SettingsPatch(settings.fields)))
}

/// Merge fields into a settings document. Owner only.
#[utoipa::path(
    put,
    path = "/settings/{key}",
    params(("key" = String, Path, description = "Settings document, e.g. quote")),
    request_body = SettingsPatch,
    responses(
        (status = 204, description = "Settings merged"),
        (status = 403, description = "Caller is not the owner")
    )
)]
pub async fn put_settings_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Path(key): Path<String>,
    Json(SettingsPatch(fields)): Json<SettingsPatch>,
) -> ApiResult<StatusCode> {
    state.gateway(&session).write_settings(&key, fields).await?;
    Ok(StatusCode::NO_CONTENT)
}
