//! Read-only room occupancy views over the registry.

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use crate::api::dto::{RoomListResponse, RoomSummaryDto};
use crate::app_state::AppState;
use crate::error::{ErrorResponse, RelayError};

/// `GET /rooms` — List open rooms with member counts.
#[utoipa::path(
    get,
    path = "/api/v1/rooms",
    tag = "Rooms",
    summary = "List open rooms",
    description = "Returns every room that currently has at least one member, sorted by name.",
    responses(
        (status = 200, description = "Open rooms", body = RoomListResponse),
    )
)]
pub async fn list_rooms(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.registry.snapshot().await;
    Json(RoomListResponse::from_counts(snapshot))
}

/// `GET /rooms/{room}` — Member count of one room.
///
/// # Errors
///
/// Returns [`RelayError::RoomNotFound`] if the room has no members.
#[utoipa::path(
    get,
    path = "/api/v1/rooms/{room}",
    tag = "Rooms",
    summary = "Get room occupancy",
    params(("room" = String, Path, description = "Room name")),
    responses(
        (status = 200, description = "Room is open", body = RoomSummaryDto),
        (status = 404, description = "Room is not open", body = ErrorResponse),
    )
)]
pub async fn get_room(
    State(state): State<AppState>,
    Path(room): Path<String>,
) -> Result<impl IntoResponse, RelayError> {
    let members = state.registry.member_count(&room).await;
    if members == 0 {
        return Err(RelayError::RoomNotFound(room));
    }
    Ok(Json(RoomSummaryDto { room, members }))
}

/// Room routes, nested under `/api/v1` by the caller.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/rooms", get(list_rooms))
        .route("/rooms/{room}", get(get_room))
}
