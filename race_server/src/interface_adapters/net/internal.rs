use crate::interface_adapters::http::ErrorResponse;
use crate::interface_adapters::protocol::{MapListingDto, RoomListingDto};
use crate::interface_adapters::state::AppState;

use axum::{
    extract::{Json, State},
    http::{StatusCode, Uri},
    response::IntoResponse,
};
use std::sync::Arc;

/// Open public rooms with their phase and head count.
pub async fn list_rooms_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let rooms: Vec<RoomListingDto> = state
        .registry
        .list_public()
        .await
        .iter()
        .map(RoomListingDto::from)
        .collect();
    (StatusCode::OK, Json(rooms)).into_response()
}

pub async fn list_maps_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let maps: Vec<MapListingDto> = state
        .registry
        .catalog()
        .iter()
        .map(MapListingDto::from)
        .collect();
    (StatusCode::OK, Json(maps)).into_response()
}

pub async fn not_found_handler(uri: Uri) -> impl IntoResponse {
    // Keep unknown routes on the same JSON error schema as the rest of the API.
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: format!("no route for {}", uri.path()),
        }),
    )
        .into_response()
}
