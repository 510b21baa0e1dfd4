use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::signaling::RoomInfo;
use crate::state::AppState;

// ============================================================================
// Health & Info
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub rooms: usize,
}

pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        rooms: state.relay.registry().len(),
    })
}

// ============================================================================
// Rooms
// ============================================================================

#[derive(Serialize)]
pub struct RoomListResponse {
    pub success: bool,
    pub rooms: Vec<RoomInfo>,
}

/// List every active room, sorted by id
pub async fn list_rooms(State(state): State<Arc<AppState>>) -> Json<RoomListResponse> {
    Json(RoomListResponse {
        success: true,
        rooms: state.relay.rooms(),
    })
}

pub async fn get_room(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<RoomInfo>> {
    state
        .relay
        .registry()
        .get_room(&id)
        .map(Json)
        .ok_or(AppError::RoomNotFound(id))
}
