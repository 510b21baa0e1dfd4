use axum::{
    routing::{any, get},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers;
use super::signaling_ws::signaling_ws_handler;
use super::ws::ws_handler;
use crate::state::AppState;

/// Create the main application router
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/rooms", get(handlers::list_rooms))
        .route("/rooms/:id", get(handlers::get_room))
        // Signaling channel for streamers and viewers
        .route("/signaling", any(signaling_ws_handler))
        // WebSocket endpoint for room events
        .route("/ws", any(ws_handler));

    Router::new()
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
