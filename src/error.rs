use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Application-wide error type
///
/// The first four variants are the signaling taxonomy reported back to the
/// originating connection; the rest cover startup and HTTP concerns.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Room not found: {0}")]
    RoomNotFound(String),

    #[error("Media negotiation failed: {0}")]
    MediaNegotiationFailed(String),

    #[error("Media server unavailable: {0}")]
    GatewayUnavailable(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error response body (unified success format)
#[derive(Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub message: String,
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::InvalidMessage(_) => StatusCode::BAD_REQUEST,
            AppError::RoomNotFound(_) => StatusCode::NOT_FOUND,
            AppError::GatewayUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::MediaNegotiationFailed(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            success: false,
            message: self.to_string(),
        };

        tracing::error!(
            error_type = std::any::type_name_of_val(&self),
            error_message = %body.message,
            "Request failed"
        );

        (status, Json(body)).into_response()
    }
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AppError>;
