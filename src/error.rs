use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::{dom::DomError, fetcher::FetchError};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            AppError::InvalidInput(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            _ => {
                tracing::error!("Internal server error: {}", self);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        let body = Json(json!({
            "error": error_message,
            "status": status.as_u16(),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        }));

        (status, body).into_response()
    }
}

/// Why a feature group could not be computed. The assembler turns any of
/// these into sentinel values for the fields the group owns.
#[derive(Error, Debug)]
pub enum FeatureError {
    #[error("page fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("DOM extraction failed: {0}")]
    Dom(#[from] DomError),

    #[error("lexical analysis aborted: {0}")]
    Lexical(String),
}

// Helper function for creating validation errors
pub fn validation_error(msg: &str) -> AppError {
    AppError::InvalidInput(msg.to_string())
}
