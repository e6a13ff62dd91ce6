use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

/// Errors answered synchronously, before any queue entry or side-table
/// write exists for the request.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Invalid JSON")]
    InvalidJson(#[source] serde_json::Error),
    #[error("Prompt is required")]
    PromptRequired,
    #[error("Screenshot not found")]
    ScreenshotNotFound,
    #[error("Screenshot data is not valid base64")]
    InvalidScreenshot(#[source] base64::DecodeError),
}

impl BridgeError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidJson(_) | Self::PromptRequired => StatusCode::BAD_REQUEST,
            Self::ScreenshotNotFound => StatusCode::NOT_FOUND,
            Self::InvalidScreenshot(_) => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }
}

impl IntoResponse for BridgeError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}
