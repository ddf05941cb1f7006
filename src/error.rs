use axum::{http::StatusCode, response::{IntoResponse, Response}, Json};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IllustratorError {
    /// Missing or invalid user input, caught before any network call.
    #[error("{0}")]
    Validation(String),
    /// Non-success status from one of the Gemini endpoints.
    #[error("API error: {0}")]
    Remote(String),
    /// The request never got a response.
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("{0}")]
    PromptGeneration(String),
    #[error("No image data received.")]
    NoImageData,
    #[error("Storage error: {0}")]
    Persistence(String),
    #[error("Unknown prompt: {0}")]
    UnknownPrompt(Uuid),
}

impl IllustratorError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Text written onto a prompt item when its image call fails.
    pub fn image_failure_text(&self) -> String {
        match self {
            Self::Validation(_) | Self::NoImageData => self.to_string(),
            other => format!("Failed to generate image: {other}"),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::UnknownPrompt(_) => StatusCode::NOT_FOUND,
            Self::Remote(_) | Self::Http(_) | Self::PromptGeneration(_) | Self::NoImageData => StatusCode::BAD_GATEWAY,
            Self::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for IllustratorError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("❌ {}", self);
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
