// src/error.rs
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// Failures of the streaming transport. Fragment-level parse failures never
/// show up here; the decoder logs and skips them.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StreamError {
    #[error("{0}")]
    Connection(String),

    #[error("Streaming not supported")]
    StreamUnsupported,

    #[error("backend responded with HTTP {status}: {body}")]
    Backend { status: u16, body: String },

    #[error("{0}")]
    Interrupted(String),
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("a response is still being generated for this session")]
    Busy,

    #[error("Failed to connect to Ollama server")]
    Relay(#[source] reqwest::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Busy => StatusCode::CONFLICT,
            AppError::Relay(err) => {
                tracing::error!(error = %err, "error fetching from Ollama");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
