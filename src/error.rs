// =============================================================================
// Engine error taxonomy
// =============================================================================
//
// Every axum handler and every pipeline stage ultimately resolves to one of
// these variants so that callers can match on failure class instead of
// string-sniffing an `anyhow::Error`. Transient/infrastructure failures still
// flow through `anyhow::Result` at the adapter layer and get wrapped here via
// `#[from]`.
// =============================================================================

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("exchange call failed: {0}")]
    TransientExchange(#[from] anyhow::Error),

    #[error("analyst returned a malformed response: {0}")]
    MalformedLlmResponse(String),

    #[error("database error: {0}")]
    Persistence(#[from] sqlx::Error),

    #[error("engine is already running")]
    AlreadyRunning,

    #[error("engine is not running")]
    NotRunning,
}

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        let status = match &self {
            EngineError::Authentication(_) => StatusCode::UNAUTHORIZED,
            EngineError::Validation(_) => StatusCode::BAD_REQUEST,
            EngineError::AlreadyRunning | EngineError::NotRunning => StatusCode::CONFLICT,
            EngineError::TransientExchange(_)
            | EngineError::MalformedLlmResponse(_)
            | EngineError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(serde_json::json!({
            "success": false,
            "error": self.to_string(),
        }));

        (status, body).into_response()
    }
}
