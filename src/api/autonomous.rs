// =============================================================================
// Autonomous engine control routes
// =============================================================================

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::auth::AuthUser;
use crate::engine::{EngineController, EngineStatus};
use crate::error::EngineError;

pub use crate::sse::gateway::{issue_sse_token, stream_events as events};

#[derive(Debug, Deserialize)]
pub struct StartRequest {
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct ActionResponse {
    success: bool,
}

pub async fn status(
    State(engine): State<Arc<EngineController>>,
    _auth: AuthUser,
) -> Json<EngineStatus> {
    Json(engine.get_status())
}

pub async fn start(
    State(engine): State<Arc<EngineController>>,
    AuthUser(user_id): AuthUser,
    body: Option<Json<StartRequest>>,
) -> Result<Json<ActionResponse>, EngineError> {
    let target_user = body
        .and_then(|Json(b)| b.user_id)
        .unwrap_or(user_id);

    engine
        .start(target_user)
        .await
        .map_err(EngineError::TransientExchange)?;

    Ok(Json(ActionResponse { success: true }))
}

pub async fn stop(
    State(engine): State<Arc<EngineController>>,
    _auth: AuthUser,
) -> Json<ActionResponse> {
    engine.stop();
    Json(ActionResponse { success: true })
}

pub async fn analysts(
    State(engine): State<Arc<EngineController>>,
    _auth: AuthUser,
) -> Json<Vec<crate::engine::AnalystStatus>> {
    Json(engine.get_status().analysts)
}
