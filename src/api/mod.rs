// =============================================================================
// HTTP API — Axum 0.7 router assembly
// =============================================================================
//
// Mirrors the teacher's `api/rest.rs` router-construction shape (permissive
// CORS, a public health route, everything else behind auth) but swaps the
// single static-token `AuthBearer` surface for the per-user JWT/SSE-token
// routes this engine exposes.
// =============================================================================

pub mod auth;
pub mod autonomous;
pub mod portfolio;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::engine::EngineController;

pub fn router(engine: Arc<EngineController>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/refresh", post(auth::refresh))
        .route("/auth/me", get(auth::me))
        .route("/autonomous/sse-token", post(autonomous::issue_sse_token))
        .route("/autonomous/status", get(autonomous::status))
        .route("/autonomous/start", post(autonomous::start))
        .route("/autonomous/stop", post(autonomous::stop))
        .route("/autonomous/analysts", get(autonomous::analysts))
        .route("/autonomous/events", get(autonomous::events))
        .route("/portfolio/summary", get(portfolio::summary))
        .route("/portfolio/create", post(portfolio::create))
        .route("/portfolio/:agent_id", get(portfolio::get_agent))
        .route("/portfolio/:agent_id/positions", get(portfolio::positions))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(engine)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    server_time: i64,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        server_time: chrono::Utc::now().timestamp_millis(),
    })
}
