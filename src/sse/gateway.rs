// =============================================================================
// SSE Gateway — event-driven server push, generalized from the teacher's
// WebSocket push/recv loop
// =============================================================================
//
// SSE is server-to-client only, so there is no recv side: disconnect is
// detected when the stream's writer fails, mirroring the teacher's
// `cleanup()` on `break` in `api/ws.rs`.
// =============================================================================

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use async_stream::stream;
use axum::extract::{Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::Json;
use axum_extra::headers::authorization::Bearer;
use axum_extra::headers::Authorization;
use axum_extra::TypedHeader;
use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::time::interval;
use tracing::{info, warn};

use crate::engine::EngineController;
use crate::error::EngineError;
use crate::event_bus::recv_resilient;

const KEEPALIVE_SECS: u64 = 30;

#[derive(Debug, Deserialize)]
pub struct SseTokenQuery {
    #[serde(rename = "sseToken")]
    pub sse_token: Option<String>,
    pub token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SseTokenResponse {
    pub sse_token: String,
    pub expires_in: u64,
}

/// `POST /sse-token` — issue a fresh 60-second SSE token for the
/// bearer-authenticated caller.
pub async fn issue_sse_token(
    State(engine): State<Arc<EngineController>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<SseTokenResponse>, EngineError> {
    let user_id = engine
        .authenticate_bearer(auth.token())
        .ok_or_else(|| EngineError::Authentication("invalid bearer token".to_string()))?;

    let ttl = engine.config().sse_token_ttl_secs;
    let token = engine.sse_tokens().issue(&user_id, ttl);

    Ok(Json(SseTokenResponse {
        sse_token: token,
        expires_in: ttl,
    }))
}

/// `GET /events` — authenticate via the fallback chain, then stream events.
///
/// Auth fallback order: (1) bearer header, (2) `sseToken` query parameter
/// (single-use, stripped from any log line before it reaches one), (3)
/// legacy `token` query parameter, gated behind `allow_legacy_sse_token_param`.
pub async fn stream_events(
    State(engine): State<Arc<EngineController>>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    Query(query): Query<SseTokenQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, EngineError> {
    let user_id = authenticate(&engine, bearer, &query)?;
    info!(user_id, "SSE stream opened");

    let mut rx = engine.events().subscribe();
    let status = engine.status_json();

    let event_stream = stream! {
        yield Ok(Event::default().data(status.to_string()));

        let mut keepalive = interval(Duration::from_secs(KEEPALIVE_SECS));
        keepalive.tick().await; // first tick fires immediately; skip it

        loop {
            tokio::select! {
                event = recv_resilient(&mut rx) => {
                    match event {
                        Some(e) => {
                            match serde_json::to_string(&e) {
                                Ok(json) => yield Ok(Event::default().data(json)),
                                Err(err) => warn!(error = %err, "failed to serialise engine event"),
                            }
                        }
                        None => break,
                    }
                }
                _ = keepalive.tick() => {
                    yield Ok(Event::default().comment("keepalive"));
                }
            }
        }
    };

    Ok(Sse::new(event_stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(KEEPALIVE_SECS))))
}

fn authenticate(
    engine: &EngineController,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    query: &SseTokenQuery,
) -> Result<String, EngineError> {
    if let Some(TypedHeader(auth)) = bearer {
        if let Some(user_id) = engine.authenticate_bearer(auth.token()) {
            return Ok(user_id);
        }
    }

    if let Some(token) = &query.sse_token {
        if let Some(user_id) = engine.sse_tokens().validate(token) {
            return Ok(user_id);
        }
    }

    if engine.config().allow_legacy_sse_token_param {
        if let Some(token) = &query.token {
            warn!("SSE authenticated via deprecated legacy token query parameter");
            if let Some(user_id) = engine.sse_tokens().validate(token) {
                return Ok(user_id);
            }
        }
    }

    Err(EngineError::Authentication(
        "no valid bearer, sseToken, or legacy token presented".to_string(),
    ))
}
