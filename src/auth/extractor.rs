// =============================================================================
// AuthUser — Axum extractor validating a JWT bearer token
// =============================================================================

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum_extra::headers::authorization::Bearer;
use axum_extra::headers::Authorization;
use axum_extra::TypedHeader;
use tracing::warn;

use crate::engine::EngineController;

/// The authenticated caller's user id, extracted from a validated JWT.
pub struct AuthUser(pub String);

#[axum::async_trait]
impl FromRequestParts<Arc<EngineController>> for AuthUser {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<EngineController>,
    ) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| {
                    (StatusCode::UNAUTHORIZED, "missing or malformed Authorization header")
                        .into_response()
                })?;

        match state.jwt().verify_access_token(bearer.token()) {
            Ok(claims) => Ok(AuthUser(claims.sub)),
            Err(e) => {
                warn!(error = %e, "JWT verification failed");
                Err((StatusCode::UNAUTHORIZED, "invalid or expired token").into_response())
            }
        }
    }
}
