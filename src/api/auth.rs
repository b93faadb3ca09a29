// =============================================================================
// Auth routes — register / login / refresh / me
// =============================================================================

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::{hash_password, new_refresh_token, verify_password, AuthUser, UserRecord};
use crate::engine::EngineController;
use crate::error::EngineError;
use crate::persistence::users::UserRepository;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: String,
    pub email: String,
}

impl From<&UserRecord> for UserResponse {
    fn from(u: &UserRecord) -> Self {
        Self {
            id: u.id.clone(),
            email: u.email.clone(),
        }
    }
}

pub async fn register(
    State(engine): State<Arc<EngineController>>,
    Json(req): Json<RegisterRequest>,
) -> Result<Json<UserResponse>, EngineError> {
    if req.email.is_empty() || !req.email.contains('@') {
        return Err(EngineError::Validation("email must be non-empty and contain '@'".to_string()));
    }
    if req.password.len() < 8 {
        return Err(EngineError::Validation("password must be at least 8 characters".to_string()));
    }

    let repo = UserRepository::new(engine.db().clone());
    if repo.find_by_email(&req.email).await?.is_some() {
        return Err(EngineError::Validation("email already registered".to_string()));
    }

    let user = UserRecord {
        id: Uuid::new_v4().to_string(),
        email: req.email,
        password_hash: hash_password(&req.password).map_err(EngineError::TransientExchange)?,
        created_at: chrono::Utc::now(),
    };
    repo.create(&user).await?;

    Ok(Json(UserResponse::from(&user)))
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub user: UserResponse,
}

pub async fn login(
    State(engine): State<Arc<EngineController>>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<TokenResponse>, EngineError> {
    let repo = UserRepository::new(engine.db().clone());
    let user = repo
        .find_by_email(&req.email)
        .await?
        .ok_or_else(|| EngineError::Authentication("invalid email or password".to_string()))?;

    if !verify_password(&req.password, &user.password_hash) {
        return Err(EngineError::Authentication("invalid email or password".to_string()));
    }

    let access_token = engine
        .jwt()
        .issue_access_token(&user.id)
        .map_err(EngineError::TransientExchange)?;
    let refresh = new_refresh_token(&user.id);
    repo.store_refresh_token(&refresh).await?;

    Ok(Json(TokenResponse {
        access_token,
        refresh_token: refresh.token,
        user: UserResponse::from(&user),
    }))
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

pub async fn refresh(
    State(engine): State<Arc<EngineController>>,
    Json(req): Json<RefreshRequest>,
) -> Result<Json<TokenResponse>, EngineError> {
    let repo = UserRepository::new(engine.db().clone());
    let record = repo
        .consume_refresh_token(&req.refresh_token)
        .await?
        .ok_or_else(|| EngineError::Authentication("refresh token invalid or expired".to_string()))?;

    let user = repo
        .find_by_id(&record.user_id)
        .await?
        .ok_or_else(|| EngineError::Authentication("user no longer exists".to_string()))?;

    let access_token = engine
        .jwt()
        .issue_access_token(&user.id)
        .map_err(EngineError::TransientExchange)?;
    let new_refresh = new_refresh_token(&user.id);
    repo.store_refresh_token(&new_refresh).await?;

    Ok(Json(TokenResponse {
        access_token,
        refresh_token: new_refresh.token,
        user: UserResponse::from(&user),
    }))
}

pub async fn me(
    State(engine): State<Arc<EngineController>>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<UserResponse>, EngineError> {
    let repo = UserRepository::new(engine.db().clone());
    let user = repo
        .find_by_id(&user_id)
        .await?
        .ok_or_else(|| EngineError::Authentication("user no longer exists".to_string()))?;
    Ok(Json(UserResponse::from(&user)))
}
