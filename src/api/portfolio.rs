// =============================================================================
// Portfolio read routes — mirrors of the exchange wallet, never authoritative
// =============================================================================

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::auth::AuthUser;
use crate::engine::EngineController;
use crate::error::EngineError;
use crate::persistence::portfolios::{PortfolioRecord, PortfolioRepository};
use crate::portfolio::{Position, SharedPortfolio};

/// Equivalent to `^[a-zA-Z0-9_-]{1,50}$`.
fn validate_agent_id(agent_id: &str) -> Result<(), EngineError> {
    let valid = !agent_id.is_empty()
        && agent_id.len() <= 50
        && agent_id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');

    if valid {
        Ok(())
    } else {
        Err(EngineError::Validation(format!(
            "agentId '{agent_id}' does not match ^[a-zA-Z0-9_-]{{1,50}}$"
        )))
    }
}

pub async fn summary(
    State(engine): State<Arc<EngineController>>,
    _auth: AuthUser,
) -> Json<SharedPortfolio> {
    Json(engine.get_status().shared_portfolio)
}

#[derive(Debug, Deserialize)]
pub struct CreatePortfolioRequest {
    pub agent_id: String,
}

pub async fn create(
    State(engine): State<Arc<EngineController>>,
    AuthUser(user_id): AuthUser,
    Json(req): Json<CreatePortfolioRequest>,
) -> Result<Json<PortfolioRecord>, EngineError> {
    validate_agent_id(&req.agent_id)?;

    let repo = PortfolioRepository::new(engine.db().clone());
    let record = PortfolioRecord {
        id: format!("{user_id}-{}", req.agent_id),
        user_id,
        agent_id: req.agent_id,
        current_balance: 0.0,
        total_trades: 0,
        win_rate: 0.0,
        updated_at: chrono::Utc::now(),
    };
    repo.upsert(&record).await?;
    Ok(Json(record))
}

pub async fn get_agent(
    State(engine): State<Arc<EngineController>>,
    AuthUser(user_id): AuthUser,
    Path(agent_id): Path<String>,
) -> Result<Json<PortfolioRecord>, EngineError> {
    validate_agent_id(&agent_id)?;

    let repo = PortfolioRepository::new(engine.db().clone());
    repo.find_by_user(&user_id, &agent_id)
        .await?
        .map(Json)
        .ok_or_else(|| EngineError::Validation(format!("no portfolio for agent '{agent_id}'")))
}

#[derive(Debug, Serialize)]
pub struct PositionsResponse {
    pub agent_id: String,
    pub positions: Vec<Position>,
}

pub async fn positions(
    State(engine): State<Arc<EngineController>>,
    _auth: AuthUser,
    Path(agent_id): Path<String>,
) -> Result<Json<PositionsResponse>, EngineError> {
    validate_agent_id(&agent_id)?;

    Ok(Json(PositionsResponse {
        agent_id,
        positions: engine.get_status().shared_portfolio.positions,
    }))
}
