// =============================================================================
// Trade + AI-log repositories
// =============================================================================

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct TradeRecord {
    pub id: String,
    pub user_id: String,
    pub portfolio_id: String,
    pub symbol: String,
    pub side: String,
    pub size: f64,
    pub price: f64,
    pub reason: String,
    pub confidence: f64,
    pub client_order_id: String,
    pub exchange_order_id: Option<String>,
    pub executed_at: chrono::DateTime<chrono::Utc>,
    pub realized_pnl: Option<f64>,
}

pub struct TradeRepository {
    pool: SqlitePool,
}

impl TradeRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Best-effort insert — callers must log and continue on `Err`, never
    /// revert an already-submitted exchange order.
    pub async fn insert(&self, record: &TradeRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO trades
                (id, user_id, portfolio_id, symbol, side, size, price, reason,
                 confidence, client_order_id, exchange_order_id, executed_at, realized_pnl)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.id)
        .bind(&record.user_id)
        .bind(&record.portfolio_id)
        .bind(&record.symbol)
        .bind(&record.side)
        .bind(record.size)
        .bind(record.price)
        .bind(&record.reason)
        .bind(record.confidence)
        .bind(&record.client_order_id)
        .bind(&record.exchange_order_id)
        .bind(record.executed_at.to_rfc3339())
        .bind(record.realized_pnl)
        .execute(&self.pool)
        .await
        .context("failed to insert trade record")?;
        Ok(())
    }

    /// Sum of `realized_pnl` over the trailing `hours` window, used to
    /// compute weekly drawdown over a rolling 7x24h period rather than a
    /// calendar week.
    pub async fn realized_pnl_since(&self, since: chrono::DateTime<chrono::Utc>) -> Result<f64> {
        let row: (Option<f64>,) = sqlx::query_as(
            "SELECT SUM(realized_pnl) FROM trades WHERE executed_at >= ? AND realized_pnl IS NOT NULL",
        )
        .bind(since.to_rfc3339())
        .fetch_one(&self.pool)
        .await
        .context("failed to sum realized pnl")?;
        Ok(row.0.unwrap_or(0.0))
    }
}

#[derive(Debug, Clone)]
pub struct AiLogEntry {
    pub id: String,
    pub user_id: String,
    pub order_id: Option<String>,
    pub stage: String,
    pub model: String,
    pub input: String,
    pub output: String,
    pub explanation: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub uploaded_to_exchange: bool,
    pub exchange_log_id: Option<String>,
}

impl AiLogEntry {
    pub fn new(user_id: &str, stage: &str, model: &str, input: &str, output: &str, explanation: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            order_id: None,
            stage: stage.to_string(),
            model: model.to_string(),
            input: input.to_string(),
            output: output.to_string(),
            explanation: explanation.to_string(),
            timestamp: chrono::Utc::now(),
            uploaded_to_exchange: false,
            exchange_log_id: None,
        }
    }
}

pub struct AiLogRepository {
    pool: SqlitePool,
}

impl AiLogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, entry: &AiLogEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO ai_logs
                (id, user_id, order_id, stage, model, input, output, explanation,
                 timestamp, uploaded_to_exchange, exchange_log_id)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.user_id)
        .bind(&entry.order_id)
        .bind(&entry.stage)
        .bind(&entry.model)
        .bind(&entry.input)
        .bind(&entry.output)
        .bind(&entry.explanation)
        .bind(entry.timestamp.to_rfc3339())
        .bind(entry.uploaded_to_exchange)
        .bind(&entry.exchange_log_id)
        .execute(&self.pool)
        .await
        .context("failed to insert AI log entry")?;
        Ok(())
    }
}
