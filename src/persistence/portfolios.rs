// =============================================================================
// Portfolio row repository — a mirror of the exchange wallet, never authoritative
// =============================================================================

use anyhow::{Context, Result};
use sqlx::{Row, SqlitePool};

#[derive(Debug, Clone)]
pub struct PortfolioRecord {
    pub id: String,
    pub user_id: String,
    pub agent_id: String,
    pub current_balance: f64,
    pub total_trades: u64,
    pub win_rate: f64,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

pub struct PortfolioRepository {
    pool: SqlitePool,
}

impl PortfolioRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn upsert(&self, record: &PortfolioRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO portfolios (id, user_id, agent_id, current_balance, total_trades, win_rate, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                current_balance = excluded.current_balance,
                total_trades = excluded.total_trades,
                win_rate = excluded.win_rate,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&record.id)
        .bind(&record.user_id)
        .bind(&record.agent_id)
        .bind(record.current_balance)
        .bind(record.total_trades as i64)
        .bind(record.win_rate)
        .bind(record.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .context("failed to upsert portfolio")?;
        Ok(())
    }

    pub async fn find_by_user(&self, user_id: &str, agent_id: &str) -> Result<Option<PortfolioRecord>> {
        let row = sqlx::query("SELECT * FROM portfolios WHERE user_id = ? AND agent_id = ?")
            .bind(user_id)
            .bind(agent_id)
            .fetch_optional(&self.pool)
            .await
            .context("failed to query portfolio")?;

        let Some(row) = row else { return Ok(None) };

        Ok(Some(PortfolioRecord {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            agent_id: row.try_get("agent_id")?,
            current_balance: row.try_get("current_balance")?,
            total_trades: row.try_get::<i64, _>("total_trades")? as u64,
            win_rate: row.try_get("win_rate")?,
            updated_at: chrono::DateTime::parse_from_rfc3339(row.try_get::<String, _>("updated_at")?.as_str())
                .context("malformed updated_at timestamp")?
                .with_timezone(&chrono::Utc),
        }))
    }
}
