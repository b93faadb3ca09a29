// =============================================================================
// Persistence Layer — SQLite-backed repositories
// =============================================================================
//
// Grounded on Zuytan-rustrade's `SqliteStrategyRepository` pattern: one
// struct per table wrapping a shared `SqlitePool`, `sqlx::query` with
// `.bind(...)` chains, `anyhow::Context` on fallible calls.
// =============================================================================

pub mod analyses;
pub mod portfolios;
pub mod trades;
pub mod users;

use anyhow::{Context, Result};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tracing::info;

/// Open (creating if necessary) the SQLite database at `path` and run the
/// schema migration. Mirrors the teacher's preference for an explicit
/// `CREATE TABLE IF NOT EXISTS` migration run at startup over a separate
/// migration tool.
pub async fn connect(path: &str) -> Result<SqlitePool> {
    let url = format!("sqlite://{path}?mode=rwc");
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&url)
        .await
        .with_context(|| format!("failed to open sqlite database at {path}"))?;

    migrate(&pool).await?;
    info!(path, "persistence layer connected");
    Ok(pool)
}

async fn migrate(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .context("failed to create users table")?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS refresh_tokens (
            token TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            expires_at TEXT NOT NULL,
            revoked INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await
    .context("failed to create refresh_tokens table")?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS portfolios (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            agent_id TEXT NOT NULL DEFAULT 'collaborative',
            current_balance REAL NOT NULL DEFAULT 0,
            total_trades INTEGER NOT NULL DEFAULT 0,
            win_rate REAL NOT NULL DEFAULT 0,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .context("failed to create portfolios table")?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS trades (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            portfolio_id TEXT NOT NULL,
            symbol TEXT NOT NULL,
            side TEXT NOT NULL,
            order_type TEXT NOT NULL DEFAULT 'MARKET',
            size REAL NOT NULL,
            price REAL NOT NULL,
            status TEXT NOT NULL DEFAULT 'FILLED',
            reason TEXT,
            confidence REAL,
            client_order_id TEXT NOT NULL,
            exchange_order_id TEXT,
            executed_at TEXT NOT NULL,
            realized_pnl REAL
        )
        "#,
    )
    .execute(pool)
    .await
    .context("failed to create trades table")?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS ai_logs (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            order_id TEXT,
            stage TEXT NOT NULL,
            model TEXT NOT NULL,
            input TEXT NOT NULL,
            output TEXT NOT NULL,
            explanation TEXT,
            timestamp TEXT NOT NULL,
            uploaded_to_exchange INTEGER NOT NULL DEFAULT 0,
            exchange_log_id TEXT
        )
        "#,
    )
    .execute(pool)
    .await
    .context("failed to create ai_logs table")?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS analyses (
            id TEXT PRIMARY KEY,
            cycle_number INTEGER NOT NULL,
            stage TEXT NOT NULL,
            analyst_id TEXT NOT NULL,
            recommendation TEXT NOT NULL,
            confidence REAL NOT NULL,
            thesis TEXT NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .context("failed to create analyses table")?;

    Ok(())
}
