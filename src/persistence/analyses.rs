// =============================================================================
// Analysis audit record repository
// =============================================================================
//
// Read-only from the HTTP surface; exists purely so every AnalysisResult
// produced by a cycle has a durable audit trail, per the persisted-state
// enumeration naming this table explicitly.

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::analysts::AnalysisResult;

pub struct AnalysisRepository {
    pool: SqlitePool,
}

impl AnalysisRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, cycle_number: u64, stage: &str, result: &AnalysisResult) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO analyses
                (id, cycle_number, stage, analyst_id, recommendation, confidence, thesis, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(cycle_number as i64)
        .bind(stage)
        .bind(&result.analyst_id)
        .bind(serde_json::to_string(&result.recommendation)?)
        .bind(result.confidence)
        .bind(&result.thesis)
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .context("failed to insert analysis record")?;
        Ok(())
    }
}
