// =============================================================================
// Users + refresh token repository
// =============================================================================

use anyhow::{Context, Result};
use sqlx::{Row, SqlitePool};

use crate::auth::{RefreshTokenRecord, UserRecord};

pub struct UserRepository {
    pool: SqlitePool,
}

impl UserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, user: &UserRecord) -> Result<()> {
        sqlx::query("INSERT INTO users (id, email, password_hash, created_at) VALUES (?, ?, ?, ?)")
            .bind(&user.id)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(user.created_at.to_rfc3339())
            .execute(&self.pool)
            .await
            .context("failed to insert user")?;
        Ok(())
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>> {
        let row = sqlx::query("SELECT * FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .context("failed to query user by email")?;

        row.map(Self::row_to_user).transpose()
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<UserRecord>> {
        let row = sqlx::query("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("failed to query user by id")?;

        row.map(Self::row_to_user).transpose()
    }

    fn row_to_user(row: sqlx::sqlite::SqliteRow) -> Result<UserRecord> {
        Ok(UserRecord {
            id: row.try_get("id")?,
            email: row.try_get("email")?,
            password_hash: row.try_get("password_hash")?,
            created_at: chrono::DateTime::parse_from_rfc3339(row.try_get::<String, _>("created_at")?.as_str())
                .context("malformed created_at timestamp")?
                .with_timezone(&chrono::Utc),
        })
    }

    pub async fn store_refresh_token(&self, record: &RefreshTokenRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO refresh_tokens (token, user_id, expires_at, revoked) VALUES (?, ?, ?, ?)",
        )
        .bind(&record.token)
        .bind(&record.user_id)
        .bind(record.expires_at.to_rfc3339())
        .bind(record.revoked)
        .execute(&self.pool)
        .await
        .context("failed to insert refresh token")?;
        Ok(())
    }

    /// Consume (revoke) a refresh token and return it if it was valid and
    /// unrevoked. Rotation is the caller's responsibility — this only marks
    /// the presented token revoked.
    pub async fn consume_refresh_token(&self, token: &str) -> Result<Option<RefreshTokenRecord>> {
        let row = sqlx::query("SELECT * FROM refresh_tokens WHERE token = ? AND revoked = 0")
            .bind(token)
            .fetch_optional(&self.pool)
            .await
            .context("failed to query refresh token")?;

        let Some(row) = row else { return Ok(None) };

        let record = RefreshTokenRecord {
            token: row.try_get("token")?,
            user_id: row.try_get("user_id")?,
            expires_at: chrono::DateTime::parse_from_rfc3339(row.try_get::<String, _>("expires_at")?.as_str())
                .context("malformed expires_at timestamp")?
                .with_timezone(&chrono::Utc),
            revoked: row.try_get("revoked")?,
        };

        sqlx::query("UPDATE refresh_tokens SET revoked = 1 WHERE token = ?")
            .bind(token)
            .execute(&self.pool)
            .await
            .context("failed to revoke refresh token")?;

        if record.expires_at < chrono::Utc::now() {
            return Ok(None);
        }

        Ok(Some(record))
    }
}
