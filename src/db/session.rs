//! SQLite-backed refresh session tracking.
//!
//! Only the refresh token's `jti` is stored. Access tokens are stateless and
//! short-lived (15 minutes).

use async_trait::async_trait;
use sqlx::sqlite::SqlitePool;

use super::now_secs;
use crate::session::{SessionStore, StoreError};

#[derive(Clone)]
pub struct SqliteSessionStore {
    pool: SqlitePool,
}

impl SqliteSessionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn current(&self, subject: &str) -> Result<Option<String>, StoreError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT jti FROM sessions WHERE user_uuid = ? AND expires_at >= ?")
                .bind(subject)
                .bind(now_secs())
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|r| r.0))
    }

    async fn set(&self, subject: &str, jti: &str, expires_at: u64) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO sessions (user_uuid, jti, expires_at, updated_at) VALUES (?, ?, ?, ?)
             ON CONFLICT(user_uuid) DO UPDATE SET
                jti = excluded.jti,
                expires_at = excluded.expires_at,
                updated_at = excluded.updated_at",
        )
        .bind(subject)
        .bind(jti)
        .bind(expires_at as i64)
        .bind(now_secs())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn rotate(
        &self,
        subject: &str,
        expected: &str,
        next: &str,
        expires_at: u64,
    ) -> Result<bool, StoreError> {
        // A single conditional UPDATE is atomic, so of two concurrent
        // exchanges of the same token only one can match `expected`.
        let result = sqlx::query(
            "UPDATE sessions SET jti = ?, expires_at = ?, updated_at = ?
             WHERE user_uuid = ? AND jti = ?",
        )
        .bind(next)
        .bind(expires_at as i64)
        .bind(now_secs())
        .bind(subject)
        .bind(expected)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn invalidate(&self, subject: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM sessions WHERE user_uuid = ?")
            .bind(subject)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn purge_expired(&self) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at < ?")
            .bind(now_secs())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
