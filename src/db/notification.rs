//! Per-user notifications.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::sqlite::SqlitePool;

use super::{from_secs, now_secs};

#[derive(Clone)]
pub struct NotificationStore {
    pool: SqlitePool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    #[serde(rename = "id")]
    pub uuid: String,
    pub title: String,
    pub message: String,
    pub kind: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct NotificationRow {
    uuid: String,
    title: String,
    message: String,
    kind: String,
    read: i64,
    created_at: i64,
}

impl From<NotificationRow> for Notification {
    fn from(row: NotificationRow) -> Self {
        Self {
            uuid: row.uuid,
            title: row.title,
            message: row.message,
            kind: row.kind,
            read: row.read != 0,
            created_at: from_secs(row.created_at),
        }
    }
}

impl NotificationStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a notification. Returns its UUID.
    pub async fn create(
        &self,
        user_id: i64,
        title: &str,
        message: &str,
        kind: &str,
    ) -> Result<String, sqlx::Error> {
        let uuid = uuid::Uuid::new_v4().to_string();
        sqlx::query(
            "INSERT INTO notifications (uuid, user_id, title, message, kind, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&uuid)
        .bind(user_id)
        .bind(title)
        .bind(message)
        .bind(kind)
        .bind(now_secs())
        .execute(&self.pool)
        .await?;
        Ok(uuid)
    }

    /// Newest first.
    pub async fn list_for_user(
        &self,
        user_id: i64,
        limit: i64,
    ) -> Result<Vec<Notification>, sqlx::Error> {
        let rows: Vec<NotificationRow> = sqlx::query_as(
            "SELECT uuid, title, message, kind, read, created_at FROM notifications
             WHERE user_id = ? ORDER BY created_at DESC, id DESC LIMIT ?",
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Notification::from).collect())
    }

    pub async fn unread_count(&self, user_id: i64) -> Result<i64, sqlx::Error> {
        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM notifications WHERE user_id = ? AND read = 0")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count.0)
    }

    /// Mark the given notifications (or all, when `uuids` is None) as read.
    /// Notifications belonging to other users are never touched.
    pub async fn mark_read(
        &self,
        user_id: i64,
        uuids: Option<&[String]>,
    ) -> Result<u64, sqlx::Error> {
        let Some(uuids) = uuids else {
            let result =
                sqlx::query("UPDATE notifications SET read = 1 WHERE user_id = ? AND read = 0")
                    .bind(user_id)
                    .execute(&self.pool)
                    .await?;
            return Ok(result.rows_affected());
        };

        let mut tx = self.pool.begin().await?;
        let mut updated = 0;
        for uuid in uuids {
            let result = sqlx::query(
                "UPDATE notifications SET read = 1 WHERE user_id = ? AND uuid = ? AND read = 0",
            )
            .bind(user_id)
            .bind(uuid)
            .execute(&mut *tx)
            .await?;
            updated += result.rows_affected();
        }
        tx.commit().await?;
        Ok(updated)
    }
}
