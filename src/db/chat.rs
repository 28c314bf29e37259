//! Chat transcripts, grouped by client-visible session id.

use sqlx::sqlite::SqlitePool;

use super::now_secs;

#[derive(Clone)]
pub struct ChatStore {
    pool: SqlitePool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatSender {
    User,
    Bot,
}

impl ChatSender {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatSender::User => "user",
            ChatSender::Bot => "bot",
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ChatMessage {
    pub session_id: String,
    pub user_id: Option<i64>,
    pub sender: String,
    pub content: String,
    pub created_at: i64,
}

impl ChatStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// The user a chat session is bound to, if the session exists.
    /// `Some(None)` is an existing anonymous session.
    pub async fn session_owner(&self, session_id: &str) -> Result<Option<Option<i64>>, sqlx::Error> {
        let row: Option<(Option<i64>,)> = sqlx::query_as(
            "SELECT user_id FROM chat_messages WHERE session_id = ? ORDER BY id LIMIT 1",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| r.0))
    }

    /// Store one question and its answer atomically.
    pub async fn append_exchange(
        &self,
        session_id: &str,
        user_id: Option<i64>,
        question: &str,
        answer: &str,
    ) -> Result<(), sqlx::Error> {
        let now = now_secs();
        let mut tx = self.pool.begin().await?;
        for (sender, content) in [(ChatSender::User, question), (ChatSender::Bot, answer)] {
            sqlx::query(
                "INSERT INTO chat_messages (session_id, user_id, sender, content, created_at)
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(session_id)
            .bind(user_id)
            .bind(sender.as_str())
            .bind(content)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Messages of a session in the order they were written.
    pub async fn history(&self, session_id: &str) -> Result<Vec<ChatMessage>, sqlx::Error> {
        sqlx::query_as(
            "SELECT session_id, user_id, sender, content, created_at
             FROM chat_messages WHERE session_id = ? ORDER BY id",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
    }
}
