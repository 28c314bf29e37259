mod appointment;
mod chat;
mod doctor;
mod health_metric;
mod notification;
mod session;
mod user;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

pub use appointment::{Appointment, AppointmentStatus, AppointmentStore, DueReminder};
pub use chat::{ChatMessage, ChatSender, ChatStore};
pub use doctor::{DoctorProfile, DoctorStore, DoctorSummary, DoctorUpdate};
pub use health_metric::{HealthMetric, HealthMetricStore, MetricKind};
pub use notification::{Notification, NotificationStore};
pub use session::SqliteSessionStore;
pub use user::{NewUser, ProfileUpdate, Role, User, UserStore};
pub(crate) use user::is_unique_violation;

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open or create a database at the given path.
    /// Use ":memory:" for an in-memory database.
    pub async fn open(path: &str) -> Result<Self, sqlx::Error> {
        let (url, max_connections) = if path == ":memory:" {
            // Shared-cache memory databases fail concurrent writers with
            // SQLITE_LOCKED instead of waiting, so serialize on one connection.
            ("sqlite::memory:".to_string(), 1)
        } else {
            (format!("sqlite:{}?mode=rwc", path), 5)
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(&url)
            .await?;

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Get the current schema version.
    async fn get_version(&self) -> Result<i32, sqlx::Error> {
        let result: Option<(i32,)> = sqlx::query_as("SELECT version FROM schema_version LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;
        Ok(result.map(|r| r.0).unwrap_or(0))
    }

    /// Set the schema version within a transaction.
    async fn set_version(
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        version: i32,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM schema_version")
            .execute(&mut **tx)
            .await?;
        sqlx::query("INSERT INTO schema_version (version) VALUES (?)")
            .bind(version)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    /// Run database migrations.
    async fn migrate(&self) -> Result<(), sqlx::Error> {
        sqlx::query("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)")
            .execute(&self.pool)
            .await?;

        let version = self.get_version().await?;

        if version < 1 {
            self.migrate_v1().await?;
        }

        if version < 2 {
            self.migrate_v2().await?;
        }

        Ok(())
    }

    /// Execute a list of queries in a transaction, then set the version.
    async fn run_migration(
        &self,
        version: i32,
        queries: &[&'static str],
    ) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        for query in queries {
            sqlx::query(*query).execute(&mut *tx).await?;
        }
        Self::set_version(&mut tx, version).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn migrate_v1(&self) -> Result<(), sqlx::Error> {
        self.run_migration(
            1,
            &[
                // All timestamps are Unix seconds.
                "CREATE TABLE users (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    uuid TEXT UNIQUE NOT NULL,
                    email TEXT UNIQUE NOT NULL COLLATE NOCASE,
                    password_hash TEXT NOT NULL,
                    name TEXT NOT NULL,
                    phone TEXT,
                    role TEXT NOT NULL DEFAULT 'PATIENT',
                    date_of_birth TEXT,
                    address TEXT,
                    created_at INTEGER NOT NULL,
                    updated_at INTEGER NOT NULL
                )",
                "CREATE INDEX idx_users_uuid ON users(uuid)",
                "CREATE INDEX idx_users_role ON users(role)",
                "CREATE TABLE doctors (
                    user_id INTEGER PRIMARY KEY REFERENCES users(id) ON DELETE CASCADE,
                    specialization TEXT NOT NULL DEFAULT 'General Practice',
                    bio TEXT,
                    available INTEGER NOT NULL DEFAULT 1
                )",
                "CREATE INDEX idx_doctors_available ON doctors(available)",
                // One row per subject: the currently valid refresh token id.
                "CREATE TABLE sessions (
                    user_uuid TEXT PRIMARY KEY,
                    jti TEXT NOT NULL,
                    expires_at INTEGER NOT NULL,
                    updated_at INTEGER NOT NULL
                )",
                "CREATE INDEX idx_sessions_expires_at ON sessions(expires_at)",
                "CREATE TABLE notifications (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    uuid TEXT UNIQUE NOT NULL,
                    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    title TEXT NOT NULL,
                    message TEXT NOT NULL,
                    kind TEXT NOT NULL DEFAULT 'general',
                    read INTEGER NOT NULL DEFAULT 0,
                    created_at INTEGER NOT NULL
                )",
                "CREATE INDEX idx_notifications_user_id ON notifications(user_id, created_at)",
                "CREATE TABLE appointments (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    uuid TEXT UNIQUE NOT NULL,
                    patient_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    doctor_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    scheduled_at INTEGER NOT NULL,
                    reason TEXT,
                    status TEXT NOT NULL DEFAULT 'SCHEDULED',
                    reminded INTEGER NOT NULL DEFAULT 0,
                    created_at INTEGER NOT NULL,
                    updated_at INTEGER NOT NULL
                )",
                "CREATE INDEX idx_appointments_patient ON appointments(patient_id, scheduled_at)",
                "CREATE INDEX idx_appointments_doctor ON appointments(doctor_id, scheduled_at)",
                "CREATE INDEX idx_appointments_status ON appointments(status, scheduled_at)",
            ],
        )
        .await
    }

    async fn migrate_v2(&self) -> Result<(), sqlx::Error> {
        self.run_migration(
            2,
            &[
                "CREATE TABLE health_metrics (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    uuid TEXT UNIQUE NOT NULL,
                    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    kind TEXT NOT NULL,
                    value REAL NOT NULL,
                    unit TEXT,
                    recorded_at INTEGER NOT NULL
                )",
                "CREATE INDEX idx_health_metrics_user ON health_metrics(user_id, kind, recorded_at)",
                // Anonymous chats have no user.
                "CREATE TABLE chat_messages (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    session_id TEXT NOT NULL,
                    user_id INTEGER REFERENCES users(id) ON DELETE SET NULL,
                    sender TEXT NOT NULL,
                    content TEXT NOT NULL,
                    created_at INTEGER NOT NULL
                )",
                "CREATE INDEX idx_chat_messages_session ON chat_messages(session_id, id)",
            ],
        )
        .await
    }

    /// Get the user store.
    pub fn users(&self) -> UserStore {
        UserStore::new(self.pool.clone())
    }

    /// Get the doctor profile store.
    pub fn doctors(&self) -> DoctorStore {
        DoctorStore::new(self.pool.clone())
    }

    /// Get the refresh-session store.
    pub fn sessions(&self) -> SqliteSessionStore {
        SqliteSessionStore::new(self.pool.clone())
    }

    /// Get the notification store.
    pub fn notifications(&self) -> NotificationStore {
        NotificationStore::new(self.pool.clone())
    }

    /// Get the appointment store.
    pub fn appointments(&self) -> AppointmentStore {
        AppointmentStore::new(self.pool.clone())
    }

    /// Get the health metric store.
    pub fn health_metrics(&self) -> HealthMetricStore {
        HealthMetricStore::new(self.pool.clone())
    }

    /// Get the chat transcript store.
    pub fn chat(&self) -> ChatStore {
        ChatStore::new(self.pool.clone())
    }

    /// Get the underlying connection pool (for tests that need raw SQL access).
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Current time as Unix seconds.
pub(crate) fn now_secs() -> i64 {
    Utc::now().timestamp()
}

/// Convert stored Unix seconds back to a UTC datetime.
pub(crate) fn from_secs(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let db = Database::open(":memory:").await.unwrap();
        db.migrate().await.unwrap();
        assert_eq!(db.get_version().await.unwrap(), 2);
    }

    #[test]
    fn test_from_secs() {
        assert_eq!(from_secs(1705321845).to_rfc3339(), "2024-01-15T12:30:45+00:00");
        assert_eq!(from_secs(0).timestamp(), 0);
    }
}
