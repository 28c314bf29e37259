use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqlitePool;

use super::now_secs;

#[derive(Clone)]
pub struct UserStore {
    pool: SqlitePool,
}

/// Account role. `Guest` is never stored; it marks unauthenticated callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Patient,
    Doctor,
    Admin,
    Guest,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Patient => "PATIENT",
            Role::Doctor => "DOCTOR",
            Role::Admin => "ADMIN",
            Role::Guest => "GUEST",
        }
    }

    /// Parse a role name, case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "PATIENT" => Some(Role::Patient),
            "DOCTOR" => Some(Role::Doctor),
            "ADMIN" => Some(Role::Admin),
            "GUEST" => Some(Role::Guest),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub uuid: String,
    pub email: String,
    pub password_hash: String,
    pub name: String,
    pub phone: Option<String>,
    pub role: Role,
    pub date_of_birth: Option<String>,
    pub address: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    uuid: String,
    email: String,
    password_hash: String,
    name: String,
    phone: Option<String>,
    role: String,
    date_of_birth: Option<String>,
    address: Option<String>,
    created_at: i64,
    updated_at: i64,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            uuid: row.uuid,
            email: row.email,
            password_hash: row.password_hash,
            name: row.name,
            phone: row.phone,
            // Unknown stored roles get the least privileged real role.
            role: Role::parse(&row.role).unwrap_or(Role::Patient),
            date_of_birth: row.date_of_birth,
            address: row.address,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Fields for a new account.
#[derive(Debug, Clone)]
pub struct NewUser<'a> {
    pub uuid: &'a str,
    pub email: &'a str,
    pub password_hash: &'a str,
    pub name: &'a str,
    pub phone: Option<&'a str>,
    pub role: Role,
}

/// Partial profile update. `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub date_of_birth: Option<String>,
    pub address: Option<String>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.phone.is_none()
            && self.date_of_birth.is_none()
            && self.address.is_none()
    }
}

const USER_COLUMNS: &str = "id, uuid, email, password_hash, name, phone, role, date_of_birth, address, created_at, updated_at";

impl UserStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create an account. Doctors also get a default doctor profile in the
    /// same transaction. Returns the user ID.
    pub async fn create(&self, user: &NewUser<'_>) -> Result<i64, sqlx::Error> {
        let now = now_secs();
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "INSERT INTO users (uuid, email, password_hash, name, phone, role, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(user.uuid)
        .bind(user.email)
        .bind(user.password_hash)
        .bind(user.name)
        .bind(user.phone)
        .bind(user.role.as_str())
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        let id = result.last_insert_rowid();

        if user.role == Role::Doctor {
            sqlx::query("INSERT INTO doctors (user_id) VALUES (?)")
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(id)
    }

    /// Get a user by email (case-insensitive).
    pub async fn get_by_email(&self, email: &str) -> Result<Option<User>, sqlx::Error> {
        let row: Option<UserRow> =
            sqlx::query_as(&format!("SELECT {} FROM users WHERE email = ?", USER_COLUMNS))
                .bind(email)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(User::from))
    }

    /// Get a user by ID.
    pub async fn get_by_id(&self, id: i64) -> Result<Option<User>, sqlx::Error> {
        let row: Option<UserRow> =
            sqlx::query_as(&format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(User::from))
    }

    /// Get a user by UUID.
    pub async fn get_by_uuid(&self, uuid: &str) -> Result<Option<User>, sqlx::Error> {
        let row: Option<UserRow> =
            sqlx::query_as(&format!("SELECT {} FROM users WHERE uuid = ?", USER_COLUMNS))
                .bind(uuid)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(User::from))
    }

    /// Check whether an email is already registered.
    pub async fn email_exists(&self, email: &str) -> Result<bool, sqlx::Error> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users WHERE email = ?")
            .bind(email)
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0 > 0)
    }

    /// Apply a partial profile update.
    pub async fn update_profile(&self, id: i64, update: &ProfileUpdate) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE users SET
                name = COALESCE(?, name),
                phone = COALESCE(?, phone),
                date_of_birth = COALESCE(?, date_of_birth),
                address = COALESCE(?, address),
                updated_at = ?
             WHERE id = ?",
        )
        .bind(update.name.as_deref())
        .bind(update.phone.as_deref())
        .bind(update.date_of_birth.as_deref())
        .bind(update.address.as_deref())
        .bind(now_secs())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Set the role for a user.
    pub async fn set_role(&self, id: i64, role: Role) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE users SET role = ?, updated_at = ? WHERE id = ?")
            .bind(role.as_str())
            .bind(now_secs())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete a user by ID.
    pub async fn delete(&self, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

/// Whether a sqlx error is a UNIQUE constraint violation.
pub(crate) fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}
