//! Doctor profiles, one per DOCTOR account.

use serde::Serialize;
use sqlx::sqlite::SqlitePool;

#[derive(Clone)]
pub struct DoctorStore {
    pool: SqlitePool,
}

/// Public listing entry. Exposes the doctor's user UUID, never the row ID.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct DoctorSummary {
    #[serde(rename = "id")]
    pub uuid: String,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub specialization: String,
    pub bio: Option<String>,
    pub available: bool,
}

#[derive(Debug, Clone)]
pub struct DoctorProfile {
    pub user_id: i64,
    pub specialization: String,
    pub bio: Option<String>,
    pub available: bool,
}

#[derive(sqlx::FromRow)]
struct DoctorProfileRow {
    user_id: i64,
    specialization: String,
    bio: Option<String>,
    available: i64,
}

impl From<DoctorProfileRow> for DoctorProfile {
    fn from(row: DoctorProfileRow) -> Self {
        Self {
            user_id: row.user_id,
            specialization: row.specialization,
            bio: row.bio,
            available: row.available != 0,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DoctorUpdate {
    pub specialization: Option<String>,
    pub bio: Option<String>,
    pub available: Option<bool>,
}

impl DoctorUpdate {
    pub fn is_empty(&self) -> bool {
        self.specialization.is_none() && self.bio.is_none() && self.available.is_none()
    }
}

impl DoctorStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// List doctors ordered by name, optionally filtered by availability.
    pub async fn list(
        &self,
        available: Option<bool>,
        limit: i64,
    ) -> Result<Vec<DoctorSummary>, sqlx::Error> {
        sqlx::query_as(
            "SELECT u.uuid, u.name, u.email, u.phone, d.specialization, d.bio, d.available
             FROM doctors d JOIN users u ON u.id = d.user_id
             WHERE u.role = 'DOCTOR' AND (? IS NULL OR d.available = ?)
             ORDER BY u.name
             LIMIT ?",
        )
        .bind(available)
        .bind(available)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn get_by_user_id(&self, user_id: i64) -> Result<Option<DoctorProfile>, sqlx::Error> {
        let row: Option<DoctorProfileRow> = sqlx::query_as(
            "SELECT user_id, specialization, bio, available FROM doctors WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(DoctorProfile::from))
    }

    /// Apply a partial update, creating the profile row if it is missing.
    pub async fn upsert(&self, user_id: i64, update: &DoctorUpdate) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO doctors (user_id, specialization, bio, available)
             VALUES (?, COALESCE(?, 'General Practice'), ?, COALESCE(?, 1))
             ON CONFLICT(user_id) DO UPDATE SET
                specialization = COALESCE(?, specialization),
                bio = COALESCE(?, bio),
                available = COALESCE(?, available)",
        )
        .bind(user_id)
        .bind(update.specialization.as_deref())
        .bind(update.bio.as_deref())
        .bind(update.available)
        .bind(update.specialization.as_deref())
        .bind(update.bio.as_deref())
        .bind(update.available)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
