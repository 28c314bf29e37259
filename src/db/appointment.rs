//! Appointment storage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqlitePool;

use super::{from_secs, now_secs};

#[derive(Clone)]
pub struct AppointmentStore {
    pool: SqlitePool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppointmentStatus {
    Scheduled,
    Confirmed,
    Completed,
    Cancelled,
}

impl AppointmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Scheduled => "SCHEDULED",
            AppointmentStatus::Confirmed => "CONFIRMED",
            AppointmentStatus::Completed => "COMPLETED",
            AppointmentStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "SCHEDULED" => Some(AppointmentStatus::Scheduled),
            "CONFIRMED" => Some(AppointmentStatus::Confirmed),
            "COMPLETED" => Some(AppointmentStatus::Completed),
            "CANCELLED" | "CANCELED" => Some(AppointmentStatus::Cancelled),
            _ => None,
        }
    }

    /// Completed and cancelled appointments never change again.
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            AppointmentStatus::Completed | AppointmentStatus::Cancelled
        )
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Party {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    #[serde(skip)]
    pub id: i64,
    #[serde(skip)]
    pub patient_id: i64,
    #[serde(skip)]
    pub doctor_id: i64,
    #[serde(rename = "id")]
    pub uuid: String,
    pub patient: Party,
    pub doctor: Party,
    pub scheduled_at: DateTime<Utc>,
    pub reason: Option<String>,
    pub status: AppointmentStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct AppointmentRow {
    id: i64,
    uuid: String,
    patient_id: i64,
    patient_uuid: String,
    patient_name: String,
    doctor_id: i64,
    doctor_uuid: String,
    doctor_name: String,
    scheduled_at: i64,
    reason: Option<String>,
    status: String,
    created_at: i64,
}

impl From<AppointmentRow> for Appointment {
    fn from(row: AppointmentRow) -> Self {
        Self {
            id: row.id,
            patient_id: row.patient_id,
            doctor_id: row.doctor_id,
            uuid: row.uuid,
            patient: Party {
                id: row.patient_uuid,
                name: row.patient_name,
            },
            doctor: Party {
                id: row.doctor_uuid,
                name: row.doctor_name,
            },
            scheduled_at: from_secs(row.scheduled_at),
            reason: row.reason,
            status: AppointmentStatus::parse(&row.status).unwrap_or(AppointmentStatus::Scheduled),
            created_at: from_secs(row.created_at),
        }
    }
}

/// An upcoming appointment whose patient has not been reminded yet.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DueReminder {
    pub id: i64,
    pub patient_id: i64,
    pub doctor_name: String,
    pub scheduled_at: i64,
}

const SELECT_APPOINTMENT: &str = "SELECT a.id, a.uuid,
        a.patient_id, p.uuid AS patient_uuid, p.name AS patient_name,
        a.doctor_id, d.uuid AS doctor_uuid, d.name AS doctor_name,
        a.scheduled_at, a.reason, a.status, a.created_at
    FROM appointments a
    JOIN users p ON p.id = a.patient_id
    JOIN users d ON d.id = a.doctor_id";

impl AppointmentStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Book an appointment. Returns its UUID.
    pub async fn create(
        &self,
        patient_id: i64,
        doctor_id: i64,
        scheduled_at: i64,
        reason: Option<&str>,
    ) -> Result<String, sqlx::Error> {
        let uuid = uuid::Uuid::new_v4().to_string();
        let now = now_secs();
        sqlx::query(
            "INSERT INTO appointments (uuid, patient_id, doctor_id, scheduled_at, reason, status, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, 'SCHEDULED', ?, ?)",
        )
        .bind(&uuid)
        .bind(patient_id)
        .bind(doctor_id)
        .bind(scheduled_at)
        .bind(reason)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(uuid)
    }

    pub async fn get_by_uuid(&self, uuid: &str) -> Result<Option<Appointment>, sqlx::Error> {
        let row: Option<AppointmentRow> =
            sqlx::query_as(&format!("{} WHERE a.uuid = ?", SELECT_APPOINTMENT))
                .bind(uuid)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(Appointment::from))
    }

    pub async fn list_for_patient(&self, patient_id: i64) -> Result<Vec<Appointment>, sqlx::Error> {
        self.list_where("a.patient_id = ?", patient_id).await
    }

    pub async fn list_for_doctor(&self, doctor_id: i64) -> Result<Vec<Appointment>, sqlx::Error> {
        self.list_where("a.doctor_id = ?", doctor_id).await
    }

    pub async fn list_all(&self, limit: i64) -> Result<Vec<Appointment>, sqlx::Error> {
        let rows: Vec<AppointmentRow> = sqlx::query_as(&format!(
            "{} ORDER BY a.scheduled_at LIMIT ?",
            SELECT_APPOINTMENT
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Appointment::from).collect())
    }

    async fn list_where(&self, filter: &str, id: i64) -> Result<Vec<Appointment>, sqlx::Error> {
        let rows: Vec<AppointmentRow> = sqlx::query_as(&format!(
            "{} WHERE {} ORDER BY a.scheduled_at",
            SELECT_APPOINTMENT, filter
        ))
        .bind(id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Appointment::from).collect())
    }

    /// Change the status of an appointment that is not final yet.
    pub async fn set_status(&self, id: i64, status: AppointmentStatus) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE appointments SET status = ?, updated_at = ?
             WHERE id = ? AND status NOT IN ('COMPLETED', 'CANCELLED')",
        )
        .bind(status.as_str())
        .bind(now_secs())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Whether the doctor already has a live appointment at exactly this time.
    pub async fn is_slot_taken(&self, doctor_id: i64, scheduled_at: i64) -> Result<bool, sqlx::Error> {
        let count: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM appointments
             WHERE doctor_id = ? AND scheduled_at = ? AND status IN ('SCHEDULED', 'CONFIRMED')",
        )
        .bind(doctor_id)
        .bind(scheduled_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(count.0 > 0)
    }

    /// Live appointments starting between `from` and `until` without a reminder.
    pub async fn due_reminders(&self, from: i64, until: i64) -> Result<Vec<DueReminder>, sqlx::Error> {
        sqlx::query_as(
            "SELECT a.id, a.patient_id, d.name AS doctor_name, a.scheduled_at
             FROM appointments a JOIN users d ON d.id = a.doctor_id
             WHERE a.reminded = 0
               AND a.status IN ('SCHEDULED', 'CONFIRMED')
               AND a.scheduled_at BETWEEN ? AND ?
             ORDER BY a.scheduled_at",
        )
        .bind(from)
        .bind(until)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn mark_reminded(&self, id: i64) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE appointments SET reminded = 1 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Confirmed appointments that started before `now` become completed.
    pub async fn complete_past(&self, now: i64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE appointments SET status = 'COMPLETED', updated_at = ?
             WHERE status = 'CONFIRMED' AND scheduled_at < ?",
        )
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
