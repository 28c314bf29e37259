//! Patient-recorded health measurements.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqlitePool;

use super::from_secs;

#[derive(Clone)]
pub struct HealthMetricStore {
    pool: SqlitePool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    HeartRate,
    BloodPressureSystolic,
    BloodPressureDiastolic,
    BloodGlucose,
    Weight,
    Temperature,
    OxygenSaturation,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::HeartRate => "heart_rate",
            MetricKind::BloodPressureSystolic => "blood_pressure_systolic",
            MetricKind::BloodPressureDiastolic => "blood_pressure_diastolic",
            MetricKind::BloodGlucose => "blood_glucose",
            MetricKind::Weight => "weight",
            MetricKind::Temperature => "temperature",
            MetricKind::OxygenSaturation => "oxygen_saturation",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "heart_rate" => Some(MetricKind::HeartRate),
            "blood_pressure_systolic" => Some(MetricKind::BloodPressureSystolic),
            "blood_pressure_diastolic" => Some(MetricKind::BloodPressureDiastolic),
            "blood_glucose" => Some(MetricKind::BloodGlucose),
            "weight" => Some(MetricKind::Weight),
            "temperature" => Some(MetricKind::Temperature),
            "oxygen_saturation" => Some(MetricKind::OxygenSaturation),
            _ => None,
        }
    }

    pub fn default_unit(&self) -> &'static str {
        match self {
            MetricKind::HeartRate => "bpm",
            MetricKind::BloodPressureSystolic | MetricKind::BloodPressureDiastolic => "mmHg",
            MetricKind::BloodGlucose => "mg/dL",
            MetricKind::Weight => "kg",
            MetricKind::Temperature => "°C",
            MetricKind::OxygenSaturation => "%",
        }
    }

    /// Physiologically plausible bounds, inclusive.
    pub fn range(&self) -> (f64, f64) {
        match self {
            MetricKind::HeartRate => (20.0, 300.0),
            MetricKind::BloodPressureSystolic => (50.0, 300.0),
            MetricKind::BloodPressureDiastolic => (20.0, 200.0),
            MetricKind::BloodGlucose => (10.0, 1000.0),
            MetricKind::Weight => (0.5, 500.0),
            MetricKind::Temperature => (25.0, 45.0),
            MetricKind::OxygenSaturation => (50.0, 100.0),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthMetric {
    #[serde(rename = "id")]
    pub uuid: String,
    pub kind: MetricKind,
    pub value: f64,
    pub unit: String,
    pub recorded_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct HealthMetricRow {
    uuid: String,
    kind: String,
    value: f64,
    unit: Option<String>,
    recorded_at: i64,
}

impl HealthMetricRow {
    fn into_metric(self) -> Option<HealthMetric> {
        let kind = MetricKind::parse(&self.kind)?;
        Some(HealthMetric {
            uuid: self.uuid,
            kind,
            value: self.value,
            unit: self.unit.unwrap_or_else(|| kind.default_unit().to_string()),
            recorded_at: from_secs(self.recorded_at),
        })
    }
}

impl HealthMetricStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Record a measurement. Returns its UUID.
    pub async fn create(
        &self,
        user_id: i64,
        kind: MetricKind,
        value: f64,
        unit: &str,
        recorded_at: i64,
    ) -> Result<String, sqlx::Error> {
        let uuid = uuid::Uuid::new_v4().to_string();
        sqlx::query(
            "INSERT INTO health_metrics (uuid, user_id, kind, value, unit, recorded_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&uuid)
        .bind(user_id)
        .bind(kind.as_str())
        .bind(value)
        .bind(unit)
        .bind(recorded_at)
        .execute(&self.pool)
        .await?;
        Ok(uuid)
    }

    /// Most recent first, optionally restricted to one kind.
    pub async fn list_for_user(
        &self,
        user_id: i64,
        kind: Option<MetricKind>,
        limit: i64,
    ) -> Result<Vec<HealthMetric>, sqlx::Error> {
        let kind = kind.map(|k| k.as_str());
        let rows: Vec<HealthMetricRow> = sqlx::query_as(
            "SELECT uuid, kind, value, unit, recorded_at FROM health_metrics
             WHERE user_id = ? AND (? IS NULL OR kind = ?)
             ORDER BY recorded_at DESC, id DESC LIMIT ?",
        )
        .bind(user_id)
        .bind(kind)
        .bind(kind)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().filter_map(HealthMetricRow::into_metric).collect())
    }
}
