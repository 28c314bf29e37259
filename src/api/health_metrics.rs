//! Patient health measurements.

use axum::{
    Json, Router,
    extract::{Query, State},
    response::IntoResponse,
    routing::get,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::current_user;
use super::error::{ApiError, FieldError, JsonBody, ResultExt};
use crate::auth::{Auth, PatientOnly};
use crate::db::{Database, HealthMetric, MetricKind};
use crate::impl_has_auth_backend;
use crate::jwt::TokenCodec;

const DEFAULT_LIMIT: i64 = 100;
const MAX_LIMIT: i64 = 500;
const MAX_UNIT_LENGTH: usize = 20;

/// Allowance for client clocks running slightly ahead.
const FUTURE_SKEW_MINUTES: i64 = 5;

#[derive(Clone)]
pub struct HealthMetricsState {
    pub db: Database,
    pub codec: Arc<TokenCodec>,
}

impl_has_auth_backend!(HealthMetricsState);

pub fn router(state: HealthMetricsState) -> Router {
    Router::new()
        .route("/", get(list_metrics).post(record_metric))
        .with_state(state)
}

fn parse_kind(kind: &str) -> Result<MetricKind, ApiError> {
    MetricKind::parse(kind)
        .ok_or_else(|| ApiError::invalid("kind", format!("Unknown metric kind: {}", kind)))
}

#[derive(Deserialize)]
struct ListQuery {
    kind: Option<String>,
    limit: Option<i64>,
}

#[derive(Serialize)]
struct ListResponse {
    metrics: Vec<HealthMetric>,
}

async fn list_metrics(
    State(state): State<HealthMetricsState>,
    auth: Auth<PatientOnly>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let kind = query.kind.as_deref().map(parse_kind).transpose()?;
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT);
    if !(1..=MAX_LIMIT).contains(&limit) {
        return Err(ApiError::invalid(
            "limit",
            format!("Limit must be between 1 and {}", MAX_LIMIT),
        ));
    }

    let user = current_user(&state.db, auth.user_uuid()?).await?;
    let metrics = state
        .db
        .health_metrics()
        .list_for_user(user.id, kind, limit)
        .await
        .db_err("Failed to list health metrics")?;

    Ok(Json(ListResponse { metrics }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecordRequest {
    kind: String,
    value: f64,
    unit: Option<String>,
    recorded_at: Option<String>,
}

struct ValidMetric {
    kind: MetricKind,
    value: f64,
    unit: String,
    recorded_at: DateTime<Utc>,
}

fn validate_metric(req: RecordRequest, now: DateTime<Utc>) -> Result<ValidMetric, ApiError> {
    let kind = parse_kind(&req.kind)?;
    let mut errors = Vec::new();

    let (min, max) = kind.range();
    if !req.value.is_finite() || req.value < min || req.value > max {
        errors.push(FieldError::new(
            "value",
            format!("Value must be between {} and {}", min, max),
        ));
    }

    let unit = req
        .unit
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
        .unwrap_or_else(|| kind.default_unit().to_string());
    if unit.chars().count() > MAX_UNIT_LENGTH {
        errors.push(FieldError::new("unit", "Unit is too long"));
    }

    let recorded_at = match req.recorded_at.as_deref() {
        None => now,
        Some(raw) => match DateTime::parse_from_rfc3339(raw) {
            Ok(at) if at.with_timezone(&Utc) > now + Duration::minutes(FUTURE_SKEW_MINUTES) => {
                errors.push(FieldError::new("recordedAt", "Time is in the future"));
                now
            }
            Ok(at) => at.with_timezone(&Utc),
            Err(_) => {
                errors.push(FieldError::new(
                    "recordedAt",
                    "Time must be an RFC 3339 timestamp",
                ));
                now
            }
        },
    };

    if !errors.is_empty() {
        return Err(ApiError::Validation(errors));
    }
    Ok(ValidMetric {
        kind,
        value: req.value,
        unit,
        recorded_at,
    })
}

#[derive(Serialize)]
struct RecordResponse {
    id: String,
}

async fn record_metric(
    State(state): State<HealthMetricsState>,
    auth: Auth<PatientOnly>,
    JsonBody(payload): JsonBody<RecordRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let metric = validate_metric(payload, Utc::now())?;
    let user = current_user(&state.db, auth.user_uuid()?).await?;

    let id = state
        .db
        .health_metrics()
        .create(
            user.id,
            metric.kind,
            metric.value,
            &metric.unit,
            metric.recorded_at.timestamp(),
        )
        .await
        .db_err("Failed to record health metric")?;

    Ok(Json(RecordResponse { id }))
}
