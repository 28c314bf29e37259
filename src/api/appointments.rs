//! Appointment booking and status changes.
//!
//! - GET `/` - Patients see their own, doctors see theirs, admins see all
//! - POST `/` - Patient books a doctor
//! - PUT `/{id}` - Confirm, complete or cancel

use axum::{
    Json, Router,
    extract::{Path, State},
    response::IntoResponse,
    routing::{get, put},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use super::current_user;
use super::error::{ApiError, JsonBody, ResultExt, validate_uuid};
use crate::auth::{Auth, PatientOnly, SignedIn};
use crate::db::{Appointment, AppointmentStatus, Database, Role, User};
use crate::impl_has_auth_backend;
use crate::jwt::TokenCodec;

const ADMIN_LIST_LIMIT: i64 = 500;
const MAX_REASON_LENGTH: usize = 500;

#[derive(Clone)]
pub struct AppointmentsState {
    pub db: Database,
    pub codec: Arc<TokenCodec>,
}

impl_has_auth_backend!(AppointmentsState);

pub fn router(state: AppointmentsState) -> Router {
    Router::new()
        .route("/", get(list_appointments).post(create_appointment))
        .route("/{id}", put(update_appointment))
        .with_state(state)
}

/// Best effort: the appointment change stands even if the notice fails.
async fn notify(db: &Database, user_id: i64, title: &str, message: &str) {
    if let Err(e) = db
        .notifications()
        .create(user_id, title, message, "appointment")
        .await
    {
        warn!(user = user_id, "Failed to create appointment notification: {}", e);
    }
}

fn format_time(at: &DateTime<Utc>) -> String {
    at.format("%Y-%m-%d at %H:%M UTC").to_string()
}

#[derive(Serialize)]
struct ListResponse {
    appointments: Vec<Appointment>,
}

async fn list_appointments(
    State(state): State<AppointmentsState>,
    auth: Auth<SignedIn>,
) -> Result<impl IntoResponse, ApiError> {
    let user = current_user(&state.db, auth.user_uuid()?).await?;
    let store = state.db.appointments();

    let appointments = match user.role {
        Role::Patient => store.list_for_patient(user.id).await,
        Role::Doctor => store.list_for_doctor(user.id).await,
        Role::Admin => store.list_all(ADMIN_LIST_LIMIT).await,
        Role::Guest => return Err(ApiError::forbidden("Insufficient permissions")),
    }
    .db_err("Failed to list appointments")?;

    Ok(Json(ListResponse { appointments }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateRequest {
    doctor_id: String,
    scheduled_at: String,
    reason: Option<String>,
}

async fn create_appointment(
    State(state): State<AppointmentsState>,
    auth: Auth<PatientOnly>,
    JsonBody(payload): JsonBody<CreateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let scheduled_at = DateTime::parse_from_rfc3339(&payload.scheduled_at)
        .map_err(|_| ApiError::invalid("scheduledAt", "Time must be an RFC 3339 timestamp"))?
        .with_timezone(&Utc);
    if scheduled_at <= Utc::now() {
        return Err(ApiError::invalid("scheduledAt", "Time must be in the future"));
    }

    let reason = payload
        .reason
        .as_deref()
        .map(str::trim)
        .filter(|r| !r.is_empty());
    if reason.is_some_and(|r| r.chars().count() > MAX_REASON_LENGTH) {
        return Err(ApiError::invalid(
            "reason",
            format!("Reason cannot be longer than {} characters", MAX_REASON_LENGTH),
        ));
    }

    validate_uuid(&payload.doctor_id)?;
    let patient = current_user(&state.db, auth.user_uuid()?).await?;

    let doctor = state
        .db
        .users()
        .get_by_uuid(&payload.doctor_id)
        .await
        .db_err("Failed to get doctor")?
        .filter(|u| u.role == Role::Doctor)
        .ok_or_else(|| ApiError::not_found("Doctor not found"))?;

    let available = state
        .db
        .doctors()
        .get_by_user_id(doctor.id)
        .await
        .db_err("Failed to get doctor profile")?
        .is_some_and(|d| d.available);
    if !available {
        return Err(ApiError::conflict("Doctor is not accepting appointments"));
    }

    let slot_taken = state
        .db
        .appointments()
        .is_slot_taken(doctor.id, scheduled_at.timestamp())
        .await
        .db_err("Failed to check schedule")?;
    if slot_taken {
        return Err(ApiError::conflict("Doctor is already booked at that time"));
    }

    let uuid = state
        .db
        .appointments()
        .create(patient.id, doctor.id, scheduled_at.timestamp(), reason)
        .await
        .db_err("Failed to create appointment")?;

    notify(
        &state.db,
        doctor.id,
        "New appointment",
        &format!(
            "{} booked an appointment on {}.",
            patient.name,
            format_time(&scheduled_at)
        ),
    )
    .await;

    info!(appointment = %uuid, patient = %patient.uuid, doctor = %doctor.uuid, "Appointment booked");

    let appointment = state
        .db
        .appointments()
        .get_by_uuid(&uuid)
        .await
        .db_err("Failed to get appointment")?
        .ok_or_else(|| ApiError::not_found("Appointment not found"))?;
    Ok(Json(appointment))
}

#[derive(Deserialize)]
struct UpdateRequest {
    status: String,
}

/// Which status changes `user` may make to `appointment`.
fn may_set(user: &User, appointment: &Appointment, status: AppointmentStatus) -> bool {
    if user.role == Role::Doctor && user.id == appointment.doctor_id {
        matches!(
            status,
            AppointmentStatus::Confirmed | AppointmentStatus::Completed | AppointmentStatus::Cancelled
        )
    } else if user.id == appointment.patient_id {
        status == AppointmentStatus::Cancelled
    } else {
        false
    }
}

async fn update_appointment(
    State(state): State<AppointmentsState>,
    auth: Auth<SignedIn>,
    Path(id): Path<String>,
    JsonBody(payload): JsonBody<UpdateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_uuid(&id)?;
    let status = AppointmentStatus::parse(&payload.status).ok_or_else(|| {
        ApiError::invalid(
            "status",
            "Status must be SCHEDULED, CONFIRMED, COMPLETED or CANCELLED",
        )
    })?;

    let user = current_user(&state.db, auth.user_uuid()?).await?;
    let store = state.db.appointments();
    let appointment = store
        .get_by_uuid(&id)
        .await
        .db_err("Failed to get appointment")?
        .ok_or_else(|| ApiError::not_found("Appointment not found"))?;

    if !may_set(&user, &appointment, status) {
        return Err(ApiError::forbidden(
            "You are not allowed to make this change",
        ));
    }
    if appointment.status.is_final() {
        return Err(ApiError::conflict(format!(
            "Appointment is already {}",
            appointment.status.as_str().to_lowercase()
        )));
    }

    let changed = store
        .set_status(appointment.id, status)
        .await
        .db_err("Failed to update appointment")?;
    if !changed {
        return Err(ApiError::conflict("Appointment was changed concurrently"));
    }

    let other_party = if user.id == appointment.doctor_id {
        appointment.patient_id
    } else {
        appointment.doctor_id
    };
    notify(
        &state.db,
        other_party,
        "Appointment updated",
        &format!(
            "Your appointment on {} is now {}.",
            format_time(&appointment.scheduled_at),
            status.as_str().to_lowercase()
        ),
    )
    .await;

    info!(appointment = %id, status = status.as_str(), by = %user.uuid, "Appointment updated");

    let updated = store
        .get_by_uuid(&id)
        .await
        .db_err("Failed to get appointment")?
        .ok_or_else(|| ApiError::not_found("Appointment not found"))?;
    Ok(Json(updated))
}
