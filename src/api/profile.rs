//! The signed-in user's own profile.
//!
//! - GET `/` - Account details, plus practice details for doctors
//! - PUT `/` - Partial update

use axum::{Json, Router, extract::State, response::IntoResponse, routing::get};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::error::{ApiError, FieldError, JsonBody, ResultExt};
use crate::auth::{Auth, SignedIn};
use crate::db::{Database, DoctorProfile, DoctorUpdate, ProfileUpdate, Role, User, from_secs};
use crate::impl_has_auth_backend;
use crate::jwt::TokenCodec;

const MAX_NAME_LENGTH: usize = 100;
const MAX_PHONE_LENGTH: usize = 30;
const MAX_ADDRESS_LENGTH: usize = 255;
const MAX_SPECIALIZATION_LENGTH: usize = 100;
const MAX_BIO_LENGTH: usize = 2000;

#[derive(Clone)]
pub struct ProfileState {
    pub db: Database,
    pub codec: Arc<TokenCodec>,
}

impl_has_auth_backend!(ProfileState);

pub fn router(state: ProfileState) -> Router {
    Router::new()
        .route("/", get(get_profile).put(update_profile))
        .with_state(state)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DoctorDetails {
    specialization: String,
    bio: Option<String>,
    available: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProfileResponse {
    id: String,
    email: String,
    name: String,
    phone: Option<String>,
    role: Role,
    date_of_birth: Option<String>,
    address: Option<String>,
    created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    doctor: Option<DoctorDetails>,
}

impl ProfileResponse {
    fn new(user: User, doctor: Option<DoctorProfile>) -> Self {
        Self {
            id: user.uuid,
            email: user.email,
            name: user.name,
            phone: user.phone,
            role: user.role,
            date_of_birth: user.date_of_birth,
            address: user.address,
            created_at: from_secs(user.created_at),
            doctor: doctor.map(|d| DoctorDetails {
                specialization: d.specialization,
                bio: d.bio,
                available: d.available,
            }),
        }
    }
}

async fn load_profile(db: &Database, uuid: &str) -> Result<ProfileResponse, ApiError> {
    let user = db
        .users()
        .get_by_uuid(uuid)
        .await
        .db_err("Failed to get user")?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    let doctor = if user.role == Role::Doctor {
        db.doctors()
            .get_by_user_id(user.id)
            .await
            .db_err("Failed to get doctor profile")?
    } else {
        None
    };

    Ok(ProfileResponse::new(user, doctor))
}

async fn get_profile(
    State(state): State<ProfileState>,
    auth: Auth<SignedIn>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(load_profile(&state.db, auth.user_uuid()?).await?))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateRequest {
    name: Option<String>,
    phone: Option<String>,
    date_of_birth: Option<String>,
    address: Option<String>,
    specialization: Option<String>,
    bio: Option<String>,
    available: Option<bool>,
}

fn check_length(
    errors: &mut Vec<FieldError>,
    field: &'static str,
    value: &Option<String>,
    max: usize,
) {
    if value.as_ref().is_some_and(|v| v.chars().count() > max) {
        errors.push(FieldError::new(
            field,
            format!("{} cannot be longer than {} characters", field, max),
        ));
    }
}

fn trimmed(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string())
}

fn validate_update(
    req: UpdateRequest,
    role: Role,
) -> Result<(ProfileUpdate, DoctorUpdate), ApiError> {
    let mut errors = Vec::new();

    let profile = ProfileUpdate {
        name: trimmed(req.name),
        phone: trimmed(req.phone),
        date_of_birth: trimmed(req.date_of_birth),
        address: trimmed(req.address),
    };
    let doctor = DoctorUpdate {
        specialization: trimmed(req.specialization),
        bio: trimmed(req.bio),
        available: req.available,
    };

    if profile.name.as_deref() == Some("") {
        errors.push(FieldError::new("name", "Name cannot be empty"));
    }
    check_length(&mut errors, "name", &profile.name, MAX_NAME_LENGTH);
    check_length(&mut errors, "phone", &profile.phone, MAX_PHONE_LENGTH);
    check_length(&mut errors, "address", &profile.address, MAX_ADDRESS_LENGTH);

    if let Some(dob) = &profile.date_of_birth {
        match NaiveDate::parse_from_str(dob, "%Y-%m-%d") {
            Ok(date) if date > Utc::now().date_naive() => {
                errors.push(FieldError::new("dateOfBirth", "Date of birth is in the future"));
            }
            Ok(_) => {}
            Err(_) => errors.push(FieldError::new(
                "dateOfBirth",
                "Date of birth must be formatted YYYY-MM-DD",
            )),
        }
    }

    if !doctor.is_empty() && role != Role::Doctor {
        errors.push(FieldError::new(
            "specialization",
            "Only doctors have practice details",
        ));
    }
    if doctor.specialization.as_deref() == Some("") {
        errors.push(FieldError::new("specialization", "Specialization cannot be empty"));
    }
    check_length(
        &mut errors,
        "specialization",
        &doctor.specialization,
        MAX_SPECIALIZATION_LENGTH,
    );
    check_length(&mut errors, "bio", &doctor.bio, MAX_BIO_LENGTH);

    if profile.is_empty() && doctor.is_empty() {
        return Err(ApiError::bad_request("No fields to update"));
    }
    if !errors.is_empty() {
        return Err(ApiError::Validation(errors));
    }
    Ok((profile, doctor))
}

async fn update_profile(
    State(state): State<ProfileState>,
    auth: Auth<SignedIn>,
    JsonBody(payload): JsonBody<UpdateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state
        .db
        .users()
        .get_by_uuid(auth.user_uuid()?)
        .await
        .db_err("Failed to get user")?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    let (profile, doctor) = validate_update(payload, user.role)?;

    if !profile.is_empty() {
        state
            .db
            .users()
            .update_profile(user.id, &profile)
            .await
            .db_err("Failed to update profile")?;
    }
    if !doctor.is_empty() {
        state
            .db
            .doctors()
            .upsert(user.id, &doctor)
            .await
            .db_err("Failed to update doctor profile")?;
    }

    Ok(Json(load_profile(&state.db, &user.uuid).await?))
}
