//! Public doctor directory.

use axum::{
    Json, Router,
    extract::{Query, State},
    response::IntoResponse,
    routing::get,
};
use serde::{Deserialize, Serialize};

use super::error::{ApiError, ResultExt};
use crate::db::{Database, DoctorSummary};

const DEFAULT_LIMIT: i64 = 50;
const MAX_LIMIT: i64 = 100;

#[derive(Clone)]
pub struct DoctorsState {
    pub db: Database,
}

pub fn router(state: DoctorsState) -> Router {
    Router::new()
        .route("/", get(list_doctors))
        .with_state(state)
}

#[derive(Deserialize)]
struct ListQuery {
    available: Option<bool>,
    limit: Option<i64>,
}

#[derive(Serialize)]
struct ListResponse {
    doctors: Vec<DoctorSummary>,
}

async fn list_doctors(
    State(state): State<DoctorsState>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT);
    if !(1..=MAX_LIMIT).contains(&limit) {
        return Err(ApiError::invalid(
            "limit",
            format!("Limit must be between 1 and {}", MAX_LIMIT),
        ));
    }

    let doctors = state
        .db
        .doctors()
        .list(query.available, limit)
        .await
        .db_err("Failed to list doctors")?;

    Ok(Json(ListResponse { doctors }))
}
