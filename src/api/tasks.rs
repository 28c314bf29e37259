//! Manual trigger for maintenance tasks. Admins only.

use axum::{Json, Router, extract::State, response::IntoResponse, routing::post};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

use super::error::{ApiError, JsonBody};
use crate::auth::{AdminOnly, Auth};
use crate::db::Database;
use crate::impl_has_auth_backend;
use crate::jwt::TokenCodec;
use crate::tasks::ScheduledTask;

#[derive(Clone)]
pub struct TasksState {
    pub db: Database,
    pub codec: Arc<TokenCodec>,
}

impl_has_auth_backend!(TasksState);

pub fn router(state: TasksState) -> Router {
    Router::new().route("/", post(run_task)).with_state(state)
}

#[derive(Deserialize)]
struct RunRequest {
    task: String,
}

#[derive(Serialize)]
struct RunResponse {
    task: &'static str,
    result: Value,
}

async fn run_task(
    State(state): State<TasksState>,
    auth: Auth<AdminOnly>,
    JsonBody(payload): JsonBody<RunRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let task: ScheduledTask = payload
        .task
        .parse()
        .map_err(|e: crate::tasks::UnknownTask| ApiError::bad_request(e.to_string()))?;

    info!(task = %task, admin = ?auth.subject, "Task triggered manually");

    let result = task
        .run(&state.db)
        .await
        .map_err(|e| ApiError::internal("Task failed", e))?;

    Ok(Json(RunResponse {
        task: task.name(),
        result,
    }))
}
