use crate::error::AppError;
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use backup_engine::models::{BackupJob, JobType};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

pub fn router(_state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_jobs).post(start_job))
        .route("/{id}", get(get_job))
        .route("/{id}/cancel", post(cancel_job))
}

#[derive(Deserialize)]
struct ListQuery {
    limit: Option<usize>,
}

#[derive(Deserialize)]
struct StartJobRequest {
    #[serde(rename = "type")]
    job_type: JobType,
}

async fn list_jobs(
    State(state): State<Arc<AppState>>,
    Query(q): Query<ListQuery>,
) -> Json<Vec<BackupJob>> {
    let limit = q.limit.unwrap_or(50).min(500);
    Json(state.engine.list_jobs(limit).await)
}

async fn start_job(
    State(state): State<Arc<AppState>>,
    Json(body): Json<StartJobRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let job_id = state.engine.start_backup(body.job_type).await?;
    Ok((StatusCode::ACCEPTED, Json(json!({ "jobId": job_id }))))
}

async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<BackupJob>, AppError> {
    Ok(Json(state.engine.get_job(&id).await?))
}

async fn cancel_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let cancelled = state.engine.cancel_backup(&id).await?;
    Ok(Json(json!({ "jobId": id, "cancelled": cancelled })))
}
