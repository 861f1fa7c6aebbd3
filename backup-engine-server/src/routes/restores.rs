use crate::error::AppError;
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use backup_engine::models::{RestoreOutcome, RestoreRequest};
use serde_json::{json, Value};
use std::sync::Arc;

pub fn router(_state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(request_restore))
        .route("/{id}", get(get_restore))
}

async fn request_restore(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RestoreRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    tracing::info!(restore_id = %request.id, requested_by = %request.requested_by, "Restore requested");
    let restore_id = state.engine.request_restore(request).await?;
    Ok((StatusCode::CREATED, Json(json!({ "restoreId": restore_id }))))
}

async fn get_restore(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<RestoreOutcome>, AppError> {
    Ok(Json(state.engine.get_restore(&id).await?))
}
