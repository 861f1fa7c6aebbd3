use crate::error::AppError;
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::routing::{get, put};
use axum::{Json, Router};
use backup_engine::models::Destination;
use backup_engine::{EngineStats, SystemTestReport};
use std::sync::Arc;

pub fn router(_state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/stats", get(get_stats))
        .route("/system/test", get(test_system))
        .route("/destinations", get(list_destinations))
        .route("/destinations/{id}", put(update_destination))
}

async fn get_stats(State(state): State<Arc<AppState>>) -> Json<EngineStats> {
    Json(state.engine.get_stats().await)
}

async fn test_system(State(state): State<Arc<AppState>>) -> Json<SystemTestReport> {
    Json(state.engine.test_system().await)
}

async fn list_destinations(State(state): State<Arc<AppState>>) -> Json<Vec<Destination>> {
    Json(state.engine.list_destinations().await)
}

/// Change priority, retry budget or the active flag of a registered destination.
async fn update_destination(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(destination): Json<Destination>,
) -> Result<Json<Vec<Destination>>, AppError> {
    if destination.id != id {
        return Err(AppError::BadRequest(format!(
            "destination id '{}' does not match path '{id}'",
            destination.id
        )));
    }
    state.engine.update_destination(destination).await?;
    Ok(Json(state.engine.list_destinations().await))
}
