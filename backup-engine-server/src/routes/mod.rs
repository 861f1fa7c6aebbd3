pub mod jobs;
pub mod restores;
pub mod system;

use crate::state::AppState;
use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .nest("/api/jobs", jobs::router(state.clone()))
        .nest("/api/restores", restores::router(state.clone()))
        .nest("/api", system::router(state.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
