use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use backup_engine::EngineError;
use serde_json::json;

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

fn engine_status(error: &EngineError) -> StatusCode {
    match error {
        EngineError::JobNotFound(_) | EngineError::RestoreNotFound(_) => StatusCode::NOT_FOUND,
        EngineError::Validation(_) => StatusCode::BAD_REQUEST,
        EngineError::ApprovalRequired => StatusCode::FORBIDDEN,
        EngineError::AlreadyRunning { .. } | EngineError::InvalidTransition { .. } => StatusCode::CONFLICT,
        EngineError::Capacity { .. } => StatusCode::INSUFFICIENT_STORAGE,
        EngineError::Connectivity { .. } | EngineError::EmptyDestinationSet => StatusCode::SERVICE_UNAVAILABLE,
        EngineError::NoBackupFound(_) => StatusCode::UNPROCESSABLE_ENTITY,
        EngineError::Config(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, msg, code) = match &self {
            AppError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone(), "bad_request"),
            AppError::Engine(e) => {
                let status = engine_status(e);
                if status.is_server_error() {
                    tracing::error!(code = e.reason_code(), "Engine error: {e}");
                }
                (status, e.to_string(), e.reason_code())
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:#}");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".into(), "internal")
            }
        };
        (status, Json(json!({ "error": msg, "code": code }))).into_response()
    }
}
