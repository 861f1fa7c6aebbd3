//! Error taxonomy for the backup engine.

use crate::models::{JobStatus, JobType};
use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Destination {destination_id} unreachable: {message}")]
    Connectivity {
        destination_id: String,
        message: String,
    },

    #[error("No reachable destinations")]
    EmptyDestinationSet,

    #[error("Integrity mismatch on {destination_id}: expected {expected}, got {actual}")]
    Integrity {
        destination_id: String,
        expected: String,
        actual: String,
    },

    #[error("Insufficient capacity: estimated {estimated} bytes, available {available} bytes")]
    Capacity { estimated: u64, available: u64 },

    #[error("All destinations failed for job {0}")]
    AllDestinationsFailed(String),

    #[error("Restore requires at least one approval")]
    ApprovalRequired,

    #[error("No completed backup at or before {0}")]
    NoBackupFound(DateTime<Utc>),

    #[error("A {job_type} backup is already running ({job_id})")]
    AlreadyRunning { job_type: JobType, job_id: String },

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Restore not found: {0}")]
    RestoreNotFound(String),

    #[error("Invalid status transition {from} -> {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },

    #[error("Job {0} was cancelled")]
    Cancelled(String),

    #[error("Encryption error: {0}")]
    Crypto(String),

    #[error("Compression error: {0}")]
    Compression(String),

    #[error("Unsupported snapshot schema version {0}")]
    UnsupportedSchema(u32),

    #[error("Destination adapter error: {0}")]
    Adapter(String),

    #[error("Data source error: {0}")]
    DataSource(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EngineError {
    /// Stable machine-readable reason code surfaced to API callers.
    pub fn reason_code(&self) -> &'static str {
        match self {
            EngineError::Config(_) => "config_error",
            EngineError::Validation(_) => "validation_failed",
            EngineError::Connectivity { .. } => "connectivity_error",
            EngineError::EmptyDestinationSet => "empty_destination_set",
            EngineError::Integrity { .. } => "integrity_error",
            EngineError::Capacity { .. } => "capacity_error",
            EngineError::AllDestinationsFailed(_) => "all_destinations_failed",
            EngineError::ApprovalRequired => "approval_required",
            EngineError::NoBackupFound(_) => "no_backup_found",
            EngineError::AlreadyRunning { .. } => "already_running",
            EngineError::JobNotFound(_) => "job_not_found",
            EngineError::RestoreNotFound(_) => "restore_not_found",
            EngineError::InvalidTransition { .. } => "invalid_transition",
            EngineError::Cancelled(_) => "cancelled",
            EngineError::Crypto(_) => "crypto_error",
            EngineError::Compression(_) => "compression_error",
            EngineError::UnsupportedSchema(_) => "unsupported_schema",
            EngineError::Adapter(_) => "adapter_error",
            EngineError::DataSource(_) => "data_source_error",
            EngineError::Io(_) => "io_error",
            EngineError::Serialization(_) => "serialization_error",
        }
    }

    /// Whether a per-attempt failure of this kind may be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::Connectivity { .. } | EngineError::Integrity { .. } | EngineError::Adapter(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
