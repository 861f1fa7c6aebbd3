use super::record::DataType;
use crate::progress::JobProgress;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Current snapshot schema written into every job's metadata.
pub const SCHEMA_VERSION: u32 = 1;

// ── JobType ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    Incremental,
    Full,
    Archive,
    Manual,
}

impl JobType {
    pub const ALL: [JobType; 4] = [
        JobType::Incremental,
        JobType::Full,
        JobType::Archive,
        JobType::Manual,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::Incremental => "incremental",
            JobType::Full => "full",
            JobType::Archive => "archive",
            JobType::Manual => "manual",
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "incremental" => Ok(JobType::Incremental),
            "full" => Ok(JobType::Full),
            "archive" => Ok(JobType::Archive),
            "manual" => Ok(JobType::Manual),
            other => Err(format!("unknown job type '{other}'")),
        }
    }
}

// ── JobStatus ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
    Verifying,
    Verified,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
            JobStatus::Verifying => "verifying",
            JobStatus::Verified => "verified",
        }
    }

    /// The declared transition graph. Anything not listed is rejected.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Pending, Cancelled)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Cancelled)
                | (Completed, Verifying)
                | (Verifying, Verified)
        )
    }

    /// Completed, including the advisory verification states that follow it.
    pub fn is_successful(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Verifying | JobStatus::Verified
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── DestinationState ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DestinationStatus {
    Pending,
    Uploading,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DestinationState {
    pub destination_id: String,
    /// Priority captured when the job started; lower uploads and restores first.
    pub priority: u32,
    pub status: DestinationStatus,
    pub uploaded_bytes: u64,
    pub retry_count: u32,
    pub last_error: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl DestinationState {
    pub fn pending(destination_id: &str, priority: u32) -> Self {
        Self {
            destination_id: destination_id.to_string(),
            priority,
            status: DestinationStatus::Pending,
            uploaded_bytes: 0,
            retry_count: 0,
            last_error: None,
            completed_at: None,
        }
    }
}

// ── Error log ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Error,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEntry {
    pub at: DateTime<Utc>,
    pub severity: Severity,
    pub code: String,
    pub message: String,
    pub resolved: bool,
}

impl ErrorEntry {
    pub fn new(at: DateTime<Utc>, severity: Severity, code: &str, message: impl Into<String>) -> Self {
        Self {
            at,
            severity,
            code: code.to_string(),
            message: message.into(),
            resolved: false,
        }
    }
}

// ── Metadata ──

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobMetadata {
    pub data_types_included: Vec<DataType>,
    pub tenant_ids: Vec<String>,
    pub encryption_key_id: Option<String>,
    /// Base64 AES-GCM nonce.
    pub iv: Option<String>,
    /// SHA-256 of the ciphertext; every destination must report the same.
    pub integrity_hash: Option<String>,
    pub schema_version: u32,
    pub compression_ratio: Option<f64>,
    /// `None` means every record was collected.
    pub baseline_cutoff: Option<DateTime<Utc>>,
    /// When collection started. The next incremental reads changes after this.
    pub collected_at: Option<DateTime<Utc>>,
}

// ── BackupJob ──

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupJob {
    pub id: String,
    #[serde(rename = "type")]
    pub job_type: JobType,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub uncompressed_size: u64,
    pub compressed_size: u64,
    pub record_count: u64,
    /// SHA-256 of the compressed plaintext archive, checked after decryption on restore.
    pub content_hash: Option<String>,
    pub destinations: Vec<DestinationState>,
    pub errors: Vec<ErrorEntry>,
    pub progress: JobProgress,
    pub metadata: JobMetadata,
}

impl BackupJob {
    pub fn new(id: String, job_type: JobType, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            job_type,
            status: JobStatus::Pending,
            created_at,
            started_at: None,
            completed_at: None,
            duration_ms: None,
            uncompressed_size: 0,
            compressed_size: 0,
            record_count: 0,
            content_hash: None,
            destinations: Vec::new(),
            errors: Vec::new(),
            progress: JobProgress::default(),
            metadata: JobMetadata {
                schema_version: SCHEMA_VERSION,
                ..JobMetadata::default()
            },
        }
    }

    pub fn destination(&self, destination_id: &str) -> Option<&DestinationState> {
        self.destinations
            .iter()
            .find(|d| d.destination_id == destination_id)
    }

    pub fn completed_destinations(&self) -> usize {
        self.destinations
            .iter()
            .filter(|d| d.status == DestinationStatus::Completed)
            .count()
    }

    /// Completed destinations in restore order (ascending priority).
    pub fn restore_candidates(&self) -> Vec<&DestinationState> {
        let mut candidates: Vec<_> = self
            .destinations
            .iter()
            .filter(|d| d.status == DestinationStatus::Completed)
            .collect();
        candidates.sort_by_key(|d| d.priority);
        candidates
    }

    pub fn age_days(&self, now: DateTime<Utc>) -> Option<i64> {
        self.completed_at.map(|at| (now - at).num_days())
    }
}
