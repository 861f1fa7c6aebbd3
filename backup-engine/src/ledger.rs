//! The job ledger.
//!
//! Every job mutation goes through [`JobLedger::apply`], which validates the
//! update against the job's current state under one write lock. Readers get
//! cloned snapshots and never observe a half-applied update.

use crate::models::{
    BackupJob, DataType, DestinationState, DestinationStatus, ErrorEntry, JobStatus,
};
use crate::progress::Phase;
use crate::utils::{EngineError, Result};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
pub enum DestinationUpdate {
    Uploading,
    AttemptFailed { error: String },
    Completed { uploaded_bytes: u64 },
    Failed { error: String },
}

#[derive(Debug, Clone)]
pub enum JobUpdate {
    Status(JobStatus),
    Phase(Phase),
    Bytes { processed: u64, total: u64 },
    Collected {
        record_count: u64,
        data_types: Vec<DataType>,
        tenant_ids: Vec<String>,
        cutoff: Option<DateTime<Utc>>,
        collected_at: DateTime<Utc>,
    },
    Packed {
        uncompressed_size: u64,
        compressed_size: u64,
        compression_ratio: f64,
        content_hash: String,
    },
    /// Binds the encryption key and fixes the integrity hash. Applied once.
    Sealed {
        key_id: String,
        iv: String,
        integrity_hash: String,
    },
    Destinations(Vec<DestinationState>),
    Destination {
        destination_id: String,
        update: DestinationUpdate,
    },
    Error(ErrorEntry),
}

#[derive(Default)]
pub struct JobLedger {
    jobs: RwLock<HashMap<String, BackupJob>>,
}

impl JobLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, job: BackupJob) {
        self.jobs.write().await.insert(job.id.clone(), job);
    }

    /// Apply one update. On error the job is left untouched.
    pub async fn apply(&self, job_id: &str, update: JobUpdate, at: DateTime<Utc>) -> Result<BackupJob> {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| EngineError::JobNotFound(job_id.to_string()))?;

        let mut next = job.clone();
        apply_to(&mut next, update, at)?;
        *job = next;
        Ok(job.clone())
    }

    pub async fn get(&self, job_id: &str) -> Option<BackupJob> {
        self.jobs.read().await.get(job_id).cloned()
    }

    /// Newest first by creation time.
    pub async fn list(&self, limit: usize) -> Vec<BackupJob> {
        let mut jobs = self.all().await;
        jobs.truncate(limit);
        jobs
    }

    /// Every job, newest first by creation time.
    pub async fn all(&self) -> Vec<BackupJob> {
        let mut jobs: Vec<BackupJob> = self.jobs.read().await.values().cloned().collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        jobs
    }

    /// Successful jobs, newest completion first.
    pub async fn successful(&self) -> Vec<BackupJob> {
        let mut jobs: Vec<BackupJob> = self
            .jobs
            .read()
            .await
            .values()
            .filter(|j| j.status.is_successful() && j.completed_at.is_some())
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.completed_at.cmp(&a.completed_at));
        jobs
    }

    pub async fn remove(&self, job_id: &str) -> Option<BackupJob> {
        self.jobs.write().await.remove(job_id)
    }
}

fn apply_to(job: &mut BackupJob, update: JobUpdate, at: DateTime<Utc>) -> Result<()> {
    match update {
        JobUpdate::Status(next) => {
            if !job.status.can_transition_to(next) {
                return Err(EngineError::InvalidTransition {
                    from: job.status,
                    to: next,
                });
            }
            if next == JobStatus::Completed && job.completed_destinations() == 0 {
                return Err(EngineError::Validation(format!(
                    "job {} has no completed destination",
                    job.id
                )));
            }
            match next {
                JobStatus::Running => job.started_at = Some(at),
                JobStatus::Completed => {
                    job.completed_at = Some(at);
                    job.duration_ms = job.started_at.map(|s| (at - s).num_milliseconds());
                }
                JobStatus::Failed | JobStatus::Cancelled => {
                    job.duration_ms = job.started_at.map(|s| (at - s).num_milliseconds());
                }
                _ => {}
            }
            job.status = next;
        }
        JobUpdate::Phase(phase) => {
            if !job.progress.advance(phase) {
                return Err(EngineError::Validation(format!(
                    "phase cannot move from {} back to {}",
                    job.progress.phase, phase
                )));
            }
        }
        JobUpdate::Bytes { processed, total } => job.progress.update_bytes(processed, total),
        JobUpdate::Collected {
            record_count,
            data_types,
            tenant_ids,
            cutoff,
            collected_at,
        } => {
            job.record_count = record_count;
            job.progress.set_files(record_count, record_count);
            job.metadata.data_types_included = data_types;
            job.metadata.tenant_ids = tenant_ids;
            job.metadata.baseline_cutoff = cutoff;
            job.metadata.collected_at = Some(collected_at);
        }
        JobUpdate::Packed {
            uncompressed_size,
            compressed_size,
            compression_ratio,
            content_hash,
        } => {
            if job.content_hash.is_some() {
                return Err(EngineError::Validation(format!(
                    "content hash of job {} is already fixed",
                    job.id
                )));
            }
            job.uncompressed_size = uncompressed_size;
            job.compressed_size = compressed_size;
            job.metadata.compression_ratio = Some(compression_ratio);
            job.content_hash = Some(content_hash);
        }
        JobUpdate::Sealed {
            key_id,
            iv,
            integrity_hash,
        } => {
            if job.metadata.encryption_key_id.is_some() || job.metadata.integrity_hash.is_some() {
                return Err(EngineError::Validation(format!(
                    "encryption binding of job {} is immutable",
                    job.id
                )));
            }
            job.metadata.encryption_key_id = Some(key_id);
            job.metadata.iv = Some(iv);
            job.metadata.integrity_hash = Some(integrity_hash);
        }
        JobUpdate::Destinations(states) => {
            if !job.destinations.is_empty() {
                return Err(EngineError::Validation(format!(
                    "destinations of job {} are already assigned",
                    job.id
                )));
            }
            job.destinations = states;
        }
        JobUpdate::Destination {
            destination_id,
            update,
        } => {
            let state = job
                .destinations
                .iter_mut()
                .find(|d| d.destination_id == destination_id)
                .ok_or_else(|| {
                    EngineError::Validation(format!(
                        "destination {destination_id} is not part of job {}",
                        job.id
                    ))
                })?;
            if matches!(state.status, DestinationStatus::Completed | DestinationStatus::Failed) {
                return Err(EngineError::Validation(format!(
                    "destination {destination_id} already settled"
                )));
            }
            match update {
                DestinationUpdate::Uploading => state.status = DestinationStatus::Uploading,
                DestinationUpdate::AttemptFailed { error } => {
                    state.retry_count += 1;
                    state.last_error = Some(error);
                }
                DestinationUpdate::Completed { uploaded_bytes } => {
                    state.status = DestinationStatus::Completed;
                    state.uploaded_bytes = uploaded_bytes;
                    state.completed_at = Some(at);
                }
                DestinationUpdate::Failed { error } => {
                    state.status = DestinationStatus::Failed;
                    state.last_error = Some(error);
                }
            }
        }
        JobUpdate::Error(entry) => job.errors.push(entry),
    }
    Ok(())
}
