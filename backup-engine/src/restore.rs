//! Restore coordination.
//!
//! A request is validated and approval-checked before any destination is
//! touched. Execution is keyed by request id: a request that already ran to
//! completion (or is running) is not executed again.

use crate::adapter::RestoreTarget;
use crate::clock::Clock;
use crate::crypto::{decode_iv, sha256_hex, EncryptionManager};
use crate::ledger::JobLedger;
use crate::models::{BackupJob, DataType, RestoreOutcome, RestoreRequest, RestoreStatus};
use crate::packager::Packager;
use crate::registry::DestinationRegistry;
use crate::utils::{EngineError, Result};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

pub struct RestoreCoordinator {
    ledger: Arc<JobLedger>,
    registry: Arc<DestinationRegistry>,
    crypto: Arc<EncryptionManager>,
    packager: Packager,
    target: Arc<dyn RestoreTarget>,
    clock: Arc<dyn Clock>,
    outcomes: Mutex<HashMap<String, RestoreOutcome>>,
}

impl RestoreCoordinator {
    pub fn new(
        ledger: Arc<JobLedger>,
        registry: Arc<DestinationRegistry>,
        crypto: Arc<EncryptionManager>,
        packager: Packager,
        target: Arc<dyn RestoreTarget>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            ledger,
            registry,
            crypto,
            packager,
            target,
            clock,
            outcomes: Mutex::new(HashMap::new()),
        }
    }

    pub fn validate(request: &RestoreRequest) -> Result<DateTime<Utc>> {
        if request.requested_by.trim().is_empty() {
            return Err(EngineError::Validation("requestedBy is required".into()));
        }
        if request.data_types.is_empty() {
            return Err(EngineError::Validation("dataTypes must not be empty".into()));
        }
        request
            .target_date
            .ok_or_else(|| EngineError::Validation("targetDate is required".into()))
    }

    /// Run a restore request and return its id.
    pub async fn request_restore(&self, mut request: RestoreRequest) -> Result<String> {
        let target_date = Self::validate(&request)?;
        if !request.is_approved() {
            warn!(restore_id = %request.id, requested_by = %request.requested_by, "Restore rejected without approval");
            return Err(EngineError::ApprovalRequired);
        }

        if already_executed(&*self.outcomes.lock().await, &request.id) {
            return Ok(request.id);
        }

        let job = self.find_backup_for_date(target_date).await?;
        request.target_backup_job_id = Some(job.id.clone());

        {
            let mut outcomes = self.outcomes.lock().await;
            if already_executed(&outcomes, &request.id) {
                return Ok(request.id);
            }
            prune_settled(&mut outcomes);
            outcomes.insert(
                request.id.clone(),
                RestoreOutcome {
                    restore_id: request.id.clone(),
                    backup_job_id: job.id.clone(),
                    requested_by: request.requested_by.clone(),
                    status: RestoreStatus::Running,
                    source_destination: None,
                    records_restored: 0,
                    restored_by_type: BTreeMap::new(),
                    started_at: self.clock.now(),
                    finished_at: None,
                    error: None,
                },
            );
        }

        info!(restore_id = %request.id, job_id = %job.id, "Restore started");
        let result = self.execute(&request, &job).await;

        let mut outcomes = self.outcomes.lock().await;
        let outcome = outcomes
            .get_mut(&request.id)
            .ok_or_else(|| EngineError::RestoreNotFound(request.id.clone()))?;
        outcome.finished_at = Some(self.clock.now());
        match result {
            Ok((source, by_type)) => {
                outcome.status = RestoreStatus::Completed;
                outcome.source_destination = Some(source);
                outcome.records_restored = by_type.values().sum();
                outcome.restored_by_type = by_type;
                info!(
                    restore_id = %request.id,
                    records = outcome.records_restored,
                    "Restore completed"
                );
                Ok(request.id)
            }
            Err(e) => {
                error!(restore_id = %request.id, error = %e, "Restore failed");
                outcome.status = RestoreStatus::Failed;
                outcome.error = Some(e.to_string());
                Err(e)
            }
        }
    }

    pub async fn get_restore(&self, restore_id: &str) -> Option<RestoreOutcome> {
        self.outcomes.lock().await.get(restore_id).cloned()
    }

    /// Most recent successful job completed at or before `target_date`.
    pub async fn find_backup_for_date(&self, target_date: DateTime<Utc>) -> Result<BackupJob> {
        self.ledger
            .successful()
            .await
            .into_iter()
            .find(|job| job.completed_at.is_some_and(|at| at <= target_date))
            .ok_or(EngineError::NoBackupFound(target_date))
    }

    async fn execute(
        &self,
        request: &RestoreRequest,
        job: &BackupJob,
    ) -> Result<(String, BTreeMap<DataType, u64>)> {
        let key_id = job
            .metadata
            .encryption_key_id
            .as_deref()
            .ok_or_else(|| EngineError::Crypto(format!("job {} has no key binding", job.id)))?;
        let iv = job
            .metadata
            .iv
            .as_deref()
            .ok_or_else(|| EngineError::Crypto(format!("job {} has no iv", job.id)))?;
        let iv = decode_iv(iv)?;

        let (source, ciphertext) = self.download_intact(job).await?;
        let compressed = self.crypto.decrypt(&ciphertext, key_id, &iv)?;
        if let Some(expected) = job.content_hash.as_deref() {
            let actual = sha256_hex(&compressed);
            if actual != expected {
                return Err(EngineError::Integrity {
                    destination_id: source,
                    expected: expected.to_string(),
                    actual,
                });
            }
        }
        let snapshot = self.packager.unpack(&compressed)?;

        let mut by_type = BTreeMap::new();
        for (data_type, records) in snapshot.sections {
            if !request.data_types.contains(&data_type) {
                continue;
            }
            let selected: Vec<_> = records
                .into_iter()
                .filter(|r| request.filters.matches(r))
                .collect();
            let written = if selected.is_empty() {
                0
            } else {
                self.target
                    .write(&request.destination_scope, data_type, selected)
                    .await
                    .map_err(|e| EngineError::DataSource(format!("{data_type}: {e:#}")))?
            };
            by_type.insert(data_type, written as u64);
        }
        Ok((source, by_type))
    }

    /// First completed destination, by priority, that returns bytes matching
    /// the job's integrity hash.
    async fn download_intact(&self, job: &BackupJob) -> Result<(String, Bytes)> {
        let expected = job
            .metadata
            .integrity_hash
            .as_deref()
            .ok_or_else(|| EngineError::Validation(format!("job {} has no integrity hash", job.id)))?;

        for state in job.restore_candidates() {
            let Some(adapter) = self.registry.adapter(&state.destination_id).await else {
                continue;
            };
            match adapter.download(&job.id).await {
                Ok(bytes) if sha256_hex(&bytes) == expected => {
                    return Ok((state.destination_id.clone(), bytes));
                }
                Ok(_) => {
                    warn!(job_id = %job.id, destination_id = %state.destination_id, "Downloaded copy failed integrity check, trying next destination");
                }
                Err(e) => {
                    warn!(job_id = %job.id, destination_id = %state.destination_id, error = %e, "Download failed, trying next destination");
                }
            }
        }
        Err(EngineError::AllDestinationsFailed(job.id.clone()))
    }
}

/// Settled outcomes kept for lookup and idempotency.
const MAX_SETTLED_OUTCOMES: usize = 1000;

fn already_executed(outcomes: &HashMap<String, RestoreOutcome>, restore_id: &str) -> bool {
    let executed = outcomes
        .get(restore_id)
        .is_some_and(|o| o.status != RestoreStatus::Failed);
    if executed {
        info!(restore_id = %restore_id, "Restore already executed, not repeating");
    }
    executed
}

/// Drop the oldest settled outcomes once the map is full. Running ones stay.
fn prune_settled(outcomes: &mut HashMap<String, RestoreOutcome>) {
    let mut settled: Vec<(DateTime<Utc>, String)> = outcomes
        .values()
        .filter(|o| o.status != RestoreStatus::Running)
        .map(|o| (o.finished_at.unwrap_or(o.started_at), o.restore_id.clone()))
        .collect();
    if settled.len() < MAX_SETTLED_OUTCOMES {
        return;
    }
    settled.sort();
    let excess = settled.len() + 1 - MAX_SETTLED_OUTCOMES;
    for (_, restore_id) in settled.into_iter().take(excess) {
        outcomes.remove(&restore_id);
    }
}
