//! The backup engine: job orchestration, scheduling and the public control
//! surface.
//!
//! A backup request is admitted only after the engine switch, the per-type
//! running slot, the capacity estimate and destination probes all pass. The
//! job then runs as its own task, one phase after another:
//!
//! ```text
//! preparing → collecting → compressing → encrypting → uploading → verifying → completed
//! ```
//!
//! The job reaches `Completed` as soon as one destination holds a verified
//! copy. The remaining uploads keep going for redundancy, but the running slot
//! for the job type is released at completion.

use crate::adapter::{DataSource, DestinationAdapter, RestoreTarget};
use crate::clock::{Clock, SystemClock};
use crate::collector::DataCollector;
use crate::config::EngineConfig;
use crate::crypto::{sha256_hex, EncryptionManager};
use crate::ledger::{JobLedger, JobUpdate};
use crate::models::{
    BackupJob, Destination, DestinationState, ErrorEntry, JobStatus, JobType, RestoreOutcome,
    RestoreRequest, Severity,
};
use crate::packager::Packager;
use crate::progress::{format_bytes, format_duration, Phase};
use crate::registry::{DestinationRegistry, UploadTarget};
use crate::restore::RestoreCoordinator;
use crate::retention::RetentionSweeper;
use crate::schedule::{ScheduleEvaluator, ScheduledTask};
use crate::uploader::{DestinationUploader, UploadSummary};
use crate::utils::{EngineError, Result};
use crate::verifier::{VerificationReport, Verifier};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStats {
    pub total_jobs: usize,
    pub successful_jobs: usize,
    pub failed_jobs: usize,
    pub total_bytes_backed_up: u64,
    /// Mean duration of successful jobs in milliseconds
    pub avg_duration: f64,
    pub last_backup_at: Option<DateTime<Utc>>,
    pub next_scheduled_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    pub check: String,
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemTestReport {
    pub success: bool,
    pub diagnostics: Vec<Diagnostic>,
}

pub struct BackupEngine {
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    ledger: Arc<JobLedger>,
    registry: Arc<DestinationRegistry>,
    crypto: Arc<EncryptionManager>,
    collector: DataCollector,
    packager: Packager,
    uploader: DestinationUploader,
    schedule: ScheduleEvaluator,
    retention: RetentionSweeper,
    verifier: Verifier,
    restores: RestoreCoordinator,
    /// Job type -> id of the job holding that type's running slot
    running: Mutex<HashMap<JobType, String>>,
    cancel_tokens: DashMap<String, CancellationToken>,
    tasks: Mutex<HashMap<String, JoinHandle<()>>>,
    shutdown: CancellationToken,
    last_tick: Mutex<DateTime<Utc>>,
    queue_tx: mpsc::UnboundedSender<ScheduledTask>,
    queue_rx: Mutex<Option<mpsc::UnboundedReceiver<ScheduledTask>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl BackupEngine {
    pub fn new(
        config: EngineConfig,
        source: Arc<dyn DataSource>,
        target: Arc<dyn RestoreTarget>,
    ) -> Result<Arc<Self>> {
        Self::with_clock(config, source, target, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: EngineConfig,
        source: Arc<dyn DataSource>,
        target: Arc<dyn RestoreTarget>,
        clock: Arc<dyn Clock>,
    ) -> Result<Arc<Self>> {
        config.validate()?;

        let ledger = Arc::new(JobLedger::new());
        let registry = Arc::new(DestinationRegistry::new());
        let crypto = Arc::new(EncryptionManager::from_config(&config.encryption)?);
        let packager = Packager::new(config.storage.compression_level);
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();

        Ok(Arc::new(Self {
            collector: DataCollector::new(source),
            uploader: DestinationUploader::new(ledger.clone(), clock.clone(), config.upload.clone()),
            schedule: ScheduleEvaluator::from_config(&config.schedule)?,
            retention: RetentionSweeper::new(config.retention),
            verifier: Verifier::new(ledger.clone(), registry.clone(), clock.clone()),
            restores: RestoreCoordinator::new(
                ledger.clone(),
                registry.clone(),
                crypto.clone(),
                packager.clone(),
                target,
                clock.clone(),
            ),
            running: Mutex::new(HashMap::new()),
            cancel_tokens: DashMap::new(),
            tasks: Mutex::new(HashMap::new()),
            shutdown: CancellationToken::new(),
            last_tick: Mutex::new(clock.now()),
            queue_tx,
            queue_rx: Mutex::new(Some(queue_rx)),
            worker: Mutex::new(None),
            config,
            clock,
            ledger,
            registry,
            crypto,
            packager,
        }))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Start the worker that runs scheduled tasks queued by [`tick`](Self::tick).
    pub async fn init(self: &Arc<Self>) {
        let Some(mut rx) = self.queue_rx.lock().await.take() else {
            warn!("Backup engine already initialised");
            return;
        };

        let engine = self.clone();
        let shutdown = self.shutdown.clone();
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    task = rx.recv() => {
                        let Some(task) = task else { break };
                        if let Err(e) = engine.run_task(task).await {
                            error!(task = %task, error = %e, "Scheduled task failed");
                        }
                    }
                }
            }
            debug!("Scheduled task worker stopped");
        });
        *self.worker.lock().await = Some(handle);
        info!(enabled = self.config.engine.enabled, "Backup engine initialised");
    }

    /// Cancel in-flight jobs and wait for every background task.
    pub async fn shutdown(&self) {
        info!("Shutting down backup engine");
        self.shutdown.cancel();

        if let Some(worker) = self.worker.lock().await.take() {
            if let Err(e) = worker.await {
                warn!(error = %e, "Task worker ended abnormally");
            }
        }

        let handles: Vec<_> = self.tasks.lock().await.drain().collect();
        for (job_id, handle) in handles {
            if let Err(e) = handle.await {
                warn!(job_id = %job_id, error = %e, "Backup task ended abnormally");
            }
        }
    }

    // ── Destinations ──

    pub async fn register_destination(&self, destination: Destination, adapter: Arc<dyn DestinationAdapter>) {
        info!(destination_id = %destination.id, kind = %destination.kind, priority = destination.priority, "Destination registered");
        self.registry.register(destination, adapter).await;
    }

    pub async fn update_destination(&self, destination: Destination) -> Result<()> {
        self.registry.update(destination).await
    }

    pub async fn list_destinations(&self) -> Vec<Destination> {
        self.registry.list().await
    }

    // ── Job control ──

    pub async fn start_backup(self: &Arc<Self>, job_type: JobType) -> Result<String> {
        if !self.config.engine.enabled {
            return Err(EngineError::Config("backup engine is disabled".into()));
        }
        if self.shutdown.is_cancelled() {
            return Err(EngineError::Config("backup engine is shutting down".into()));
        }

        // The slot map is never held across destination probes.
        ensure_slot_free(&*self.running.lock().await, job_type)?;
        self.check_capacity(job_type).await?;
        let targets = self.reachable_targets().await?;

        let mut running = self.running.lock().await;
        ensure_slot_free(&running, job_type)?;

        let job_id = Uuid::new_v4().to_string();
        self.ledger
            .insert(BackupJob::new(job_id.clone(), job_type, self.clock.now()))
            .await;
        let states = targets
            .iter()
            .map(|t| DestinationState::pending(&t.destination.id, t.destination.priority))
            .collect();
        self.update(&job_id, JobUpdate::Destinations(states)).await?;

        let cancel = self.shutdown.child_token();
        self.cancel_tokens.insert(job_id.clone(), cancel.clone());
        running.insert(job_type, job_id.clone());

        let engine = self.clone();
        let task_job_id = job_id.clone();
        let handle = tokio::spawn(async move {
            engine.run_job(task_job_id, job_type, targets, cancel).await;
        });

        let mut tasks = self.tasks.lock().await;
        tasks.retain(|_, h| !h.is_finished());
        tasks.insert(job_id.clone(), handle);

        info!(job_id = %job_id, job_type = %job_type, "Backup job queued");
        Ok(job_id)
    }

    pub async fn get_job(&self, job_id: &str) -> Result<BackupJob> {
        self.ledger
            .get(job_id)
            .await
            .ok_or_else(|| EngineError::JobNotFound(job_id.to_string()))
    }

    /// Newest first.
    pub async fn list_jobs(&self, limit: usize) -> Vec<BackupJob> {
        self.ledger.list(limit).await
    }

    /// Returns `false` when the job is past the point where it can be cancelled.
    pub async fn cancel_backup(&self, job_id: &str) -> Result<bool> {
        match self
            .ledger
            .apply(job_id, JobUpdate::Status(JobStatus::Cancelled), self.clock.now())
            .await
        {
            Ok(_) => {
                if let Some(token) = self.cancel_tokens.get(job_id) {
                    token.cancel();
                }
                info!(job_id = %job_id, "Backup cancelled by operator");
                Ok(true)
            }
            Err(EngineError::InvalidTransition { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Wait for a job's background task, including redundant uploads.
    pub async fn wait_for_job(&self, job_id: &str) -> Result<BackupJob> {
        let handle = self.tasks.lock().await.remove(job_id);
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(job_id = %job_id, error = %e, "Backup task ended abnormally");
            }
        }
        self.get_job(job_id).await
    }

    pub async fn get_stats(&self) -> EngineStats {
        let jobs = self.ledger.all().await;
        let successful: Vec<&BackupJob> = jobs.iter().filter(|j| j.status.is_successful()).collect();
        let durations: Vec<i64> = successful.iter().filter_map(|j| j.duration_ms).collect();
        let avg_duration = if durations.is_empty() {
            0.0
        } else {
            durations.iter().sum::<i64>() as f64 / durations.len() as f64
        };

        EngineStats {
            total_jobs: jobs.len(),
            successful_jobs: successful.len(),
            failed_jobs: jobs.iter().filter(|j| j.status == JobStatus::Failed).count(),
            total_bytes_backed_up: successful.iter().map(|j| j.compressed_size).sum(),
            avg_duration,
            last_backup_at: successful.iter().filter_map(|j| j.completed_at).max(),
            next_scheduled_at: self.schedule.next_backup_after(self.clock.now()),
        }
    }

    /// Destination connectivity, an encryption round trip and a capacity check.
    pub async fn test_system(&self) -> SystemTestReport {
        let mut diagnostics = Vec::new();

        let destinations = self.registry.active().await;
        if destinations.is_empty() {
            diagnostics.push(Diagnostic {
                check: "destinations".into(),
                success: false,
                message: "no active destinations registered".into(),
            });
        }
        for target in destinations {
            let reachable = self.probe(&target).await;
            diagnostics.push(Diagnostic {
                check: format!("destination:{}", target.destination.id),
                success: reachable,
                message: if reachable { "reachable" } else { "unreachable" }.into(),
            });
        }

        let probe = b"backup-engine self test";
        let crypto = self
            .crypto
            .key_for_window(self.clock.now())
            .and_then(|key_id| {
                let sealed = self.crypto.encrypt(probe, &key_id)?;
                self.crypto.decrypt(&sealed.ciphertext, &key_id, &sealed.iv)
            });
        diagnostics.push(match crypto {
            Ok(plain) if plain == probe => Diagnostic {
                check: "encryption".into(),
                success: true,
                message: "round trip ok".into(),
            },
            Ok(_) => Diagnostic {
                check: "encryption".into(),
                success: false,
                message: "round trip returned different bytes".into(),
            },
            Err(e) => Diagnostic {
                check: "encryption".into(),
                success: false,
                message: e.to_string(),
            },
        });

        diagnostics.push(match self.check_capacity(JobType::Full).await {
            Ok(available) => Diagnostic {
                check: "capacity".into(),
                success: true,
                message: format!("{} available", format_bytes(available)),
            },
            Err(e) => Diagnostic {
                check: "capacity".into(),
                success: false,
                message: e.to_string(),
            },
        });

        SystemTestReport {
            success: diagnostics.iter().all(|d| d.success),
            diagnostics,
        }
    }

    // ── Scheduling ──

    /// Queue every task due since the previous tick and return them.
    pub async fn tick(&self, now: DateTime<Utc>) -> Vec<ScheduledTask> {
        let mut last = self.last_tick.lock().await;
        if now <= *last {
            return Vec::new();
        }
        let due = self.schedule.due_between(*last, now);
        *last = now;

        for task in &due {
            debug!(task = %task, "Scheduled task due");
            if self.queue_tx.send(*task).is_err() {
                warn!(task = %task, "Task queue closed, dropping scheduled task");
            }
        }
        due
    }

    pub async fn run_task(self: &Arc<Self>, task: ScheduledTask) -> Result<()> {
        match task {
            ScheduledTask::Backup(job_type) => match self.start_backup(job_type).await {
                Ok(_) => Ok(()),
                Err(EngineError::AlreadyRunning { job_id, .. }) => {
                    info!(job_type = %job_type, job_id = %job_id, "Scheduled backup coalesced with running job");
                    Ok(())
                }
                Err(e) => Err(e),
            },
            ScheduledTask::RetentionSweep => {
                self.run_retention().await;
                Ok(())
            }
            ScheduledTask::Verification => {
                self.run_verification().await;
                Ok(())
            }
        }
    }

    pub async fn run_retention(&self) -> Vec<String> {
        let pruned = self
            .retention
            .sweep(&self.ledger, &self.registry, self.clock.now())
            .await;
        info!(pruned = pruned.len(), "Retention sweep finished");
        pruned
    }

    pub async fn run_verification(&self) -> VerificationReport {
        let report = self.verifier.verify_recent(self.config.verify.sample_size).await;
        info!(
            checked = report.checked,
            verified = report.verified.len(),
            failed = report.failed.len(),
            "Verification pass finished"
        );
        report
    }

    // ── Restore ──

    pub async fn request_restore(&self, request: RestoreRequest) -> Result<String> {
        self.restores.request_restore(request).await
    }

    pub async fn get_restore(&self, restore_id: &str) -> Result<RestoreOutcome> {
        self.restores
            .get_restore(restore_id)
            .await
            .ok_or_else(|| EngineError::RestoreNotFound(restore_id.to_string()))
    }

    // ── Internals ──

    async fn update(&self, job_id: &str, update: JobUpdate) -> Result<BackupJob> {
        self.ledger.apply(job_id, update, self.clock.now()).await
    }

    /// Returns the bytes still available when the estimate fits.
    async fn check_capacity(&self, job_type: JobType) -> Result<u64> {
        let successful = self.ledger.successful().await;
        let estimated = estimate_size(&successful, job_type, self.config.storage.estimate_history);
        let used: u64 = successful.iter().map(|j| j.compressed_size).sum();
        let available = self.config.storage.capacity_bytes.saturating_sub(used);
        if estimated > available {
            warn!(estimated, available, "Insufficient backup capacity");
            return Err(EngineError::Capacity {
                estimated,
                available,
            });
        }
        Ok(available)
    }

    async fn probe(&self, target: &UploadTarget) -> bool {
        match tokio::time::timeout(self.config.upload.probe_timeout(), target.adapter.probe()).await {
            Ok(reachable) => reachable,
            Err(_) => {
                warn!(destination_id = %target.destination.id, "Destination probe timed out");
                false
            }
        }
    }

    async fn reachable_targets(&self) -> Result<Vec<UploadTarget>> {
        let active = self.registry.active().await;
        let probes = futures_util::future::join_all(active.iter().map(|t| self.probe(t))).await;

        let mut reachable = Vec::with_capacity(active.len());
        for (target, ok) in active.into_iter().zip(probes) {
            if ok {
                reachable.push(target);
            } else {
                warn!(destination_id = %target.destination.id, "Destination unreachable, excluded from job");
            }
        }
        if reachable.is_empty() {
            return Err(EngineError::EmptyDestinationSet);
        }
        Ok(reachable)
    }

    /// Latest collection start among successful jobs of any type. Records
    /// written while that job was still running fall after the cutoff.
    async fn baseline_for(&self, job_type: JobType) -> Option<DateTime<Utc>> {
        if job_type != JobType::Incremental {
            return None;
        }
        self.ledger
            .successful()
            .await
            .iter()
            .filter_map(|j| j.metadata.collected_at.or(j.completed_at))
            .max()
    }

    async fn run_job(
        self: Arc<Self>,
        job_id: String,
        job_type: JobType,
        targets: Vec<UploadTarget>,
        cancel: CancellationToken,
    ) {
        let result = self.execute_pipeline(&job_id, job_type, targets, &cancel).await;
        let uploads = match result {
            Ok(uploads) => Some(uploads),
            Err(e) => {
                self.fail_job(&job_id, &e).await;
                None
            }
        };

        {
            let mut running = self.running.lock().await;
            if running.get(&job_type) == Some(&job_id) {
                running.remove(&job_type);
            }
        }

        if let Some(uploads) = uploads {
            match uploads.await {
                Ok(summary) => self.record_redundancy_failures(&job_id, &summary).await,
                Err(e) => warn!(job_id = %job_id, error = %e, "Upload task ended abnormally"),
            }
        }
        self.cancel_tokens.remove(&job_id);
    }

    /// Runs every phase up to completion. The returned handle belongs to the
    /// uploads still in flight to the remaining destinations.
    async fn execute_pipeline(
        &self,
        job_id: &str,
        job_type: JobType,
        targets: Vec<UploadTarget>,
        cancel: &CancellationToken,
    ) -> Result<JoinHandle<UploadSummary>> {
        self.update(job_id, JobUpdate::Status(JobStatus::Running)).await?;
        info!(job_id = %job_id, job_type = %job_type, destinations = targets.len(), "Backup started");

        ensure_live(job_id, cancel)?;
        self.update(job_id, JobUpdate::Phase(Phase::Collecting)).await?;
        let cutoff = self.baseline_for(job_type).await;
        let snapshot = self
            .collector
            .collect_since(cutoff, &self.config.engine.data_types, self.clock.now())
            .await?;
        self.update(
            job_id,
            JobUpdate::Collected {
                record_count: snapshot.record_count(),
                data_types: snapshot.data_types(),
                tenant_ids: snapshot.tenant_ids(),
                cutoff,
                collected_at: snapshot.created_at,
            },
        )
        .await?;

        ensure_live(job_id, cancel)?;
        self.update(job_id, JobUpdate::Phase(Phase::Compressing)).await?;
        let packed = self.packager.pack(&snapshot)?;
        self.update(
            job_id,
            JobUpdate::Packed {
                uncompressed_size: packed.uncompressed_size,
                compressed_size: packed.bytes.len() as u64,
                compression_ratio: packed.compression_ratio,
                content_hash: sha256_hex(&packed.bytes),
            },
        )
        .await?;

        ensure_live(job_id, cancel)?;
        self.update(job_id, JobUpdate::Phase(Phase::Encrypting)).await?;
        let key_id = self.crypto.key_for_window(self.clock.now())?;
        let sealed = self.crypto.encrypt(&packed.bytes, &key_id)?;
        let integrity_hash = sealed.integrity_hash.clone();
        self.update(
            job_id,
            JobUpdate::Sealed {
                key_id,
                iv: sealed.iv_base64(),
                integrity_hash: integrity_hash.clone(),
            },
        )
        .await?;

        ensure_live(job_id, cancel)?;
        self.update(job_id, JobUpdate::Phase(Phase::Uploading)).await?;
        let payload = Bytes::from(sealed.ciphertext);
        let total = payload.len() as u64;
        self.update(job_id, JobUpdate::Bytes { processed: 0, total }).await?;

        let (tx, rx) = oneshot::channel();
        let uploads = {
            let uploader = self.uploader.clone();
            let job_id = job_id.to_string();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                uploader
                    .upload_all(&job_id, payload, &integrity_hash, targets, cancel, tx)
                    .await
            })
        };

        let first = tokio::select! {
            first = rx => first.ok(),
            _ = cancel.cancelled() => {
                if let Err(e) = uploads.await {
                    warn!(job_id = %job_id, error = %e, "Upload task ended abnormally");
                }
                return Err(EngineError::Cancelled(job_id.to_string()));
            }
        };

        let Some(destination_id) = first else {
            match uploads.await {
                Ok(summary) => {
                    for (destination_id, error) in summary.failed() {
                        let entry = ErrorEntry::new(
                            self.clock.now(),
                            Severity::Error,
                            "destination_failed",
                            format!("{destination_id}: {error}"),
                        );
                        self.update(job_id, JobUpdate::Error(entry)).await?;
                    }
                }
                Err(e) => warn!(job_id = %job_id, error = %e, "Upload task ended abnormally"),
            }
            return Err(EngineError::AllDestinationsFailed(job_id.to_string()));
        };

        self.update(job_id, JobUpdate::Bytes { processed: total, total }).await?;
        self.update(job_id, JobUpdate::Phase(Phase::Verifying)).await?;
        self.update(job_id, JobUpdate::Status(JobStatus::Completed)).await?;
        let job = self.update(job_id, JobUpdate::Phase(Phase::Completed)).await?;

        info!(
            job_id = %job_id,
            job_type = %job_type,
            destination_id = %destination_id,
            records = job.record_count,
            size = %format_bytes(job.compressed_size),
            duration = %format_duration((job.duration_ms.unwrap_or_default().max(0) / 1000) as u64),
            "Backup completed"
        );
        Ok(uploads)
    }

    async fn fail_job(&self, job_id: &str, cause: &EngineError) {
        let Some(job) = self.ledger.get(job_id).await else {
            return;
        };

        if job.status == JobStatus::Cancelled {
            info!(job_id = %job_id, "Backup stopped after cancellation");
            return;
        }
        if matches!(cause, EngineError::Cancelled(_)) {
            if let Err(e) = self.update(job_id, JobUpdate::Status(JobStatus::Cancelled)).await {
                warn!(job_id = %job_id, error = %e, "Could not mark job cancelled");
            }
            info!(job_id = %job_id, "Backup cancelled during shutdown");
            return;
        }

        error!(job_id = %job_id, error = %cause, "Backup failed");
        let entry = ErrorEntry::new(self.clock.now(), Severity::Critical, cause.reason_code(), cause.to_string());
        for update in [JobUpdate::Error(entry), JobUpdate::Status(JobStatus::Failed)] {
            if let Err(e) = self.update(job_id, update).await {
                warn!(job_id = %job_id, error = %e, "Could not record job failure");
            }
        }
    }

    async fn record_redundancy_failures(&self, job_id: &str, summary: &UploadSummary) {
        for (destination_id, error) in summary.failed() {
            warn!(job_id = %job_id, destination_id = %destination_id, "Redundant copy missing");
            let entry = ErrorEntry::new(
                self.clock.now(),
                Severity::Warning,
                "destination_failed",
                format!("{destination_id}: {error}"),
            );
            if let Err(e) = self.update(job_id, JobUpdate::Error(entry)).await {
                warn!(job_id = %job_id, error = %e, "Could not record destination failure");
            }
        }
    }
}

fn ensure_slot_free(running: &HashMap<JobType, String>, job_type: JobType) -> Result<()> {
    match running.get(&job_type) {
        Some(job_id) => Err(EngineError::AlreadyRunning {
            job_type,
            job_id: job_id.clone(),
        }),
        None => Ok(()),
    }
}

fn ensure_live(job_id: &str, cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(EngineError::Cancelled(job_id.to_string()));
    }
    Ok(())
}

/// Average stored size of the most recent successful jobs of `job_type`,
/// falling back to jobs of any type. `jobs` must be newest first.
fn estimate_size(jobs: &[BackupJob], job_type: JobType, history: usize) -> u64 {
    fn average<'a>(sizes: impl Iterator<Item = &'a BackupJob>, history: usize) -> Option<u64> {
        let sizes: Vec<u64> = sizes.take(history).map(|j| j.compressed_size).collect();
        if sizes.is_empty() {
            None
        } else {
            Some(sizes.iter().sum::<u64>() / sizes.len() as u64)
        }
    }

    average(jobs.iter().filter(|j| j.job_type == job_type), history)
        .or_else(|| average(jobs.iter(), history))
        .unwrap_or(0)
}
