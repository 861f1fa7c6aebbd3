use crate::clock::Clock;
use crate::crypto::sha256_hex;
use crate::ledger::{JobLedger, JobUpdate};
use crate::models::{BackupJob, ErrorEntry, JobStatus, Severity};
use crate::registry::DestinationRegistry;
use crate::utils::{EngineError, Result};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Debug, Default, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationReport {
    pub checked: usize,
    pub verified: Vec<String>,
    pub failed: Vec<String>,
}

const FAILURE_PREFIX: &str = "verification failed";

/// Re-checks stored copies of recent completed jobs.
///
/// A failed check attaches a critical error to the job and leaves its
/// status at `Completed`. Jobs carrying an unresolved failure are left out of
/// later samples so they do not crowd out jobs that were never checked.
pub struct Verifier {
    ledger: Arc<JobLedger>,
    registry: Arc<DestinationRegistry>,
    clock: Arc<dyn Clock>,
}

impl Verifier {
    pub fn new(ledger: Arc<JobLedger>, registry: Arc<DestinationRegistry>, clock: Arc<dyn Clock>) -> Self {
        Self {
            ledger,
            registry,
            clock,
        }
    }

    pub async fn verify_recent(&self, sample_size: usize) -> VerificationReport {
        let jobs: Vec<BackupJob> = self
            .ledger
            .successful()
            .await
            .into_iter()
            .filter(|j| j.status == JobStatus::Completed && !has_open_failure(j))
            .take(sample_size)
            .collect();

        let mut report = VerificationReport {
            checked: jobs.len(),
            ..Default::default()
        };

        for job in jobs {
            match self.check(&job).await {
                Ok(destination_id) => match self.mark_verified(&job.id).await {
                    Ok(()) => {
                        info!(job_id = %job.id, destination_id = %destination_id, "Backup verified");
                        report.verified.push(job.id);
                    }
                    Err(e) => warn!(job_id = %job.id, error = %e, "Could not record verification"),
                },
                Err(e) => {
                    error!(job_id = %job.id, error = %e, "Backup verification failed");
                    let entry = ErrorEntry::new(
                        self.clock.now(),
                        Severity::Critical,
                        e.reason_code(),
                        format!("{FAILURE_PREFIX}: {e}"),
                    );
                    if let Err(e) = self.ledger.apply(&job.id, JobUpdate::Error(entry), self.clock.now()).await {
                        warn!(job_id = %job.id, error = %e, "Could not record verification failure");
                    }
                    report.failed.push(job.id);
                }
            }
        }
        report
    }

    /// Download from the best reachable copy and compare hashes. A copy that
    /// downloads but hashes wrong fails the check outright.
    async fn check(&self, job: &BackupJob) -> Result<String> {
        let expected = job
            .metadata
            .integrity_hash
            .as_deref()
            .ok_or_else(|| EngineError::Validation(format!("job {} has no integrity hash", job.id)))?;

        let mut last_error = None;
        for state in job.restore_candidates() {
            let Some(adapter) = self.registry.adapter(&state.destination_id).await else {
                continue;
            };
            match adapter.download(&job.id).await {
                Ok(bytes) => {
                    let actual = sha256_hex(&bytes);
                    if actual != expected {
                        return Err(EngineError::Integrity {
                            destination_id: state.destination_id.clone(),
                            expected: expected.to_string(),
                            actual,
                        });
                    }
                    return Ok(state.destination_id.clone());
                }
                Err(e) => {
                    warn!(job_id = %job.id, destination_id = %state.destination_id, error = %e, "Verification download failed");
                    last_error = Some(EngineError::Connectivity {
                        destination_id: state.destination_id.clone(),
                        message: format!("{e:#}"),
                    });
                }
            }
        }
        Err(last_error.unwrap_or_else(|| EngineError::AllDestinationsFailed(job.id.clone())))
    }

    async fn mark_verified(&self, job_id: &str) -> Result<()> {
        for status in [JobStatus::Verifying, JobStatus::Verified] {
            self.ledger
                .apply(job_id, JobUpdate::Status(status), self.clock.now())
                .await?;
        }
        Ok(())
    }
}

fn has_open_failure(job: &BackupJob) -> bool {
    job.errors
        .iter()
        .any(|e| !e.resolved && e.severity == Severity::Critical && e.message.starts_with(FAILURE_PREFIX))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::models::{Destination, DestinationState, DestinationStatus, JobType};
    use crate::testing::MemoryDestination;
    use crate::adapter::DestinationAdapter;
    use bytes::Bytes;
    use chrono::{Duration, Utc};

    async fn stored_job(ledger: &JobLedger, dest: &MemoryDestination, id: &str, age_hours: i64) {
        let payload = Bytes::from(format!("ciphertext-{id}"));
        let hash = dest.upload(id, payload).await.unwrap();
        let at = Utc::now() - Duration::hours(age_hours);
        let mut job = BackupJob::new(id.into(), JobType::Full, at);
        job.status = JobStatus::Completed;
        job.completed_at = Some(at);
        job.metadata.integrity_hash = Some(hash);
        let mut state = DestinationState::pending("d1", 0);
        state.status = DestinationStatus::Completed;
        job.destinations.push(state);
        ledger.insert(job).await;
    }

    async fn setup() -> (Arc<JobLedger>, Arc<MemoryDestination>, Verifier) {
        let ledger = Arc::new(JobLedger::new());
        let registry = Arc::new(DestinationRegistry::new());
        let dest = Arc::new(MemoryDestination::new());
        registry.register(Destination::new("d1", "memory", "mem://d1", 0), dest.clone()).await;
        let verifier = Verifier::new(ledger.clone(), registry, Arc::new(SystemClock));
        (ledger, dest, verifier)
    }

    #[tokio::test]
    async fn test_intact_copy_is_verified() {
        let (ledger, dest, verifier) = setup().await;
        stored_job(&ledger, &dest, "j1", 1).await;

        let report = verifier.verify_recent(5).await;
        assert_eq!(report.verified, vec!["j1".to_string()]);
        assert_eq!(ledger.get("j1").await.unwrap().status, JobStatus::Verified);
    }

    #[tokio::test]
    async fn test_corruption_raises_critical_error_but_keeps_status() {
        let (ledger, dest, verifier) = setup().await;
        stored_job(&ledger, &dest, "j1", 1).await;
        dest.corrupt_object("j1");

        let report = verifier.verify_recent(5).await;
        assert_eq!(report.failed, vec!["j1".to_string()]);

        let job = ledger.get("j1").await.unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        let entry = job.errors.last().unwrap();
        assert_eq!(entry.severity, Severity::Critical);
        assert_eq!(entry.code, "integrity_error");
        assert!(!entry.resolved);
    }

    #[tokio::test]
    async fn test_failed_job_is_not_rechecked_on_later_passes() {
        let (ledger, dest, verifier) = setup().await;
        stored_job(&ledger, &dest, "older", 24).await;
        stored_job(&ledger, &dest, "broken", 1).await;
        dest.corrupt_object("broken");

        let first = verifier.verify_recent(1).await;
        assert_eq!(first.failed, vec!["broken".to_string()]);

        let second = verifier.verify_recent(1).await;
        assert_eq!(second.verified, vec!["older".to_string()]);
        assert!(second.failed.is_empty());

        let third = verifier.verify_recent(1).await;
        assert_eq!(third.checked, 0);

        let broken = ledger.get("broken").await.unwrap();
        let critical = broken.errors.iter().filter(|e| e.severity == Severity::Critical).count();
        assert_eq!(critical, 1);
        assert_eq!(broken.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_samples_most_recent_jobs_only() {
        let (ledger, dest, verifier) = setup().await;
        stored_job(&ledger, &dest, "old", 48).await;
        stored_job(&ledger, &dest, "new", 1).await;

        let report = verifier.verify_recent(1).await;
        assert_eq!(report.checked, 1);
        assert_eq!(report.verified, vec!["new".to_string()]);
        assert_eq!(ledger.get("old").await.unwrap().status, JobStatus::Completed);
    }
}
