//! Retention sweep.
//!
//! Successful jobs older than the bucket for their type leave the ledger.
//! Remote copies are deleted best-effort; a destination that refuses the
//! delete is logged and the prune still stands.

use crate::config::RetentionPolicy;
use crate::ledger::JobLedger;
use crate::models::BackupJob;
use crate::registry::DestinationRegistry;
use chrono::{DateTime, Utc};
use tracing::{info, warn};

pub struct RetentionSweeper {
    policy: RetentionPolicy,
}

impl RetentionSweeper {
    pub fn new(policy: RetentionPolicy) -> Self {
        Self { policy }
    }

    pub fn is_expired(&self, job: &BackupJob, now: DateTime<Utc>) -> bool {
        job.status.is_successful()
            && job
                .age_days(now)
                .is_some_and(|age| age > self.policy.retention_days(job.job_type))
    }

    /// Prune expired jobs and return their ids.
    pub async fn sweep(
        &self,
        ledger: &JobLedger,
        registry: &DestinationRegistry,
        now: DateTime<Utc>,
    ) -> Vec<String> {
        let expired: Vec<BackupJob> = ledger
            .successful()
            .await
            .into_iter()
            .filter(|job| self.is_expired(job, now))
            .collect();

        let mut pruned = Vec::with_capacity(expired.len());
        for job in expired {
            for state in job.restore_candidates() {
                let Some(adapter) = registry.adapter(&state.destination_id).await else {
                    warn!(job_id = %job.id, destination_id = %state.destination_id, "Destination no longer registered, skipping remote delete");
                    continue;
                };
                if let Err(e) = adapter.delete(&job.id).await {
                    warn!(job_id = %job.id, destination_id = %state.destination_id, error = %e, "Remote delete failed");
                }
            }

            if ledger.remove(&job.id).await.is_some() {
                info!(
                    job_id = %job.id,
                    job_type = %job.job_type,
                    age_days = job.age_days(now).unwrap_or_default(),
                    "Pruned expired backup"
                );
                pruned.push(job.id);
            }
        }
        pruned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Destination, DestinationState, DestinationStatus, JobStatus, JobType};
    use crate::testing::MemoryDestination;
    use chrono::Duration;
    use std::sync::Arc;

    fn completed(id: &str, job_type: JobType, completed_at: DateTime<Utc>, dest: &str) -> BackupJob {
        let mut job = BackupJob::new(id.into(), job_type, completed_at);
        job.status = JobStatus::Completed;
        job.completed_at = Some(completed_at);
        let mut state = DestinationState::pending(dest, 0);
        state.status = DestinationStatus::Completed;
        job.destinations.push(state);
        job
    }

    #[tokio::test]
    async fn test_incremental_older_than_daily_is_pruned() {
        let now = Utc::now();
        let ledger = JobLedger::new();
        ledger.insert(completed("old", JobType::Incremental, now - Duration::days(8), "d1")).await;
        ledger.insert(completed("young", JobType::Incremental, now - Duration::days(6), "d1")).await;
        ledger.insert(completed("full", JobType::Full, now - Duration::days(8), "d1")).await;

        let registry = DestinationRegistry::new();
        let dest = Arc::new(MemoryDestination::new());
        registry.register(Destination::new("d1", "memory", "mem://d1", 0), dest.clone()).await;

        let sweeper = RetentionSweeper::new(RetentionPolicy::default());
        let pruned = sweeper.sweep(&ledger, &registry, now).await;

        assert_eq!(pruned, vec!["old".to_string()]);
        assert!(ledger.get("old").await.is_none());
        assert!(ledger.get("young").await.is_some());
        assert!(ledger.get("full").await.is_some());
        assert_eq!(dest.deleted(), vec!["old".to_string()]);
    }

    #[tokio::test]
    async fn test_failed_jobs_are_left_alone() {
        let now = Utc::now();
        let mut job = BackupJob::new("failed".into(), JobType::Incremental, now - Duration::days(30));
        job.status = JobStatus::Failed;
        let sweeper = RetentionSweeper::new(RetentionPolicy::default());
        assert!(!sweeper.is_expired(&job, now));
    }

    #[tokio::test]
    async fn test_unregistered_destination_does_not_block_prune() {
        let now = Utc::now();
        let ledger = JobLedger::new();
        ledger.insert(completed("old", JobType::Incremental, now - Duration::days(10), "gone")).await;
        let sweeper = RetentionSweeper::new(RetentionPolicy::default());
        let pruned = sweeper.sweep(&ledger, &DestinationRegistry::new(), now).await;
        assert_eq!(pruned.len(), 1);
    }
}
