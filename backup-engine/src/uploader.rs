//! Fan-out of one encrypted snapshot to every reachable destination.

use crate::clock::Clock;
use crate::config::UploadConfig;
use crate::ledger::{DestinationUpdate, JobLedger, JobUpdate};
use crate::registry::UploadTarget;
use crate::retry::{RetryOutcome, RetryPolicy};
use crate::utils::EngineError;
use bytes::Bytes;
use futures_util::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Final state of one destination's upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DestinationOutcome {
    Completed { attempts: u32 },
    Failed { attempts: u32, error: String },
    Cancelled { attempts: u32 },
}

#[derive(Debug, Default)]
pub struct UploadSummary {
    pub outcomes: Vec<(String, DestinationOutcome)>,
}

impl UploadSummary {
    pub fn succeeded(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, DestinationOutcome::Completed { .. }))
            .count()
    }

    pub fn failed(&self) -> impl Iterator<Item = (&str, &str)> {
        self.outcomes.iter().filter_map(|(id, o)| match o {
            DestinationOutcome::Failed { error, .. } => Some((id.as_str(), error.as_str())),
            _ => None,
        })
    }
}

#[derive(Clone)]
pub struct DestinationUploader {
    ledger: Arc<JobLedger>,
    clock: Arc<dyn Clock>,
    config: UploadConfig,
}

impl DestinationUploader {
    pub fn new(ledger: Arc<JobLedger>, clock: Arc<dyn Clock>, config: UploadConfig) -> Self {
        Self {
            ledger,
            clock,
            config,
        }
    }

    /// Upload `payload` to all targets concurrently.
    ///
    /// `first_success` fires with the destination id as soon as one target
    /// holds a verified copy; the call itself returns only once every target
    /// has settled. If no target succeeds the sender is dropped unsent.
    pub async fn upload_all(
        &self,
        job_id: &str,
        payload: Bytes,
        expected_hash: &str,
        mut targets: Vec<UploadTarget>,
        cancel: CancellationToken,
        first_success: oneshot::Sender<String>,
    ) -> UploadSummary {
        targets.sort_by_key(|t| t.destination.priority);

        let mut pending: FuturesUnordered<_> = targets
            .into_iter()
            .map(|target| {
                let payload = payload.clone();
                let cancel = cancel.clone();
                async move {
                    let id = target.destination.id.clone();
                    let outcome = self
                        .upload_one(job_id, &target, payload, expected_hash, &cancel)
                        .await;
                    (id, outcome)
                }
            })
            .collect();

        let mut first_success = Some(first_success);
        let mut summary = UploadSummary::default();
        while let Some((destination_id, outcome)) = pending.next().await {
            if matches!(outcome, DestinationOutcome::Completed { .. }) {
                if let Some(tx) = first_success.take() {
                    let _ = tx.send(destination_id.clone());
                }
            }
            summary.outcomes.push((destination_id, outcome));
        }

        if summary.succeeded() == 0 {
            error!(job_id = %job_id, "Every destination exhausted its retries");
        }
        summary
    }

    async fn upload_one(
        &self,
        job_id: &str,
        target: &UploadTarget,
        payload: Bytes,
        expected_hash: &str,
        cancel: &CancellationToken,
    ) -> DestinationOutcome {
        let destination_id = target.destination.id.as_str();
        let size = payload.len() as u64;
        self.record(job_id, destination_id, DestinationUpdate::Uploading).await;

        let policy = RetryPolicy::from_config(target.destination.max_retries, &self.config);
        let outcome = policy
            .run(cancel, |_attempt| {
                let adapter = target.adapter.clone();
                let payload = payload.clone();
                async move {
                    let result = match adapter.upload(job_id, payload).await {
                        Ok(actual) if actual.eq_ignore_ascii_case(expected_hash) => Ok(()),
                        Ok(actual) => Err(EngineError::Integrity {
                            destination_id: destination_id.to_string(),
                            expected: expected_hash.to_string(),
                            actual,
                        }),
                        Err(e) => Err(EngineError::Connectivity {
                            destination_id: destination_id.to_string(),
                            message: format!("{e:#}"),
                        }),
                    };
                    if let Err(e) = &result {
                        self.record(
                            job_id,
                            destination_id,
                            DestinationUpdate::AttemptFailed { error: e.to_string() },
                        )
                        .await;
                    }
                    result
                }
            })
            .await;

        match outcome {
            RetryOutcome::Succeeded { attempts, .. } => {
                info!(job_id = %job_id, destination_id = %destination_id, attempts, "Upload completed");
                self.record(
                    job_id,
                    destination_id,
                    DestinationUpdate::Completed { uploaded_bytes: size },
                )
                .await;
                DestinationOutcome::Completed { attempts }
            }
            RetryOutcome::Exhausted {
                attempts,
                last_error,
            } => {
                error!(
                    job_id = %job_id,
                    destination_id = %destination_id,
                    attempts,
                    error = %last_error,
                    "Upload retries exhausted"
                );
                let error = last_error.to_string();
                self.record(
                    job_id,
                    destination_id,
                    DestinationUpdate::Failed { error: error.clone() },
                )
                .await;
                DestinationOutcome::Failed { attempts, error }
            }
            RetryOutcome::Cancelled { attempts } => {
                info!(job_id = %job_id, destination_id = %destination_id, "Upload cancelled");
                self.record(
                    job_id,
                    destination_id,
                    DestinationUpdate::Failed {
                        error: "cancelled".to_string(),
                    },
                )
                .await;
                DestinationOutcome::Cancelled { attempts }
            }
        }
    }

    async fn record(&self, job_id: &str, destination_id: &str, update: DestinationUpdate) {
        let update = JobUpdate::Destination {
            destination_id: destination_id.to_string(),
            update,
        };
        if let Err(e) = self.ledger.apply(job_id, update, self.clock.now()).await {
            warn!(job_id = %job_id, destination_id = %destination_id, error = %e, "Failed to record destination state");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::crypto::sha256_hex;
    use crate::models::{BackupJob, Destination, DestinationState, DestinationStatus, JobType};
    use crate::testing::MemoryDestination;
    use chrono::Utc;
    use std::time::Duration;

    fn fast_config() -> UploadConfig {
        UploadConfig {
            base_delay_ms: 1,
            max_delay_ms: 4,
            ..UploadConfig::default()
        }
    }

    fn target(id: &str, priority: u32, adapter: Arc<MemoryDestination>) -> UploadTarget {
        UploadTarget {
            destination: Destination::new(id, "memory", &format!("mem://{id}"), priority),
            adapter,
        }
    }

    async fn setup(ids: &[(&str, u32)]) -> (Arc<JobLedger>, DestinationUploader) {
        let ledger = Arc::new(JobLedger::new());
        let mut job = BackupJob::new("job-1".into(), JobType::Full, Utc::now());
        job.destinations = ids
            .iter()
            .map(|(id, p)| DestinationState::pending(id, *p))
            .collect();
        ledger.insert(job).await;
        let uploader = DestinationUploader::new(ledger.clone(), Arc::new(SystemClock), fast_config());
        (ledger, uploader)
    }

    #[tokio::test]
    async fn test_one_failing_destination_does_not_block_the_other() {
        let (ledger, uploader) = setup(&[("primary", 0), ("secondary", 1)]).await;
        let primary = Arc::new(MemoryDestination::always_failing());
        let secondary = Arc::new(MemoryDestination::new());
        let payload = Bytes::from_static(b"ciphertext");
        let hash = sha256_hex(&payload);
        let (tx, rx) = oneshot::channel();

        let summary = uploader
            .upload_all(
                "job-1",
                payload,
                &hash,
                vec![target("primary", 0, primary.clone()), target("secondary", 1, secondary.clone())],
                CancellationToken::new(),
                tx,
            )
            .await;

        assert_eq!(rx.await.unwrap(), "secondary");
        assert_eq!(summary.succeeded(), 1);
        assert_eq!(primary.upload_attempts(), 3);
        assert_eq!(secondary.upload_attempts(), 1);

        let job = ledger.get("job-1").await.unwrap();
        let primary_state = job.destination("primary").unwrap();
        assert_eq!(primary_state.status, DestinationStatus::Failed);
        assert_eq!(primary_state.retry_count, 3);
        assert_eq!(job.destination("secondary").unwrap().status, DestinationStatus::Completed);
    }

    #[tokio::test]
    async fn test_hash_mismatch_counts_as_failed_attempt() {
        let (ledger, uploader) = setup(&[("lossy", 0)]).await;
        let lossy = Arc::new(MemoryDestination::new());
        lossy.set_corrupt_hash(true);
        let payload = Bytes::from_static(b"ciphertext");
        let (tx, rx) = oneshot::channel();

        let summary = uploader
            .upload_all(
                "job-1",
                payload.clone(),
                &sha256_hex(&payload),
                vec![target("lossy", 0, lossy.clone())],
                CancellationToken::new(),
                tx,
            )
            .await;

        assert!(rx.await.is_err());
        assert_eq!(summary.succeeded(), 0);
        assert_eq!(lossy.upload_attempts(), 3);
        let (_, error) = summary.failed().next().unwrap();
        assert!(error.contains("Integrity mismatch"));
        let job = ledger.get("job-1").await.unwrap();
        assert_eq!(job.destinations[0].status, DestinationStatus::Failed);
    }

    #[tokio::test]
    async fn test_transient_failure_recovers() {
        let (ledger, uploader) = setup(&[("flaky", 0)]).await;
        let flaky = Arc::new(MemoryDestination::failing_times(2));
        let payload = Bytes::from_static(b"ciphertext");
        let (tx, rx) = oneshot::channel();

        uploader
            .upload_all(
                "job-1",
                payload.clone(),
                &sha256_hex(&payload),
                vec![target("flaky", 0, flaky.clone())],
                CancellationToken::new(),
                tx,
            )
            .await;

        assert_eq!(rx.await.unwrap(), "flaky");
        let job = ledger.get("job-1").await.unwrap();
        assert_eq!(job.destinations[0].retry_count, 2);
        assert_eq!(job.destinations[0].uploaded_bytes, 10);
    }

    #[tokio::test]
    async fn test_first_success_fires_before_slow_destination_settles() {
        let (_ledger, uploader) = setup(&[("fast", 1), ("slow", 0)]).await;
        let fast = Arc::new(MemoryDestination::new());
        let slow = Arc::new(MemoryDestination::new().with_delay(Duration::from_millis(200)));
        let payload = Bytes::from_static(b"ciphertext");
        let hash = sha256_hex(&payload);
        let (tx, rx) = oneshot::channel();

        let uploader = Arc::new(uploader);
        let task = {
            let uploader = uploader.clone();
            let targets = vec![target("fast", 1, fast.clone()), target("slow", 0, slow.clone())];
            tokio::spawn(async move {
                uploader
                    .upload_all("job-1", payload, &hash, targets, CancellationToken::new(), tx)
                    .await
            })
        };

        assert_eq!(rx.await.unwrap(), "fast");
        assert!(!slow.has_object("job-1"));
        let summary = task.await.unwrap();
        assert_eq!(summary.succeeded(), 2);
        assert!(slow.has_object("job-1"));
    }
}
