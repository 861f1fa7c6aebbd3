use backup_engine::BackupEngine;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};

/// Drives the engine's schedule evaluator from wall-clock cron ticks. The
/// engine decides which backups, sweeps and verifications are due.
pub struct BackupScheduler {
    scheduler: Mutex<JobScheduler>,
    engine: Arc<BackupEngine>,
}

impl BackupScheduler {
    pub async fn new(engine: Arc<BackupEngine>) -> anyhow::Result<Self> {
        let scheduler = JobScheduler::new().await?;
        Ok(Self {
            scheduler: Mutex::new(scheduler),
            engine,
        })
    }

    pub async fn schedule_ticks(&self, cron_expression: &str) -> anyhow::Result<()> {
        let engine = self.engine.clone();

        let job = Job::new_async(cron_expression, move |_uuid, _lock| {
            let engine = engine.clone();
            Box::pin(async move {
                let due = engine.tick(Utc::now()).await;
                if !due.is_empty() {
                    tracing::info!(tasks = due.len(), "Scheduled tasks queued");
                }
            })
        })?;

        self.scheduler.lock().await.add(job).await?;
        tracing::info!(cron = %cron_expression, "Engine tick scheduled");
        Ok(())
    }

    pub async fn start(&self) -> anyhow::Result<()> {
        self.scheduler.lock().await.start().await?;
        Ok(())
    }

    pub async fn shutdown(&self) -> anyhow::Result<()> {
        self.scheduler.lock().await.shutdown().await?;
        Ok(())
    }
}
