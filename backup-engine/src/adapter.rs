//! Collaborator boundaries.
//!
//! Concrete object stores, the application database and the restore writer
//! live outside the engine. Implementations return `anyhow::Result`; the engine
//! classifies their failures.

use crate::models::{DataType, Record, RestoreScope};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};

/// A storage target for encrypted snapshots.
#[async_trait]
pub trait DestinationAdapter: Send + Sync {
    /// Whether the destination currently accepts traffic.
    async fn probe(&self) -> bool;

    /// Store `payload` under `job_id` and return the hex SHA-256 the
    /// destination computed over what it received.
    async fn upload(&self, job_id: &str, payload: Bytes) -> anyhow::Result<String>;

    async fn download(&self, job_id: &str) -> anyhow::Result<Bytes>;

    async fn delete(&self, job_id: &str) -> anyhow::Result<()>;
}

/// Read side of the application's record stores.
#[async_trait]
pub trait DataSource: Send + Sync {
    async fn collect_all(&self, data_type: DataType) -> anyhow::Result<Vec<Record>>;

    /// Records whose `updated_at` is strictly after `cutoff`.
    async fn collect_modified_since(
        &self,
        data_type: DataType,
        cutoff: DateTime<Utc>,
    ) -> anyhow::Result<Vec<Record>>;
}

/// Write side used by restores. Writes must upsert by record id.
#[async_trait]
pub trait RestoreTarget: Send + Sync {
    async fn write(
        &self,
        scope: &RestoreScope,
        data_type: DataType,
        records: Vec<Record>,
    ) -> anyhow::Result<usize>;
}
