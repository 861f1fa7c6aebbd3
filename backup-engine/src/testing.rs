//! In-memory collaborators for unit tests.

use crate::adapter::{DataSource, DestinationAdapter, RestoreTarget};
use crate::crypto::sha256_hex;
use crate::models::{DataType, Record, RestoreScope};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

// ── MemorySource ──

#[derive(Default)]
pub struct MemorySource {
    records: Mutex<HashMap<DataType, Vec<Record>>>,
    fail: AtomicBool,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a record.
    pub fn put(&self, data_type: DataType, id: &str, tenant: Option<&str>, updated_at: DateTime<Utc>) {
        let record = Record {
            id: id.to_string(),
            data_type,
            tenant_id: tenant.map(String::from),
            updated_at,
            payload: json!({ "id": id, "rev": updated_at.timestamp() }),
        };
        let mut records = self.records.lock().unwrap();
        let list = records.entry(data_type).or_default();
        list.retain(|r| r.id != id);
        list.push(record);
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    fn read(&self, data_type: DataType, cutoff: Option<DateTime<Utc>>) -> anyhow::Result<Vec<Record>> {
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("database unavailable");
        }
        let records = self.records.lock().unwrap();
        Ok(records
            .get(&data_type)
            .map(|list| {
                list.iter()
                    .filter(|r| cutoff.map_or(true, |c| r.updated_at > c))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[async_trait]
impl DataSource for MemorySource {
    async fn collect_all(&self, data_type: DataType) -> anyhow::Result<Vec<Record>> {
        self.read(data_type, None)
    }

    async fn collect_modified_since(
        &self,
        data_type: DataType,
        cutoff: DateTime<Utc>,
    ) -> anyhow::Result<Vec<Record>> {
        self.read(data_type, Some(cutoff))
    }
}

// ── MemoryDestination ──

pub struct MemoryDestination {
    reachable: AtomicBool,
    /// Uploads left to fail; `u32::MAX` fails forever.
    failures_left: AtomicU32,
    corrupt_hash: AtomicBool,
    upload_delay: Mutex<Option<Duration>>,
    probe_delay: Mutex<Option<Duration>>,
    objects: Mutex<HashMap<String, Bytes>>,
    upload_attempts: AtomicU32,
    downloads: AtomicU32,
    deleted: Mutex<Vec<String>>,
}

impl MemoryDestination {
    pub fn new() -> Self {
        Self {
            reachable: AtomicBool::new(true),
            failures_left: AtomicU32::new(0),
            corrupt_hash: AtomicBool::new(false),
            upload_delay: Mutex::new(None),
            probe_delay: Mutex::new(None),
            objects: Mutex::new(HashMap::new()),
            upload_attempts: AtomicU32::new(0),
            downloads: AtomicU32::new(0),
            deleted: Mutex::new(Vec::new()),
        }
    }

    pub fn unreachable() -> Self {
        let dest = Self::new();
        dest.set_reachable(false);
        dest
    }

    /// Reachable on probe, but every upload errors.
    pub fn always_failing() -> Self {
        Self::failing_times(u32::MAX)
    }

    pub fn failing_times(n: u32) -> Self {
        let dest = Self::new();
        dest.failures_left.store(n, Ordering::SeqCst);
        dest
    }

    pub fn with_delay(self, delay: Duration) -> Self {
        *self.upload_delay.lock().unwrap() = Some(delay);
        self
    }

    /// Probe answers only after `delay`.
    pub fn with_probe_delay(self, delay: Duration) -> Self {
        *self.probe_delay.lock().unwrap() = Some(delay);
        self
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Report a wrong hash after every upload.
    pub fn set_corrupt_hash(&self, corrupt: bool) {
        self.corrupt_hash.store(corrupt, Ordering::SeqCst);
    }

    /// Flip a byte of a stored object, simulating bit rot.
    pub fn corrupt_object(&self, job_id: &str) {
        let mut objects = self.objects.lock().unwrap();
        if let Some(bytes) = objects.get_mut(job_id) {
            let mut data = bytes.to_vec();
            if let Some(first) = data.first_mut() {
                *first ^= 0xff;
            }
            *bytes = Bytes::from(data);
        }
    }

    pub fn upload_attempts(&self) -> u32 {
        self.upload_attempts.load(Ordering::SeqCst)
    }

    pub fn download_count(&self) -> u32 {
        self.downloads.load(Ordering::SeqCst)
    }

    pub fn has_object(&self, job_id: &str) -> bool {
        self.objects.lock().unwrap().contains_key(job_id)
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }
}

#[async_trait]
impl DestinationAdapter for MemoryDestination {
    async fn probe(&self) -> bool {
        let delay = *self.probe_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.reachable.load(Ordering::SeqCst)
    }

    async fn upload(&self, job_id: &str, payload: Bytes) -> anyhow::Result<String> {
        self.upload_attempts.fetch_add(1, Ordering::SeqCst);
        let delay = *self.upload_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let left = self.failures_left.load(Ordering::SeqCst);
        if left > 0 {
            if left != u32::MAX {
                self.failures_left.store(left - 1, Ordering::SeqCst);
            }
            anyhow::bail!("connection reset by peer");
        }

        let hash = if self.corrupt_hash.load(Ordering::SeqCst) {
            sha256_hex(b"truncated")
        } else {
            sha256_hex(&payload)
        };
        self.objects.lock().unwrap().insert(job_id.to_string(), payload);
        Ok(hash)
    }

    async fn download(&self, job_id: &str) -> anyhow::Result<Bytes> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        self.objects
            .lock()
            .unwrap()
            .get(job_id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("object {job_id} not found"))
    }

    async fn delete(&self, job_id: &str) -> anyhow::Result<()> {
        self.objects.lock().unwrap().remove(job_id);
        self.deleted.lock().unwrap().push(job_id.to_string());
        Ok(())
    }
}

// ── MemoryTarget ──

#[derive(Default)]
pub struct MemoryTarget {
    rows: Mutex<HashMap<(String, String), Record>>,
    write_calls: AtomicU32,
}

impl MemoryTarget {
    pub fn new() -> Self {
        Self::default()
    }

    fn scope_key(scope: &RestoreScope) -> String {
        match scope {
            RestoreScope::Original => "original".to_string(),
            RestoreScope::Staging => "staging".to_string(),
            RestoreScope::Custom(name) => format!("custom:{name}"),
        }
    }

    pub fn write_calls(&self) -> u32 {
        self.write_calls.load(Ordering::SeqCst)
    }

    pub fn rows_in(&self, scope: &RestoreScope) -> Vec<Record> {
        let key = Self::scope_key(scope);
        let mut rows: Vec<Record> = self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|((s, _), _)| *s == key)
            .map(|(_, r)| r.clone())
            .collect();
        rows.sort_by(|a, b| a.id.cmp(&b.id));
        rows
    }
}

#[async_trait]
impl RestoreTarget for MemoryTarget {
    async fn write(
        &self,
        scope: &RestoreScope,
        _data_type: DataType,
        records: Vec<Record>,
    ) -> anyhow::Result<usize> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        let key = Self::scope_key(scope);
        let mut rows = self.rows.lock().unwrap();
        let count = records.len();
        for record in records {
            rows.insert((key.clone(), record.id.clone()), record);
        }
        Ok(count)
    }
}
