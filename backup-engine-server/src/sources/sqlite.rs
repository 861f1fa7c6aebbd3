//! SQLite-backed record store.
//!
//! One table per data type (`patients`, `documents`, ...) with columns
//! `id`, `tenant_id`, `payload` (JSON text) and `updated_at` (epoch millis).
//! Restores write to the same layout: the original table, `staging_<type>`,
//! or `<name>_<type>` for a custom scope.

use crate::db::connection::DbPool;
use crate::db::migrate::create_record_table;
use async_trait::async_trait;
use backup_engine::adapter::{DataSource, RestoreTarget};
use backup_engine::models::{DataType, Record, RestoreScope};
use chrono::{DateTime, Utc};
use rusqlite::params;

#[derive(Clone)]
pub struct SqliteStore {
    db: DbPool,
}

impl SqliteStore {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    fn read(&self, data_type: DataType, cutoff: Option<DateTime<Utc>>) -> anyhow::Result<Vec<Record>> {
        let conn = self.db.get()?;
        let table = data_type.as_str();
        let since = cutoff.map(|c| c.timestamp_millis()).unwrap_or(i64::MIN);

        let mut stmt = conn.prepare(&format!(
            "SELECT id, tenant_id, payload, updated_at FROM {table}
             WHERE updated_at > ?1 ORDER BY updated_at, id"
        ))?;
        let rows = stmt.query_map(params![since], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Option<String>>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (id, tenant_id, payload, updated_at) = row?;
            let updated_at = DateTime::from_timestamp_millis(updated_at)
                .ok_or_else(|| anyhow::anyhow!("{table}/{id}: updated_at out of range"))?;
            records.push(Record {
                payload: serde_json::from_str(&payload)
                    .map_err(|e| anyhow::anyhow!("{table}/{id}: invalid payload: {e}"))?,
                id,
                data_type,
                tenant_id,
                updated_at,
            });
        }
        Ok(records)
    }

    fn upsert(&self, table: &str, records: &[Record]) -> anyhow::Result<usize> {
        let mut conn = self.db.get()?;
        create_record_table(&conn, table)?;

        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO {table} (id, tenant_id, payload, updated_at) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(id) DO UPDATE SET
                   tenant_id = excluded.tenant_id,
                   payload = excluded.payload,
                   updated_at = excluded.updated_at"
            ))?;
            for record in records {
                stmt.execute(params![
                    record.id,
                    record.tenant_id,
                    serde_json::to_string(&record.payload)?,
                    record.updated_at.timestamp_millis(),
                ])?;
            }
        }
        tx.commit()?;
        Ok(records.len())
    }
}

/// Table that receives restored records of `data_type` for `scope`.
pub fn restore_table(scope: &RestoreScope, data_type: DataType) -> anyhow::Result<String> {
    match scope {
        RestoreScope::Original => Ok(data_type.as_str().to_string()),
        RestoreScope::Staging => Ok(format!("staging_{}", data_type.as_str())),
        RestoreScope::Custom(name) => {
            let valid = !name.is_empty()
                && name.len() <= 32
                && name.starts_with(|c: char| c.is_ascii_lowercase())
                && name
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
            if !valid {
                anyhow::bail!("invalid custom restore scope '{name}'");
            }
            Ok(format!("{name}_{}", data_type.as_str()))
        }
    }
}

#[async_trait]
impl DataSource for SqliteStore {
    async fn collect_all(&self, data_type: DataType) -> anyhow::Result<Vec<Record>> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.read(data_type, None)).await?
    }

    async fn collect_modified_since(
        &self,
        data_type: DataType,
        cutoff: DateTime<Utc>,
    ) -> anyhow::Result<Vec<Record>> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.read(data_type, Some(cutoff))).await?
    }
}

#[async_trait]
impl RestoreTarget for SqliteStore {
    async fn write(
        &self,
        scope: &RestoreScope,
        data_type: DataType,
        records: Vec<Record>,
    ) -> anyhow::Result<usize> {
        let table = restore_table(scope, data_type)?;
        let store = self.clone();
        let written = tokio::task::spawn_blocking(move || store.upsert(&table, &records)).await??;
        tracing::debug!(data_type = %data_type, written, "Restored records written");
        Ok(written)
    }
}
