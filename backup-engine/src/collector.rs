//! Data collection for one snapshot.
//!
//! Each data type is read with its own call, so the snapshot is consistent per
//! data type but not across the whole job: a record written between two reads
//! may show up in one category and not in a related one. The snapshot's
//! `created_at` is taken before the first read, so the next incremental, which
//! cuts off at that time, picks such records up.

use crate::adapter::DataSource;
use crate::models::{DataType, Snapshot, SCHEMA_VERSION};
use crate::utils::{EngineError, Result};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::debug;

#[derive(Clone)]
pub struct DataCollector {
    source: Arc<dyn DataSource>,
}

impl DataCollector {
    pub fn new(source: Arc<dyn DataSource>) -> Self {
        Self { source }
    }

    /// `cutoff = None` collects every record.
    pub async fn collect_since(
        &self,
        cutoff: Option<DateTime<Utc>>,
        data_types: &[DataType],
        now: DateTime<Utc>,
    ) -> Result<Snapshot> {
        let mut snapshot = Snapshot::new(SCHEMA_VERSION, now, cutoff);

        for &data_type in data_types {
            let records = match cutoff {
                Some(cutoff) => self.source.collect_modified_since(data_type, cutoff).await,
                None => self.source.collect_all(data_type).await,
            }
            .map_err(|e| EngineError::DataSource(format!("{data_type}: {e:#}")))?;

            debug!(data_type = %data_type, count = records.len(), "Collected records");
            snapshot.sections.insert(data_type, records);
        }

        Ok(snapshot)
    }
}
