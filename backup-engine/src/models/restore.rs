use super::record::{DataType, Record};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Approval {
    pub approver_id: String,
    pub decision: Decision,
    pub timestamp: DateTime<Utc>,
}

/// Where restored records are written.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum RestoreScope {
    Original,
    #[default]
    Staging,
    Custom(String),
}

/// Empty lists mean "no restriction".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreFilters {
    #[serde(default)]
    pub tenant_ids: Vec<String>,
    #[serde(default)]
    pub record_ids: Vec<String>,
}

impl RestoreFilters {
    pub fn matches(&self, record: &Record) -> bool {
        let tenant_ok = self.tenant_ids.is_empty()
            || record
                .tenant_id
                .as_ref()
                .is_some_and(|t| self.tenant_ids.contains(t));
        let id_ok = self.record_ids.is_empty() || self.record_ids.contains(&record.id);
        tenant_ok && id_ok
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreRequest {
    #[serde(default = "new_restore_id")]
    pub id: String,
    /// Resolved by the coordinator; any caller-supplied value is overwritten.
    #[serde(default)]
    pub target_backup_job_id: Option<String>,
    #[serde(default)]
    pub requested_by: String,
    #[serde(default)]
    pub target_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub data_types: Vec<DataType>,
    #[serde(default)]
    pub filters: RestoreFilters,
    #[serde(default)]
    pub destination_scope: RestoreScope,
    #[serde(default)]
    pub approvals: Vec<Approval>,
}

fn new_restore_id() -> String {
    Uuid::new_v4().to_string()
}

impl RestoreRequest {
    pub fn new(requested_by: &str, target_date: DateTime<Utc>, data_types: Vec<DataType>) -> Self {
        Self {
            id: new_restore_id(),
            target_backup_job_id: None,
            requested_by: requested_by.to_string(),
            target_date: Some(target_date),
            data_types,
            filters: RestoreFilters::default(),
            destination_scope: RestoreScope::default(),
            approvals: Vec::new(),
        }
    }

    pub fn approve(mut self, approver_id: &str, at: DateTime<Utc>) -> Self {
        self.approvals.push(Approval {
            approver_id: approver_id.to_string(),
            decision: Decision::Approved,
            timestamp: at,
        });
        self
    }

    pub fn is_approved(&self) -> bool {
        self.approvals
            .iter()
            .any(|a| a.decision == Decision::Approved)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestoreStatus {
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreOutcome {
    pub restore_id: String,
    pub backup_job_id: String,
    pub requested_by: String,
    pub status: RestoreStatus,
    pub source_destination: Option<String>,
    pub records_restored: u64,
    pub restored_by_type: BTreeMap<DataType, u64>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}
