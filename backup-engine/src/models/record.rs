//! Snapshot types for the collected record set.
//!
//! A snapshot groups application records by their known category. The category
//! is the union tag; the payload stays owned by the application that produced it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Patients,
    Documents,
    Users,
    AuditLogs,
    Appointments,
}

impl DataType {
    pub const ALL: [DataType; 5] = [
        DataType::Patients,
        DataType::Documents,
        DataType::Users,
        DataType::AuditLogs,
        DataType::Appointments,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Patients => "patients",
            DataType::Documents => "documents",
            DataType::Users => "users",
            DataType::AuditLogs => "audit_logs",
            DataType::Appointments => "appointments",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DataType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown data type '{s}'"))
    }
}

/// One application record as read through the data-access interface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub data_type: DataType,
    pub tenant_id: Option<String>,
    pub updated_at: DateTime<Utc>,
    pub payload: serde_json::Value,
}

/// Serialized record set for one backup job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub schema_version: u32,
    pub created_at: DateTime<Utc>,
    pub cutoff: Option<DateTime<Utc>>,
    pub sections: BTreeMap<DataType, Vec<Record>>,
}

impl Snapshot {
    pub fn new(schema_version: u32, created_at: DateTime<Utc>, cutoff: Option<DateTime<Utc>>) -> Self {
        Self {
            schema_version,
            created_at,
            cutoff,
            sections: BTreeMap::new(),
        }
    }

    pub fn record_count(&self) -> u64 {
        self.sections.values().map(|r| r.len() as u64).sum()
    }

    pub fn data_types(&self) -> Vec<DataType> {
        self.sections.keys().copied().collect()
    }

    /// Distinct tenant ids across every section, sorted.
    pub fn tenant_ids(&self) -> Vec<String> {
        let mut tenants: Vec<String> = self
            .sections
            .values()
            .flatten()
            .filter_map(|r| r.tenant_id.clone())
            .collect();
        tenants.sort();
        tenants.dedup();
        tenants
    }
}
