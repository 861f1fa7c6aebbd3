use serde::{Deserialize, Serialize};

/// Operator-managed storage target. Read-only to the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Destination {
    pub id: String,
    /// Adapter kind, e.g. `local`, `s3`, `gcs`.
    pub kind: String,
    #[serde(default)]
    pub region: Option<String>,
    pub endpoint: String,
    /// Credentials as stored by the operator (already encrypted at rest).
    #[serde(default, skip_serializing)]
    pub credentials: Option<String>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default)]
    pub priority: u32,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_max_retries() -> u32 {
    3
}

fn default_active() -> bool {
    true
}

impl Destination {
    pub fn new(id: &str, kind: &str, endpoint: &str, priority: u32) -> Self {
        Self {
            id: id.to_string(),
            kind: kind.to_string(),
            region: None,
            endpoint: endpoint.to_string(),
            credentials: None,
            max_retries: default_max_retries(),
            priority,
            active: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_take_defaults() {
        let dest: Destination = serde_json::from_str(
            r#"{"id": "nas", "kind": "local", "endpoint": "/mnt/nas", "credentials": "secret"}"#,
        )
        .unwrap();
        assert_eq!(dest.max_retries, 3);
        assert!(dest.active);
        assert_eq!(dest.priority, 0);

        let json = serde_json::to_value(&dest).unwrap();
        assert!(json.get("credentials").is_none());
    }
}
