//! Configuration management for the backup engine.
//!
//! Loads configuration from a TOML file with environment variable overrides,
//! then validates it. An invalid configuration is a `ConfigError` and the
//! engine refuses to start.

use crate::models::{DataType, Destination, JobType};
use crate::utils::{EngineError, Result};
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub engine: EngineSection,

    #[serde(default)]
    pub schedule: ScheduleConfig,

    #[serde(default)]
    pub retention: RetentionPolicy,

    pub encryption: EncryptionConfig,

    #[serde(default)]
    pub upload: UploadConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub verify: VerifyConfig,

    #[serde(default)]
    pub destinations: Vec<Destination>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSection {
    /// Master switch; a disabled engine rejects every backup request
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Record categories included in every snapshot
    #[serde(default = "default_data_types")]
    pub data_types: Vec<DataType>,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Cron expressions (5 or 6 fields). An absent entry disables that trigger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_incremental_cron")]
    pub incremental: Option<String>,

    #[serde(default = "default_full_cron")]
    pub full: Option<String>,

    #[serde(default = "default_archive_cron")]
    pub archive: Option<String>,

    #[serde(default = "default_retention_cron")]
    pub retention: Option<String>,

    #[serde(default = "default_verification_cron")]
    pub verification: Option<String>,
}

/// Retention counts per bucket. Only the GC pass reads these.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetentionPolicy {
    #[serde(default = "default_daily")]
    pub daily: u32,
    #[serde(default = "default_weekly")]
    pub weekly: u32,
    #[serde(default = "default_monthly")]
    pub monthly: u32,
    #[serde(default = "default_yearly")]
    pub yearly: u32,
}

impl RetentionPolicy {
    /// Age in days after which a completed job of this type is pruned.
    pub fn retention_days(&self, job_type: JobType) -> i64 {
        match job_type {
            JobType::Incremental => self.daily as i64,
            JobType::Full => self.weekly as i64 * 7,
            JobType::Archive => self.monthly as i64 * 30,
            JobType::Manual => self.yearly as i64 * 365,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptionConfig {
    /// Base64-encoded 32-byte master key
    #[serde(default)]
    pub master_key: String,

    /// Key rotation window in days (default: 90)
    #[serde(default = "default_rotation_days")]
    pub rotation_days: u32,
}

impl EncryptionConfig {
    pub fn decode_master_key(&self) -> Result<[u8; 32]> {
        let raw = base64::engine::general_purpose::STANDARD
            .decode(self.master_key.trim())
            .map_err(|e| EngineError::Config(format!("master key is not valid base64: {e}")))?;
        raw.try_into().map_err(|raw: Vec<u8>| {
            EngineError::Config(format!("master key must be 32 bytes, got {}", raw.len()))
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// First retry delay; doubles per attempt
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Ceiling for a single backoff delay
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// A destination that has not answered its reachability probe by then
    /// counts as unreachable
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
}

impl UploadConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Total bytes the engine may keep across retained backups
    #[serde(default = "default_capacity_bytes")]
    pub capacity_bytes: u64,

    /// Number of past jobs averaged when estimating the next snapshot size
    #[serde(default = "default_estimate_history")]
    pub estimate_history: usize,

    /// Compression level (1-22 for zstd)
    #[serde(default = "default_compression_level")]
    pub compression_level: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyConfig {
    /// Most recent completed jobs re-checked per verification pass
    #[serde(default = "default_sample_size")]
    pub sample_size: usize,
}

// Default values
fn default_enabled() -> bool {
    true
}

fn default_data_types() -> Vec<DataType> {
    DataType::ALL.to_vec()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_incremental_cron() -> Option<String> {
    Some("0 2 * * *".to_string())
}

fn default_full_cron() -> Option<String> {
    Some("0 3 * * 0".to_string())
}

fn default_archive_cron() -> Option<String> {
    Some("0 4 1 * *".to_string())
}

fn default_retention_cron() -> Option<String> {
    Some("30 5 * * *".to_string())
}

fn default_verification_cron() -> Option<String> {
    Some("0 6 * * *".to_string())
}

fn default_daily() -> u32 {
    7
}

fn default_weekly() -> u32 {
    4
}

fn default_monthly() -> u32 {
    12
}

fn default_yearly() -> u32 {
    7
}

fn default_rotation_days() -> u32 {
    90
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_probe_timeout_ms() -> u64 {
    10_000
}

fn default_capacity_bytes() -> u64 {
    500 * 1024 * 1024 * 1024 // 500GB
}

fn default_estimate_history() -> usize {
    5
}

fn default_compression_level() -> i32 {
    3
}

fn default_sample_size() -> usize {
    5
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            data_types: default_data_types(),
            log_level: default_log_level(),
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            incremental: default_incremental_cron(),
            full: default_full_cron(),
            archive: default_archive_cron(),
            retention: default_retention_cron(),
            verification: default_verification_cron(),
        }
    }
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            daily: default_daily(),
            weekly: default_weekly(),
            monthly: default_monthly(),
            yearly: default_yearly(),
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            probe_timeout_ms: default_probe_timeout_ms(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            capacity_bytes: default_capacity_bytes(),
            estimate_history: default_estimate_history(),
            compression_level: default_compression_level(),
        }
    }
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            sample_size: default_sample_size(),
        }
    }
}

impl EngineConfig {
    /// Default configuration around the given master key
    pub fn with_master_key(master_key: impl Into<String>) -> Self {
        Self {
            engine: EngineSection::default(),
            schedule: ScheduleConfig::default(),
            retention: RetentionPolicy::default(),
            encryption: EncryptionConfig {
                master_key: master_key.into(),
                rotation_days: default_rotation_days(),
            },
            upload: UploadConfig::default(),
            storage: StorageConfig::default(),
            verify: VerifyConfig::default(),
            destinations: Vec::new(),
        }
    }

    /// Load, apply environment overrides and validate a TOML configuration file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::parse(&content)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| EngineError::Config(e.to_string()))
    }

    /// `BACKUP_ENGINE_ENABLED` and `BACKUP_MASTER_KEY` override the file.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("BACKUP_ENGINE_ENABLED") {
            self.engine.enabled = matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        }
        if let Ok(key) = std::env::var("BACKUP_MASTER_KEY") {
            self.encryption.master_key = key;
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.encryption.decode_master_key()?;
        if self.encryption.rotation_days == 0 {
            return Err(EngineError::Config("rotation_days must be positive".into()));
        }

        let r = &self.retention;
        if r.daily == 0 || r.weekly == 0 || r.monthly == 0 || r.yearly == 0 {
            return Err(EngineError::Config("retention counts must be positive".into()));
        }

        for (name, expr) in self.schedule.entries() {
            if let Some(expr) = expr {
                crate::schedule::parse_cron(expr)
                    .map_err(|e| EngineError::Config(format!("schedule.{name}: {e}")))?;
            }
        }

        if self.upload.base_delay_ms > self.upload.max_delay_ms {
            return Err(EngineError::Config(
                "upload.base_delay_ms must not exceed upload.max_delay_ms".into(),
            ));
        }

        if self.engine.data_types.is_empty() {
            return Err(EngineError::Config("engine.data_types must not be empty".into()));
        }

        let mut seen = HashSet::new();
        for dest in &self.destinations {
            if !seen.insert(dest.id.as_str()) {
                return Err(EngineError::Config(format!("duplicate destination id '{}'", dest.id)));
            }
            if dest.max_retries == 0 {
                return Err(EngineError::Config(format!(
                    "destination '{}' needs max_retries >= 1",
                    dest.id
                )));
            }
        }

        Ok(())
    }
}

impl ScheduleConfig {
    /// Configured expressions by trigger name; blank strings count as disabled.
    pub fn entries(&self) -> [(&'static str, Option<&str>); 5] {
        fn active(expr: &Option<String>) -> Option<&str> {
            expr.as_deref().filter(|s| !s.trim().is_empty())
        }
        [
            ("incremental", active(&self.incremental)),
            ("full", active(&self.full)),
            ("archive", active(&self.archive)),
            ("retention", active(&self.retention)),
            ("verification", active(&self.verification)),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::generate_master_key;

    #[test]
    fn test_defaults_validate_with_key() {
        let config = EngineConfig::with_master_key(generate_master_key());
        assert!(config.validate().is_ok());
        assert_eq!(config.encryption.rotation_days, 90);
        assert_eq!(config.engine.data_types.len(), DataType::ALL.len());
    }

    #[test]
    fn test_missing_master_key_is_config_error() {
        let config = EngineConfig::with_master_key("");
        let err = config.validate().unwrap_err();
        assert_eq!(err.reason_code(), "config_error");
    }

    #[test]
    fn test_invalid_cron_rejected() {
        let mut config = EngineConfig::with_master_key(generate_master_key());
        config.schedule.full = Some("every sunday".into());
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("schedule.full"));
    }

    #[test]
    fn test_retention_days_by_type() {
        let policy = RetentionPolicy {
            daily: 7,
            weekly: 4,
            monthly: 12,
            yearly: 2,
        };
        assert_eq!(policy.retention_days(JobType::Incremental), 7);
        assert_eq!(policy.retention_days(JobType::Full), 28);
        assert_eq!(policy.retention_days(JobType::Archive), 360);
        assert_eq!(policy.retention_days(JobType::Manual), 730);
    }

    #[test]
    fn test_parse_toml_file() -> std::io::Result<()> {
        let dir = tempfile::TempDir::new()?;
        let path = dir.path().join("engine.toml");
        let toml = format!(
            r#"
[encryption]
master_key = "{}"
rotation_days = 30

[retention]
daily = 3

[schedule]
incremental = "*/15 * * * *"

[[destinations]]
id = "local-primary"
kind = "local"
endpoint = "/var/backups/clinic"
priority = 1
max_retries = 5
"#,
            generate_master_key()
        );
        std::fs::write(&path, toml)?;

        let config = EngineConfig::from_file(&path).expect("config should load");
        assert_eq!(config.encryption.rotation_days, 30);
        assert_eq!(config.retention.daily, 3);
        assert_eq!(config.retention.weekly, 4);
        assert_eq!(config.destinations.len(), 1);
        assert_eq!(config.destinations[0].max_retries, 5);
        assert!(config.destinations[0].active);
        assert_eq!(config.schedule.full.as_deref(), Some("0 3 * * 0"));
        Ok(())
    }

    #[test]
    fn test_duplicate_destination_rejected() {
        let mut config = EngineConfig::with_master_key(generate_master_key());
        config.destinations = vec![
            Destination::new("a", "local", "/tmp/a", 0),
            Destination::new("a", "local", "/tmp/b", 1),
        ];
        assert!(config.validate().is_err());
    }
}
