//! Snapshot packaging: JSON serialization followed by zstd compression.

use crate::models::{Snapshot, SCHEMA_VERSION};
use crate::utils::{EngineError, Result};

/// Result of packing one snapshot
#[derive(Debug, Clone)]
pub struct PackedSnapshot {
    pub bytes: Vec<u8>,
    pub uncompressed_size: u64,
    /// compressed / uncompressed; 1.0 for an empty input
    pub compression_ratio: f64,
}

#[derive(Debug, Clone)]
pub struct Packager {
    level: i32,
}

impl Packager {
    pub fn new(level: i32) -> Self {
        Self { level }
    }

    pub fn pack(&self, snapshot: &Snapshot) -> Result<PackedSnapshot> {
        let raw = serde_json::to_vec(snapshot)?;
        let bytes = zstd::encode_all(raw.as_slice(), self.level)
            .map_err(|e| EngineError::Compression(e.to_string()))?;

        let compression_ratio = if raw.is_empty() {
            1.0
        } else {
            bytes.len() as f64 / raw.len() as f64
        };

        Ok(PackedSnapshot {
            uncompressed_size: raw.len() as u64,
            compression_ratio,
            bytes,
        })
    }

    /// Reverse of [`Packager::pack`]. Snapshots written by a newer schema are rejected.
    pub fn unpack(&self, bytes: &[u8]) -> Result<Snapshot> {
        let raw = zstd::decode_all(bytes).map_err(|e| EngineError::Compression(e.to_string()))?;
        let snapshot: Snapshot = serde_json::from_slice(&raw)?;
        if snapshot.schema_version > SCHEMA_VERSION {
            return Err(EngineError::UnsupportedSchema(snapshot.schema_version));
        }
        Ok(snapshot)
    }
}

impl Default for Packager {
    fn default() -> Self {
        Self::new(3)
    }
}
