//! Backup Engine Library
//!
//! Scheduled, encrypted, multi-destination backups of clinic records with
//! verified restores. The host application supplies the record store, the
//! restore writer and one adapter per storage destination.

pub mod adapter;
pub mod clock;
pub mod collector;
pub mod config;
pub mod crypto;
pub mod ledger;
pub mod models;
pub mod orchestrator;
pub mod packager;
pub mod progress;
pub mod registry;
pub mod restore;
pub mod retention;
pub mod retry;
pub mod schedule;
pub mod uploader;
pub mod utils;
pub mod verifier;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use config::EngineConfig;
pub use orchestrator::{BackupEngine, EngineStats, SystemTestReport};
pub use utils::errors::EngineError;
pub use utils::Result;
