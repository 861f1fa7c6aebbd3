//! Domain types shared across the engine.

pub mod destination;
pub mod job;
pub mod record;
pub mod restore;

pub use destination::Destination;
pub use job::{
    BackupJob, DestinationState, DestinationStatus, ErrorEntry, JobMetadata, JobStatus, JobType,
    Severity, SCHEMA_VERSION,
};
pub use record::{DataType, Record, Snapshot};
pub use restore::{
    Approval, Decision, RestoreFilters, RestoreOutcome, RestoreRequest, RestoreScope,
    RestoreStatus,
};
