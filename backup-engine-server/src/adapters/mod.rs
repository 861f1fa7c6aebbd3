pub mod local;

use backup_engine::adapter::DestinationAdapter;
use backup_engine::models::Destination;
use std::sync::Arc;

pub use local::LocalDirDestination;

/// Adapter for a configured destination, or `None` for an unsupported kind.
pub fn build(destination: &Destination) -> Option<Arc<dyn DestinationAdapter>> {
    match destination.kind.as_str() {
        "local" => Some(Arc::new(LocalDirDestination::new(&destination.endpoint))),
        _ => None,
    }
}
