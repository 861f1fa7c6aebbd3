use crate::adapter::DestinationAdapter;
use crate::models::Destination;
use crate::utils::{EngineError, Result};
use std::sync::Arc;
use tokio::sync::RwLock;

/// A destination together with the adapter that talks to it.
#[derive(Clone)]
pub struct UploadTarget {
    pub destination: Destination,
    pub adapter: Arc<dyn DestinationAdapter>,
}

/// Operator-managed destinations, kept in priority order.
#[derive(Default)]
pub struct DestinationRegistry {
    entries: RwLock<Vec<UploadTarget>>,
}

impl DestinationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace a destination by id.
    pub async fn register(&self, destination: Destination, adapter: Arc<dyn DestinationAdapter>) {
        let mut entries = self.entries.write().await;
        entries.retain(|e| e.destination.id != destination.id);
        entries.push(UploadTarget {
            destination,
            adapter,
        });
        entries.sort_by(|a, b| {
            a.destination
                .priority
                .cmp(&b.destination.priority)
                .then_with(|| a.destination.id.cmp(&b.destination.id))
        });
    }

    /// Replace the settings of a registered destination, keeping its adapter.
    pub async fn update(&self, destination: Destination) -> Result<()> {
        let adapter = self
            .adapter(&destination.id)
            .await
            .ok_or_else(|| EngineError::Validation(format!("unknown destination {}", destination.id)))?;
        self.register(destination, adapter).await;
        Ok(())
    }

    pub async fn list(&self) -> Vec<Destination> {
        self.entries
            .read()
            .await
            .iter()
            .map(|e| e.destination.clone())
            .collect()
    }

    pub async fn active(&self) -> Vec<UploadTarget> {
        self.entries
            .read()
            .await
            .iter()
            .filter(|e| e.destination.active)
            .cloned()
            .collect()
    }

    /// Adapter for any registered destination, active or not. Restores and
    /// garbage collection still need to reach deactivated destinations.
    pub async fn adapter(&self, destination_id: &str) -> Option<Arc<dyn DestinationAdapter>> {
        self.entries
            .read()
            .await
            .iter()
            .find(|e| e.destination.id == destination_id)
            .map(|e| e.adapter.clone())
    }
}
