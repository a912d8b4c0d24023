//! In-memory SnapshotStore implementation.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::model::AggregateType;
use crate::storage::{Result, Snapshot, SnapshotStore};

/// Snapshot store that keeps snapshots in memory.
#[derive(Default)]
pub struct MockSnapshotStore {
    snapshots: RwLock<HashMap<(AggregateType, String), Snapshot>>,
}

impl MockSnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn stored_count(&self) -> usize {
        self.snapshots.read().await.len()
    }
}

#[async_trait]
impl SnapshotStore for MockSnapshotStore {
    async fn get(
        &self,
        aggregate_type: AggregateType,
        aggregate_id: &str,
    ) -> Result<Option<Snapshot>> {
        let key = (aggregate_type, aggregate_id.to_string());
        Ok(self.snapshots.read().await.get(&key).cloned())
    }

    async fn put(
        &self,
        aggregate_type: AggregateType,
        aggregate_id: &str,
        snapshot: Snapshot,
    ) -> Result<()> {
        let key = (aggregate_type, aggregate_id.to_string());
        self.snapshots.write().await.insert(key, snapshot);
        Ok(())
    }

    async fn delete(&self, aggregate_type: AggregateType, aggregate_id: &str) -> Result<()> {
        let key = (aggregate_type, aggregate_id.to_string());
        self.snapshots.write().await.remove(&key);
        Ok(())
    }
}
