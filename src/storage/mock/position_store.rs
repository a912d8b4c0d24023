//! In-memory PositionStore implementation.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::model::AggregateType;
use crate::storage::{PositionStore, Result};

type WatermarkKey = (String, AggregateType, String);

/// Position store that keeps watermarks in memory.
#[derive(Default)]
pub struct MockPositionStore {
    watermarks: RwLock<HashMap<WatermarkKey, u64>>,
    cursors: RwLock<HashMap<String, u64>>,
}

impl MockPositionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PositionStore for MockPositionStore {
    async fn get(
        &self,
        projection: &str,
        aggregate_type: AggregateType,
        aggregate_id: &str,
    ) -> Result<Option<u64>> {
        let key = (
            projection.to_string(),
            aggregate_type,
            aggregate_id.to_string(),
        );
        Ok(self.watermarks.read().await.get(&key).copied())
    }

    async fn put(
        &self,
        projection: &str,
        aggregate_type: AggregateType,
        aggregate_id: &str,
        sequence: u64,
    ) -> Result<()> {
        let key = (
            projection.to_string(),
            aggregate_type,
            aggregate_id.to_string(),
        );
        let mut watermarks = self.watermarks.write().await;
        let entry = watermarks.entry(key).or_insert(0);
        *entry = (*entry).max(sequence);
        Ok(())
    }

    async fn get_cursor(&self, projection: &str) -> Result<u64> {
        Ok(self
            .cursors
            .read()
            .await
            .get(projection)
            .copied()
            .unwrap_or(0))
    }

    async fn put_cursor(&self, projection: &str, position: u64) -> Result<()> {
        self.cursors
            .write()
            .await
            .insert(projection.to_string(), position);
        Ok(())
    }

    async fn reset(&self, projection: &str) -> Result<()> {
        self.watermarks
            .write()
            .await
            .retain(|(name, _, _), _| name != projection);
        self.cursors.write().await.remove(projection);
        Ok(())
    }
}
