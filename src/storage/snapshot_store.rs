//! SnapshotStore trait definition.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use super::Result;
use crate::model::AggregateType;

/// Serialized write model state at a given stream sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub sequence: u64,
    pub position: u64,
    pub resource_owner: String,
    pub change_date: DateTime<Utc>,
    pub state: Value,
}

/// Interface for snapshot persistence.
///
/// Snapshots are an optional optimization to avoid replaying an entire
/// stream. When loading a write model, if a snapshot exists, events are
/// loaded from `snapshot.sequence + 1` onwards.
///
/// # Implementations
///
/// - `SqliteSnapshotStore`: SQLite storage
/// - `MockSnapshotStore`: In-memory storage
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Retrieve the latest snapshot for an aggregate.
    async fn get(&self, aggregate_type: AggregateType, aggregate_id: &str)
        -> Result<Option<Snapshot>>;

    /// Store a snapshot, replacing any older one.
    async fn put(
        &self,
        aggregate_type: AggregateType,
        aggregate_id: &str,
        snapshot: Snapshot,
    ) -> Result<()>;

    /// Delete the snapshot of an aggregate.
    async fn delete(&self, aggregate_type: AggregateType, aggregate_id: &str) -> Result<()>;
}
