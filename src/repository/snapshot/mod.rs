//! Snapshot repository.
//!
//! Provides write model snapshot persistence operations.

use std::sync::Arc;

use crate::model::AggregateType;
use crate::storage::{Result, Snapshot, SnapshotStore};

/// Repository for Snapshot operations.
///
/// Snapshots are an optimization to avoid replaying entire streams.
pub struct SnapshotRepository {
    store: Arc<dyn SnapshotStore>,
    /// When false, snapshots are not read.
    read_enabled: bool,
    /// When false, snapshots are not written.
    write_enabled: bool,
}

impl SnapshotRepository {
    /// Create a new Snapshot repository with reads and writes enabled.
    pub fn new(store: Arc<dyn SnapshotStore>) -> Self {
        Self {
            store,
            read_enabled: true,
            write_enabled: true,
        }
    }

    /// Create a new Snapshot repository with configurable behavior.
    pub fn with_config(store: Arc<dyn SnapshotStore>, read_enabled: bool, write_enabled: bool) -> Self {
        Self {
            store,
            read_enabled,
            write_enabled,
        }
    }

    /// Retrieve the latest snapshot for an aggregate.
    ///
    /// Returns `None` if no snapshot exists or reads are disabled.
    pub async fn get(
        &self,
        aggregate_type: AggregateType,
        aggregate_id: &str,
    ) -> Result<Option<Snapshot>> {
        if !self.read_enabled {
            return Ok(None);
        }
        self.store.get(aggregate_type, aggregate_id).await
    }

    /// Store a snapshot for an aggregate.
    ///
    /// Replaces any existing snapshot. If writes are disabled, this is a no-op.
    pub async fn put(
        &self,
        aggregate_type: AggregateType,
        aggregate_id: &str,
        snapshot: Snapshot,
    ) -> Result<()> {
        if self.write_enabled {
            self.store.put(aggregate_type, aggregate_id, snapshot).await
        } else {
            Ok(())
        }
    }

    /// Delete the snapshot for an aggregate.
    pub async fn delete(&self, aggregate_type: AggregateType, aggregate_id: &str) -> Result<()> {
        self.store.delete(aggregate_type, aggregate_id).await
    }

    pub fn write_enabled(&self) -> bool {
        self.write_enabled
    }
}
