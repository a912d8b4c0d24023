//! Write model repository.
//!
//! Combines event store and snapshot repository to rebuild write models
//! by folding their event stream.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use super::SnapshotRepository;
use crate::model::{AggregateType, ChangeReceipt, Event};
use crate::storage::{AppendRequest, EventFilter, EventStore, Result, Snapshot};

/// State reduced from an aggregate's stream.
///
/// `apply` is called once per event in sequence order and must be a pure
/// fold: the same events always produce the same state.
pub trait WriteModel:
    Default + Clone + Serialize + DeserializeOwned + Send + Sync + 'static
{
    fn apply(&mut self, event: &Event);
}

/// Write model together with the stream position it was loaded at.
#[derive(Debug, Clone)]
pub struct Loaded<M> {
    pub model: M,
    pub aggregate_type: AggregateType,
    pub aggregate_id: String,
    /// Sequence of the last applied event; 0 for a stream without events.
    pub sequence: u64,
    pub position: u64,
    pub resource_owner: String,
    pub change_date: DateTime<Utc>,
}

impl<M> Loaded<M> {
    /// Receipt describing the stream as loaded.
    pub fn receipt(&self) -> ChangeReceipt {
        ChangeReceipt {
            aggregate_type: self.aggregate_type,
            aggregate_id: self.aggregate_id.clone(),
            sequence: self.sequence,
            position: self.position,
            change_date: self.change_date,
            resource_owner: self.resource_owner.clone(),
        }
    }

    /// Append request expecting the stream at the loaded sequence.
    pub fn append(&self) -> AppendRequest {
        AppendRequest::new(
            self.aggregate_type,
            self.aggregate_id.clone(),
            self.resource_owner.clone(),
            self.sequence,
        )
    }
}

/// Repository for write models.
///
/// Loads state from the latest snapshot plus the events after it, and
/// writes a new snapshot once `snapshot_interval` events had to be replayed.
pub struct WriteModelRepository {
    event_store: Arc<dyn EventStore>,
    snapshots: SnapshotRepository,
    snapshot_interval: u64,
}

impl WriteModelRepository {
    pub fn new(
        event_store: Arc<dyn EventStore>,
        snapshots: SnapshotRepository,
        snapshot_interval: u64,
    ) -> Self {
        Self {
            event_store,
            snapshots,
            snapshot_interval: snapshot_interval.max(1),
        }
    }

    pub fn event_store(&self) -> &Arc<dyn EventStore> {
        &self.event_store
    }

    /// Load a write model.
    ///
    /// A stream without events yields the default model at sequence 0 with
    /// an empty resource owner.
    pub async fn load<M: WriteModel>(
        &self,
        aggregate_type: AggregateType,
        aggregate_id: &str,
    ) -> Result<Loaded<M>> {
        let mut loaded = match self.snapshots.get(aggregate_type, aggregate_id).await? {
            Some(snapshot) => Loaded {
                model: serde_json::from_value(snapshot.state)?,
                aggregate_type,
                aggregate_id: aggregate_id.to_string(),
                sequence: snapshot.sequence,
                position: snapshot.position,
                resource_owner: snapshot.resource_owner,
                change_date: snapshot.change_date,
            },
            None => Loaded {
                model: M::default(),
                aggregate_type,
                aggregate_id: aggregate_id.to_string(),
                sequence: 0,
                position: 0,
                resource_owner: String::new(),
                change_date: DateTime::<Utc>::default(),
            },
        };

        // Snapshot sequence is the last event folded into it, so load from
        // snapshot.sequence + 1 to avoid double-applying events.
        let filter =
            EventFilter::stream(aggregate_type, aggregate_id).sequence_greater(loaded.sequence);
        let events = self.event_store.query(&filter).await?;
        let replayed = events.len() as u64;

        for event in &events {
            loaded.model.apply(event);
            loaded.sequence = event.sequence;
            loaded.position = event.position;
            loaded.resource_owner = event.resource_owner.clone();
            loaded.change_date = event.creation_date;
        }

        if replayed >= self.snapshot_interval && self.snapshots.write_enabled() {
            debug!(
                %aggregate_type,
                aggregate_id,
                sequence = loaded.sequence,
                "Writing snapshot"
            );
            self.snapshots
                .put(
                    aggregate_type,
                    aggregate_id,
                    Snapshot {
                        sequence: loaded.sequence,
                        position: loaded.position,
                        resource_owner: loaded.resource_owner.clone(),
                        change_date: loaded.change_date,
                        state: serde_json::to_value(&loaded.model)?,
                    },
                )
                .await?;
        }

        Ok(loaded)
    }

    /// Append events atomically across streams.
    pub async fn push(&self, appends: Vec<AppendRequest>) -> Result<Vec<Event>> {
        self.event_store.push(appends).await
    }
}

#[cfg(test)]
mod tests;
