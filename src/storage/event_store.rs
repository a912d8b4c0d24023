//! EventStore trait definition.

use async_trait::async_trait;
use tokio::sync::broadcast;

use super::{EventFilter, Result};
use crate::model::{AggregateType, Event, PendingEvent};

/// Events to append to one aggregate stream.
///
/// `expected_sequence` is the sequence the writer loaded the aggregate at
/// (0 for a stream that does not exist yet). The append is rejected if the
/// stream has moved on since.
#[derive(Debug, Clone)]
pub struct AppendRequest {
    pub aggregate_type: AggregateType,
    pub aggregate_id: String,
    pub resource_owner: String,
    pub expected_sequence: u64,
    pub events: Vec<PendingEvent>,
}

impl AppendRequest {
    pub fn new(
        aggregate_type: AggregateType,
        aggregate_id: impl Into<String>,
        resource_owner: impl Into<String>,
        expected_sequence: u64,
    ) -> Self {
        Self {
            aggregate_type,
            aggregate_id: aggregate_id.into(),
            resource_owner: resource_owner.into(),
            expected_sequence,
            events: Vec::new(),
        }
    }

    pub fn with_event(mut self, event: PendingEvent) -> Self {
        self.events.push(event);
        self
    }

    pub fn with_events(mut self, events: impl IntoIterator<Item = PendingEvent>) -> Self {
        self.events.extend(events);
        self
    }
}

/// Interface for event persistence.
///
/// The `(aggregate_type, aggregate_id, sequence)` tuple forms the unique key
/// for stored events; that uniqueness is the optimistic concurrency check.
///
/// Implementations:
/// - `SqliteEventStore`: SQLite storage
/// - `MockEventStore`: In-memory storage
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Append events to one or more streams in a single transaction.
    ///
    /// Every request's `expected_sequence` must match the stream's current
    /// sequence, otherwise nothing is written and
    /// `StorageError::ConcurrencyConflict` is returned. Requests without
    /// events only assert their expected sequence.
    ///
    /// Returns the stored events in append order.
    async fn push(&self, appends: Vec<AppendRequest>) -> Result<Vec<Event>>;

    /// Append events to a single stream, returning its new sequence.
    async fn append(
        &self,
        aggregate_type: AggregateType,
        aggregate_id: &str,
        resource_owner: &str,
        expected_sequence: u64,
        events: Vec<PendingEvent>,
    ) -> Result<u64> {
        let stored = self
            .push(vec![AppendRequest {
                aggregate_type,
                aggregate_id: aggregate_id.to_string(),
                resource_owner: resource_owner.to_string(),
                expected_sequence,
                events,
            }])
            .await?;
        Ok(stored
            .last()
            .map(|e| e.sequence)
            .unwrap_or(expected_sequence))
    }

    /// Retrieve events matching a filter.
    async fn query(&self, filter: &EventFilter) -> Result<Vec<Event>>;

    /// Current sequence of a stream; 0 if it has no events.
    async fn current_sequence(&self, aggregate_type: AggregateType, aggregate_id: &str)
        -> Result<u64>;

    /// Highest committed global position; 0 if the log is empty.
    async fn latest_position(&self) -> Result<u64>;

    /// Subscribe to commit notifications carrying the latest committed position.
    fn subscribe(&self) -> broadcast::Receiver<u64>;
}
