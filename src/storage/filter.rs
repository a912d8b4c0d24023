//! Event filters.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::model::{AggregateType, Event};

/// Result ordering by global position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Order {
    #[default]
    Asc,
    Desc,
}

/// Filter for `EventStore::query`.
///
/// Empty collections match everything. `event_data` predicates compare
/// payload fields for equality; dotted keys (`principal.group_id`) address
/// nested fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventFilter {
    pub aggregate_types: Vec<AggregateType>,
    pub aggregate_ids: Vec<String>,
    pub resource_owner: Option<String>,
    pub event_types: Vec<String>,
    pub sequence_greater: Option<u64>,
    pub position_greater: Option<u64>,
    pub event_data: BTreeMap<String, Value>,
    pub order: Order,
    pub limit: Option<usize>,
    /// Point in time the log is read as of. Set via `allow_time_travel`.
    pub as_of: Option<DateTime<Utc>>,
    /// Wait for writers that started before the query and touch matched
    /// aggregates to finish before reading.
    pub await_open_transactions: bool,
}

impl EventFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter for the full stream of one aggregate.
    pub fn stream(aggregate_type: AggregateType, aggregate_id: impl Into<String>) -> Self {
        Self::new()
            .aggregate_types([aggregate_type])
            .aggregate_id(aggregate_id)
    }

    pub fn aggregate_types(mut self, types: impl IntoIterator<Item = AggregateType>) -> Self {
        self.aggregate_types.extend(types);
        self
    }

    pub fn aggregate_id(mut self, id: impl Into<String>) -> Self {
        self.aggregate_ids.push(id.into());
        self
    }

    pub fn aggregate_ids(mut self, ids: impl IntoIterator<Item = String>) -> Self {
        self.aggregate_ids.extend(ids);
        self
    }

    pub fn resource_owner(mut self, owner: impl Into<String>) -> Self {
        self.resource_owner = Some(owner.into());
        self
    }

    pub fn event_types(mut self, types: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.event_types.extend(types.into_iter().map(Into::into));
        self
    }

    pub fn sequence_greater(mut self, sequence: u64) -> Self {
        self.sequence_greater = Some(sequence);
        self
    }

    pub fn position_greater(mut self, position: u64) -> Self {
        self.position_greater = Some(position);
        self
    }

    pub fn event_data(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.event_data.insert(field.into(), value.into());
        self
    }

    pub fn order(mut self, order: Order) -> Self {
        self.order = order;
        self
    }

    pub fn descending(self) -> Self {
        self.order(Order::Desc)
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Read the log as it was at `as_of`.
    pub fn allow_time_travel(mut self, as_of: DateTime<Utc>) -> Self {
        self.as_of = Some(as_of);
        self
    }

    pub fn await_open_transactions(mut self) -> Self {
        self.await_open_transactions = true;
        self
    }

    /// Whether the filter restricts by anything a SQL backend cannot evaluate.
    pub fn has_data_predicates(&self) -> bool {
        !self.event_data.is_empty()
    }

    /// Structural match, without event data predicates.
    pub fn matches_event(&self, event: &Event) -> bool {
        if !self.aggregate_types.is_empty() && !self.aggregate_types.contains(&event.aggregate_type)
        {
            return false;
        }
        if !self.aggregate_ids.is_empty() && !self.aggregate_ids.contains(&event.aggregate_id) {
            return false;
        }
        if let Some(owner) = &self.resource_owner {
            if owner != &event.resource_owner {
                return false;
            }
        }
        if !self.event_types.is_empty()
            && !self.event_types.iter().any(|t| t == event.event_type())
        {
            return false;
        }
        if let Some(seq) = self.sequence_greater {
            if event.sequence <= seq {
                return false;
            }
        }
        if let Some(pos) = self.position_greater {
            if event.position <= pos {
                return false;
            }
        }
        if let Some(as_of) = self.as_of {
            if event.creation_date > as_of {
                return false;
            }
        }
        true
    }

    /// Match event data predicates against a serialized payload.
    pub fn matches_data(&self, payload: &Value) -> bool {
        self.event_data
            .iter()
            .all(|(path, expected)| lookup(payload, path) == Some(expected))
    }

    /// Whether an aggregate falls under this filter; used to decide which
    /// open transactions a query has to wait for.
    pub fn touches(&self, aggregate_type: AggregateType, aggregate_id: &str) -> bool {
        (self.aggregate_types.is_empty() || self.aggregate_types.contains(&aggregate_type))
            && (self.aggregate_ids.is_empty() || self.aggregate_ids.iter().any(|id| id == aggregate_id))
    }
}

fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(value, |current, segment| current.get(segment))
}
