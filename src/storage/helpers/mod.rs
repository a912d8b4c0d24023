//! Shared storage helper functions.
//!
//! Concurrency checks, post-filtering and timestamp parsing used by both
//! storage backends.

use chrono::{DateTime, Utc};

use super::{AppendRequest, EventFilter, Result, StorageError};
use crate::model::Event;

/// Reject an append whose expected sequence does not match the stream.
pub fn check_expected_sequence(request: &AppendRequest, current: u64) -> Result<()> {
    if request.expected_sequence != current {
        return Err(StorageError::ConcurrencyConflict {
            aggregate_type: request.aggregate_type,
            aggregate_id: request.aggregate_id.clone(),
            expected: request.expected_sequence,
            actual: current,
        });
    }
    Ok(())
}

/// Reject a filter no backend can evaluate.
pub fn validate_filter(filter: &EventFilter) -> Result<()> {
    if filter.limit == Some(0) {
        return Err(StorageError::InvalidFilter("limit must be positive".to_string()));
    }
    if filter.event_data.keys().any(|k| k.is_empty() || k.split('.').any(str::is_empty)) {
        return Err(StorageError::InvalidFilter(
            "event data path must not contain empty segments".to_string(),
        ));
    }
    Ok(())
}

/// Apply event data predicates and the limit to already ordered events.
///
/// Data predicates run on the serialized payload, so the limit can only be
/// applied afterwards.
pub fn post_filter(events: Vec<Event>, filter: &EventFilter) -> Result<Vec<Event>> {
    let limit = filter.limit.unwrap_or(usize::MAX);
    if !filter.has_data_predicates() {
        return Ok(events.into_iter().take(limit).collect());
    }

    let mut out = Vec::new();
    for event in events {
        if out.len() >= limit {
            break;
        }
        if filter.matches_data(&event.payload.to_json()?) {
            out.push(event);
        }
    }
    Ok(out)
}

/// Parse an RFC3339 timestamp as stored by the SQL backend.
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::InvalidTimestamp(format!("{value}: {e}")))
}
