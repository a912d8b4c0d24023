//! SQLite implementations of storage interfaces.

mod event_store;
mod position_store;
mod snapshot_store;

pub use event_store::SqliteEventStore;
pub use position_store::SqlitePositionStore;
pub use snapshot_store::SqliteSnapshotStore;

use chrono::{DateTime, SecondsFormat, Utc};

/// Fixed-width RFC3339 so stored timestamps compare correctly as text.
pub(crate) fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}
