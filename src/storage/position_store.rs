//! PositionStore trait definition.

use async_trait::async_trait;

use super::Result;
use crate::model::AggregateType;

/// Interface for projection watermarks.
///
/// Each projection records two kinds of progress:
///
/// - a per-aggregate watermark: the highest sequence of
///   `(aggregate_type, aggregate_id)` the projection has applied. The
///   consistency coordinator compares it with a write receipt.
/// - a cursor: the highest global position the projection has processed.
///   The projection resumes from it after a restart.
///
/// # Implementations
///
/// - `SqlitePositionStore`: SQLite storage
/// - `MockPositionStore`: In-memory storage
#[async_trait]
pub trait PositionStore: Send + Sync {
    /// Get the watermark of one aggregate for a projection.
    ///
    /// Returns `None` if the projection has not seen the aggregate.
    async fn get(
        &self,
        projection: &str,
        aggregate_type: AggregateType,
        aggregate_id: &str,
    ) -> Result<Option<u64>>;

    /// Store the watermark of one aggregate for a projection.
    ///
    /// Upserts. Watermarks never move backwards: storing a lower sequence
    /// than the recorded one is a no-op.
    async fn put(
        &self,
        projection: &str,
        aggregate_type: AggregateType,
        aggregate_id: &str,
        sequence: u64,
    ) -> Result<()>;

    /// Get the global cursor of a projection; 0 if it never ran.
    async fn get_cursor(&self, projection: &str) -> Result<u64>;

    /// Store the global cursor of a projection.
    async fn put_cursor(&self, projection: &str, position: u64) -> Result<()>;

    /// Forget all watermarks and the cursor of a projection.
    async fn reset(&self, projection: &str) -> Result<()>;
}
