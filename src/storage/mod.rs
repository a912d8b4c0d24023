//! Storage: event log, snapshots and projection positions.
//!
//! This module contains:
//! - `EventStore` trait: append-only, per-aggregate ordered log
//! - `SnapshotStore` trait: write model snapshots
//! - `PositionStore` trait: projection watermarks
//! - Implementations: in-memory (`mock`), SQLite (`sqlite` feature)

use std::sync::Arc;

use tracing::info;

use crate::config::{StorageConfig, StorageType};
use crate::model::AggregateType;

pub mod event_store;
pub mod filter;
pub mod helpers;
pub mod mock;
pub mod position_store;
pub mod snapshot_store;
pub mod transactions;

#[cfg(feature = "sqlite")]
pub mod schema;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use event_store::{AppendRequest, EventStore};
pub use filter::{EventFilter, Order};
pub use mock::{MockEventStore, MockPositionStore, MockSnapshotStore};
pub use position_store::PositionStore;
pub use snapshot_store::{Snapshot, SnapshotStore};
pub use transactions::TransactionTracker;

#[cfg(feature = "sqlite")]
pub use sqlite::{SqliteEventStore, SqlitePositionStore, SqliteSnapshotStore};

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error(
        "Concurrency conflict on {aggregate_type}/{aggregate_id}: expected sequence {expected}, found {actual}"
    )]
    ConcurrencyConflict {
        aggregate_type: AggregateType,
        aggregate_id: String,
        expected: u64,
        actual: u64,
    },

    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Unknown aggregate type: {0}")]
    UnknownAggregateType(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[cfg(feature = "sqlite")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Storage handles shared by the core.
#[derive(Clone)]
pub struct Stores {
    pub events: Arc<dyn EventStore>,
    pub snapshots: Arc<dyn SnapshotStore>,
    pub positions: Arc<dyn PositionStore>,
}

impl Stores {
    /// In-memory stores, mainly for tests and embedded use.
    pub fn in_memory() -> Self {
        Self {
            events: Arc::new(MockEventStore::new()),
            snapshots: Arc::new(MockSnapshotStore::new()),
            positions: Arc::new(MockPositionStore::new()),
        }
    }
}

/// Initialize storage based on configuration.
pub async fn init_storage(
    config: &StorageConfig,
) -> std::result::Result<Stores, Box<dyn std::error::Error + Send + Sync>> {
    match config.storage_type {
        StorageType::Memory => {
            info!("Storage: in-memory");
            Ok(Stores::in_memory())
        }
        #[cfg(feature = "sqlite")]
        StorageType::Sqlite => {
            info!("Storage: sqlite at {}", config.sqlite.path);

            if let Some(parent) = std::path::Path::new(&config.sqlite.path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }

            let pool =
                sqlx::SqlitePool::connect(&format!("sqlite:{}?mode=rwc", config.sqlite.path))
                    .await?;

            let events = SqliteEventStore::new(pool.clone());
            events.init().await?;
            let snapshots = SqliteSnapshotStore::new(pool.clone());
            snapshots.init().await?;
            let positions = SqlitePositionStore::new(pool);
            positions.init().await?;

            Ok(Stores {
                events: Arc::new(events),
                snapshots: Arc::new(snapshots),
                positions: Arc::new(positions),
            })
        }
        #[cfg(not(feature = "sqlite"))]
        StorageType::Sqlite => {
            tracing::error!("SQLite storage requested but 'sqlite' feature is not enabled");
            Err("SQLite feature not enabled".into())
        }
    }
}
