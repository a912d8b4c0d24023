//! Tracking of in-flight write transactions.
//!
//! Readers that set `EventFilter::await_open_transactions` wait until every
//! write that began before the read and touches a matched aggregate has
//! either committed or rolled back. Projections rely on this so that a
//! position they have already passed is never filled in later.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use tokio::sync::watch;
use tracing::debug;

use super::EventFilter;
use crate::model::AggregateType;

struct OpenTransaction {
    started: Instant,
    streams: Vec<(AggregateType, String)>,
}

struct Inner {
    next_id: AtomicU64,
    open: Mutex<HashMap<u64, OpenTransaction>>,
    generation: watch::Sender<u64>,
}

impl Inner {
    /// The registry, recovered if a writer panicked while holding it.
    fn open(&self) -> MutexGuard<'_, HashMap<u64, OpenTransaction>> {
        self.open.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Registry of open write transactions, shared by a store and its readers.
#[derive(Clone)]
pub struct TransactionTracker {
    inner: Arc<Inner>,
}

impl Default for TransactionTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionTracker {
    pub fn new() -> Self {
        let (generation, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                next_id: AtomicU64::new(1),
                open: Mutex::new(HashMap::new()),
                generation,
            }),
        }
    }

    /// Register a write touching `streams`. The returned guard closes the
    /// transaction when dropped, whether it committed or not.
    pub fn begin(&self, streams: Vec<(AggregateType, String)>) -> TransactionGuard {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.open().insert(
            id,
            OpenTransaction {
                started: Instant::now(),
                streams,
            },
        );
        TransactionGuard {
            inner: Arc::clone(&self.inner),
            id,
        }
    }

    /// Number of currently open transactions.
    pub fn open_count(&self) -> usize {
        self.inner.open().len()
    }

    /// Wait until no transaction that started at or before `started` and
    /// touches an aggregate matched by `filter` is still open.
    pub async fn await_before(&self, started: Instant, filter: &EventFilter) {
        loop {
            // Subscribe before checking so a close between check and wait
            // is still observed.
            let mut rx = self.inner.generation.subscribe();
            if !self.blocks(started, filter) {
                return;
            }
            debug!("Waiting for open transactions before reading");
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    fn blocks(&self, started: Instant, filter: &EventFilter) -> bool {
        self.inner.open().values().any(|tx| {
            tx.started <= started
                && tx
                    .streams
                    .iter()
                    .any(|(aggregate_type, id)| filter.touches(*aggregate_type, id))
        })
    }
}

/// Open transaction handle. Dropping it closes the transaction.
pub struct TransactionGuard {
    inner: Arc<Inner>,
    id: u64,
}

impl Drop for TransactionGuard {
    fn drop(&mut self) {
        self.inner.open().remove(&self.id);
        self.inner.generation.send_modify(|g| *g += 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_await_returns_immediately_without_open_transactions() {
        let tracker = TransactionTracker::new();
        tokio::time::timeout(
            Duration::from_millis(100),
            tracker.await_before(Instant::now(), &EventFilter::new()),
        )
        .await
        .expect("should not block");
    }

    #[tokio::test]
    async fn test_await_blocks_until_guard_dropped() {
        let tracker = TransactionTracker::new();
        let guard = tracker.begin(vec![(AggregateType::Group, "g1".to_string())]);
        assert_eq!(tracker.open_count(), 1);

        let waiter = {
            let tracker = tracker.clone();
            tokio::spawn(async move {
                tracker
                    .await_before(
                        Instant::now(),
                        &EventFilter::stream(AggregateType::Group, "g1"),
                    )
                    .await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should finish")
            .unwrap();
        assert_eq!(tracker.open_count(), 0);
    }

    #[tokio::test]
    async fn test_unrelated_stream_does_not_block() {
        let tracker = TransactionTracker::new();
        let _guard = tracker.begin(vec![(AggregateType::Project, "p1".to_string())]);
        tokio::time::timeout(
            Duration::from_millis(100),
            tracker.await_before(
                Instant::now(),
                &EventFilter::stream(AggregateType::Group, "g1"),
            ),
        )
        .await
        .expect("should not block");
    }

    #[tokio::test]
    async fn test_poisoned_registry_still_blocks_readers() {
        let tracker = TransactionTracker::new();
        let poisoner = tracker.clone();
        let _ = std::thread::spawn(move || {
            let _open = poisoner.inner.open.lock().unwrap();
            panic!("writer panicked while registering");
        })
        .join();
        assert!(tracker.inner.open.is_poisoned());

        let guard = tracker.begin(vec![(AggregateType::Group, "g1".to_string())]);
        assert_eq!(tracker.open_count(), 1);
        let blocked = tokio::time::timeout(
            Duration::from_millis(20),
            tracker.await_before(
                Instant::now(),
                &EventFilter::stream(AggregateType::Group, "g1"),
            ),
        )
        .await;
        assert!(blocked.is_err());

        drop(guard);
        assert_eq!(tracker.open_count(), 0);
    }

    #[tokio::test]
    async fn test_later_transaction_does_not_block() {
        let tracker = TransactionTracker::new();
        let started = Instant::now();
        tokio::time::sleep(Duration::from_millis(5)).await;
        let _guard = tracker.begin(vec![(AggregateType::Group, "g1".to_string())]);
        tokio::time::timeout(
            Duration::from_millis(100),
            tracker.await_before(started, &EventFilter::new()),
        )
        .await
        .expect("should not block");
    }
}
