//! In-memory EventStore implementation.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{broadcast, RwLock};

use crate::model::{AggregateType, Event};
use crate::storage::helpers::{check_expected_sequence, post_filter, validate_filter};
use crate::storage::{
    AppendRequest, EventFilter, EventStore, Order, Result, StorageError, TransactionTracker,
};

const NOTIFY_CAPACITY: usize = 1024;

#[derive(Default)]
struct Log {
    /// All events in position order; `events[i].position == i + 1`.
    events: Vec<Event>,
    heads: HashMap<(AggregateType, String), u64>,
}

/// Event store that keeps the log in memory.
pub struct MockEventStore {
    log: RwLock<Log>,
    transactions: TransactionTracker,
    notify: broadcast::Sender<u64>,
    fail_on_push: RwLock<bool>,
    fail_on_query: RwLock<bool>,
    push_delay: RwLock<Option<Duration>>,
}

impl Default for MockEventStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MockEventStore {
    pub fn new() -> Self {
        let (notify, _) = broadcast::channel(NOTIFY_CAPACITY);
        Self {
            log: RwLock::new(Log::default()),
            transactions: TransactionTracker::new(),
            notify,
            fail_on_push: RwLock::new(false),
            fail_on_query: RwLock::new(false),
            push_delay: RwLock::new(None),
        }
    }

    pub async fn set_fail_on_push(&self, fail: bool) {
        *self.fail_on_push.write().await = fail;
    }

    pub async fn set_fail_on_query(&self, fail: bool) {
        *self.fail_on_query.write().await = fail;
    }

    /// Keep every push's transaction open for `delay` before it commits.
    pub async fn set_push_delay(&self, delay: Option<Duration>) {
        *self.push_delay.write().await = delay;
    }

    pub fn transactions(&self) -> &TransactionTracker {
        &self.transactions
    }

    pub async fn event_count(&self) -> usize {
        self.log.read().await.events.len()
    }
}

#[async_trait]
impl EventStore for MockEventStore {
    async fn push(&self, appends: Vec<AppendRequest>) -> Result<Vec<Event>> {
        if *self.fail_on_push.read().await {
            return Err(StorageError::Unavailable("push disabled".to_string()));
        }

        let _tx = self.transactions.begin(
            appends
                .iter()
                .map(|a| (a.aggregate_type, a.aggregate_id.clone()))
                .collect(),
        );
        if let Some(delay) = *self.push_delay.read().await {
            tokio::time::sleep(delay).await;
        }

        let mut log = self.log.write().await;

        // Validate every stream before writing anything. Several requests
        // for one stream chain: each expects the head the previous left.
        let mut heads: HashMap<(AggregateType, String), u64> = HashMap::new();
        for append in &appends {
            let key = (append.aggregate_type, append.aggregate_id.clone());
            let current = match heads.get(&key) {
                Some(head) => *head,
                None => log.heads.get(&key).copied().unwrap_or(0),
            };
            check_expected_sequence(append, current)?;
            heads.insert(key, current + append.events.len() as u64);
        }

        let now = Utc::now();
        let mut stored = Vec::new();
        for append in appends {
            let key = (append.aggregate_type, append.aggregate_id.clone());
            let mut sequence = append.expected_sequence;
            for pending in append.events {
                sequence += 1;
                let event = Event {
                    aggregate_type: append.aggregate_type,
                    aggregate_id: append.aggregate_id.clone(),
                    sequence,
                    position: log.events.len() as u64 + 1,
                    resource_owner: append.resource_owner.clone(),
                    creation_date: now,
                    editor: pending.editor,
                    payload: pending.payload,
                };
                log.events.push(event.clone());
                stored.push(event);
            }
            log.heads.insert(key, sequence);
        }

        let latest = log.events.len() as u64;
        drop(log);

        if !stored.is_empty() {
            // No receivers is fine.
            let _ = self.notify.send(latest);
        }
        Ok(stored)
    }

    async fn query(&self, filter: &EventFilter) -> Result<Vec<Event>> {
        if *self.fail_on_query.read().await {
            return Err(StorageError::Unavailable("query disabled".to_string()));
        }
        validate_filter(filter)?;

        if filter.await_open_transactions {
            self.transactions.await_before(Instant::now(), filter).await;
        }

        let log = self.log.read().await;
        let matched: Vec<Event> = match filter.order {
            Order::Asc => log
                .events
                .iter()
                .filter(|e| filter.matches_event(e))
                .cloned()
                .collect(),
            Order::Desc => log
                .events
                .iter()
                .rev()
                .filter(|e| filter.matches_event(e))
                .cloned()
                .collect(),
        };
        drop(log);

        post_filter(matched, filter)
    }

    async fn current_sequence(
        &self,
        aggregate_type: AggregateType,
        aggregate_id: &str,
    ) -> Result<u64> {
        let log = self.log.read().await;
        Ok(log
            .heads
            .get(&(aggregate_type, aggregate_id.to_string()))
            .copied()
            .unwrap_or(0))
    }

    async fn latest_position(&self) -> Result<u64> {
        Ok(self.log.read().await.events.len() as u64)
    }

    fn subscribe(&self) -> broadcast::Receiver<u64> {
        self.notify.subscribe()
    }
}
