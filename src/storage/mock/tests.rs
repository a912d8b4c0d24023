use std::sync::Arc;
use std::time::Duration;

use crate::model::{AggregateType, Editor, EventPayload, PendingEvent};
use crate::storage::{AppendRequest, EventFilter, EventStore, PositionStore, StorageError};

use super::*;

fn group_added(name: &str) -> PendingEvent {
    PendingEvent::new(
        Editor::system(),
        EventPayload::GroupAdded {
            name: name.to_string(),
            description: String::new(),
        },
    )
}

#[tokio::test]
async fn test_fail_on_push() {
    let store = MockEventStore::new();
    store.set_fail_on_push(true).await;

    let result = store
        .append(AggregateType::Group, "g1", "org1", 0, vec![group_added("a")])
        .await;
    assert!(matches!(result, Err(StorageError::Unavailable(_))));
    assert_eq!(store.event_count().await, 0);
}

#[tokio::test]
async fn test_fail_on_query() {
    let store = MockEventStore::new();
    store.set_fail_on_query(true).await;
    assert!(store.query(&EventFilter::new()).await.is_err());
}

#[tokio::test]
async fn test_multi_request_push_chains_same_stream() {
    let store = MockEventStore::new();
    let stored = store
        .push(vec![
            AppendRequest::new(AggregateType::Group, "g1", "org1", 0).with_event(group_added("a")),
            AppendRequest::new(AggregateType::Group, "g1", "org1", 1).with_event(
                PendingEvent::new(Editor::system(), EventPayload::GroupRemoved),
            ),
        ])
        .await
        .unwrap();
    let sequences: Vec<u64> = stored.iter().map(|e| e.sequence).collect();
    assert_eq!(sequences, vec![1, 2]);
}

#[tokio::test]
async fn test_await_open_transactions_sees_slow_writer() {
    let store = Arc::new(MockEventStore::new());
    store.set_push_delay(Some(Duration::from_millis(50))).await;

    let writer = {
        let store = Arc::clone(&store);
        tokio::spawn(async move {
            store
                .append(AggregateType::Group, "g1", "org1", 0, vec![group_added("a")])
                .await
        })
    };

    // Let the writer open its transaction.
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(store.transactions().open_count(), 1);

    let plain = store.query(&EventFilter::new()).await.unwrap();
    assert!(plain.is_empty());

    let awaited = store
        .query(&EventFilter::new().await_open_transactions())
        .await
        .unwrap();
    assert_eq!(awaited.len(), 1);

    writer.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_position_store_reset_only_touches_projection() {
    let store = MockPositionStore::new();
    store.put("a", AggregateType::Group, "g1", 3).await.unwrap();
    store.put("b", AggregateType::Group, "g1", 4).await.unwrap();
    store.put_cursor("a", 10).await.unwrap();

    store.reset("a").await.unwrap();

    assert_eq!(store.get("a", AggregateType::Group, "g1").await.unwrap(), None);
    assert_eq!(store.get_cursor("a").await.unwrap(), 0);
    assert_eq!(
        store.get("b", AggregateType::Group, "g1").await.unwrap(),
        Some(4)
    );
}

#[tokio::test]
async fn test_snapshot_store_counts() {
    use crate::storage::{Snapshot, SnapshotStore};

    let store = MockSnapshotStore::new();
    let snapshot = Snapshot {
        sequence: 5,
        position: 9,
        resource_owner: "org1".to_string(),
        change_date: chrono::Utc::now(),
        state: serde_json::json!({ "name": "a" }),
    };
    store
        .put(AggregateType::Group, "g1", snapshot)
        .await
        .unwrap();
    assert_eq!(store.stored_count().await, 1);

    store.delete(AggregateType::Group, "g1").await.unwrap();
    assert_eq!(store.stored_count().await, 0);
}
