//! EventStore interface tests.
//!
//! These tests verify the contract of the EventStore trait.
//! Each storage implementation should run these tests.

use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use palisade::model::{AggregateType, Editor, EventPayload, PendingEvent};
use palisade::storage::{AppendRequest, EventFilter, EventStore, StorageError};

/// Unique aggregate ID, so tests sharing a store never collide.
pub fn new_id(prefix: &str) -> String {
    format!("{}_{}", prefix, Uuid::new_v4().simple())
}

pub fn group_added(name: &str) -> PendingEvent {
    PendingEvent::new(
        Editor::new("tester", "Tester"),
        EventPayload::GroupAdded {
            name: name.to_string(),
            description: String::new(),
        },
    )
}

pub fn group_renamed(name: &str) -> PendingEvent {
    PendingEvent::new(
        Editor::new("tester", "Tester"),
        EventPayload::GroupChanged {
            name: Some(name.to_string()),
            description: None,
        },
    )
}

// =============================================================================
// EventStore::push / append tests
// =============================================================================

pub async fn test_append_assigns_sequences_from_one<S: EventStore>(store: &S) {
    let id = new_id("test_seq");

    let sequence = store
        .append(
            AggregateType::Group,
            &id,
            "org1",
            0,
            vec![group_added("a"), group_renamed("b"), group_renamed("c")],
        )
        .await
        .expect("append should succeed");
    assert_eq!(sequence, 3);

    let events = store
        .query(&EventFilter::stream(AggregateType::Group, &id))
        .await
        .expect("query should succeed");
    let sequences: Vec<u64> = events.iter().map(|e| e.sequence).collect();
    assert_eq!(sequences, vec![1, 2, 3]);
    assert!(events.windows(2).all(|w| w[0].position < w[1].position));
    assert!(events.iter().all(|e| e.resource_owner == "org1"));
    assert_eq!(events[0].editor.user_id, "tester");
}

pub async fn test_sequential_appends_continue_sequence<S: EventStore>(store: &S) {
    let id = new_id("test_continue");

    store
        .append(AggregateType::Group, &id, "org1", 0, vec![group_added("a")])
        .await
        .expect("first append should succeed");
    let sequence = store
        .append(
            AggregateType::Group,
            &id,
            "org1",
            1,
            vec![group_renamed("b"), group_renamed("c")],
        )
        .await
        .expect("second append should succeed");

    assert_eq!(sequence, 3);
    assert_eq!(
        store
            .current_sequence(AggregateType::Group, &id)
            .await
            .unwrap(),
        3
    );
}

pub async fn test_stale_expected_sequence_conflicts<S: EventStore>(store: &S) {
    let id = new_id("test_conflict");
    store
        .append(
            AggregateType::Group,
            &id,
            "org1",
            0,
            vec![group_added("a"), group_renamed("b")],
        )
        .await
        .unwrap();

    let result = store
        .append(AggregateType::Group, &id, "org1", 1, vec![group_renamed("c")])
        .await;

    match result {
        Err(StorageError::ConcurrencyConflict {
            aggregate_id,
            expected,
            actual,
            ..
        }) => {
            assert_eq!(aggregate_id, id);
            assert_eq!(expected, 1);
            assert_eq!(actual, 2);
        }
        other => panic!("expected ConcurrencyConflict, got {other:?}"),
    }
    assert_eq!(
        store
            .current_sequence(AggregateType::Group, &id)
            .await
            .unwrap(),
        2
    );
}

pub async fn test_push_is_atomic_across_streams<S: EventStore>(store: &S) {
    let fresh = new_id("test_atomic_fresh");
    let existing = new_id("test_atomic_existing");
    store
        .append(
            AggregateType::Group,
            &existing,
            "org1",
            0,
            vec![group_added("a")],
        )
        .await
        .unwrap();

    let result = store
        .push(vec![
            AppendRequest::new(AggregateType::Group, &fresh, "org1", 0)
                .with_event(group_added("fresh")),
            AppendRequest::new(AggregateType::Group, &existing, "org1", 0)
                .with_event(group_added("stale")),
        ])
        .await;

    assert!(matches!(
        result,
        Err(StorageError::ConcurrencyConflict { .. })
    ));
    assert_eq!(
        store
            .current_sequence(AggregateType::Group, &fresh)
            .await
            .unwrap(),
        0,
        "no stream of a rejected batch may be written"
    );
}

pub async fn test_push_returns_events_in_append_order<S: EventStore>(store: &S) {
    let first = new_id("test_order_a");
    let second = new_id("test_order_b");

    let stored = store
        .push(vec![
            AppendRequest::new(AggregateType::Group, &first, "org1", 0)
                .with_events([group_added("a"), group_renamed("a2")]),
            AppendRequest::new(AggregateType::Project, &second, "org2", 0).with_event(
                PendingEvent::new(
                    Editor::system(),
                    EventPayload::ProjectAdded {
                        name: "p".to_string(),
                    },
                ),
            ),
        ])
        .await
        .expect("push should succeed");

    assert_eq!(stored.len(), 3);
    assert_eq!(stored[2].aggregate_id, second);
    assert_eq!(stored[2].sequence, 1);
    assert_eq!(stored[2].resource_owner, "org2");
    assert!(stored.windows(2).all(|w| w[0].position < w[1].position));
    assert_eq!(
        store.latest_position().await.unwrap(),
        stored[2].position,
        "latest position is the last committed one"
    );
}

pub async fn test_empty_request_only_asserts_sequence<S: EventStore>(store: &S) {
    let id = new_id("test_assert");
    store
        .append(AggregateType::Group, &id, "org1", 0, vec![group_added("a")])
        .await
        .unwrap();

    let ok = store
        .push(vec![AppendRequest::new(AggregateType::Group, &id, "org1", 1)])
        .await
        .expect("matching assertion should succeed");
    let stale = store
        .push(vec![AppendRequest::new(AggregateType::Group, &id, "org1", 0)])
        .await;

    assert!(ok.is_empty());
    assert!(matches!(stale, Err(StorageError::ConcurrencyConflict { .. })));
}

pub async fn test_concurrent_writers_one_wins<S: EventStore>(store: &S) {
    let id = new_id("test_race");
    store
        .append(AggregateType::Group, &id, "org1", 0, vec![group_added("a")])
        .await
        .unwrap();

    let (a, b) = futures::join!(
        store.append(AggregateType::Group, &id, "org1", 1, vec![group_renamed("x")]),
        store.append(AggregateType::Group, &id, "org1", 1, vec![group_renamed("y")]),
    );

    assert_eq!(
        [a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(),
        1,
        "exactly one writer at the same expected sequence succeeds"
    );
    assert_eq!(
        store
            .current_sequence(AggregateType::Group, &id)
            .await
            .unwrap(),
        2
    );
}

// =============================================================================
// EventStore::query tests
// =============================================================================

pub async fn test_query_empty_stream<S: EventStore>(store: &S) {
    let events = store
        .query(&EventFilter::stream(AggregateType::Group, new_id("test_none")))
        .await
        .expect("query should succeed");
    assert!(events.is_empty());
    assert_eq!(
        store
            .current_sequence(AggregateType::Group, &new_id("test_none"))
            .await
            .unwrap(),
        0
    );
}

pub async fn test_query_preserves_payload<S: EventStore>(store: &S) {
    let id = new_id("test_payload");
    store
        .append(AggregateType::Group, &id, "org1", 0, vec![group_added("Ops")])
        .await
        .unwrap();

    let events = store
        .query(&EventFilter::stream(AggregateType::Group, &id))
        .await
        .unwrap();

    assert_eq!(events[0].event_type(), "group.added");
    assert_eq!(
        events[0].payload,
        EventPayload::GroupAdded {
            name: "Ops".to_string(),
            description: String::new(),
        }
    );
}

pub async fn test_query_sequence_and_position_greater<S: EventStore>(store: &S) {
    let id = new_id("test_greater");
    store
        .append(
            AggregateType::Group,
            &id,
            "org1",
            0,
            vec![group_added("a"), group_renamed("b"), group_renamed("c")],
        )
        .await
        .unwrap();
    let all = store
        .query(&EventFilter::stream(AggregateType::Group, &id))
        .await
        .unwrap();

    let after_seq = store
        .query(&EventFilter::stream(AggregateType::Group, &id).sequence_greater(1))
        .await
        .unwrap();
    let after_pos = store
        .query(&EventFilter::stream(AggregateType::Group, &id).position_greater(all[1].position))
        .await
        .unwrap();

    assert_eq!(after_seq.len(), 2);
    assert_eq!(after_seq[0].sequence, 2);
    assert_eq!(after_pos.len(), 1);
    assert_eq!(after_pos[0].sequence, 3);
}

pub async fn test_query_by_owner_and_event_type<S: EventStore>(store: &S) {
    let owner = new_id("test_owner");
    let id = new_id("test_owner_group");
    store
        .append(
            AggregateType::Group,
            &id,
            &owner,
            0,
            vec![group_added("a"), group_renamed("b")],
        )
        .await
        .unwrap();
    store
        .append(
            AggregateType::Group,
            &new_id("test_other_owner"),
            "someone_else",
            0,
            vec![group_added("x")],
        )
        .await
        .unwrap();

    let owned = store
        .query(&EventFilter::new().resource_owner(owner.clone()))
        .await
        .unwrap();
    let changes = store
        .query(
            &EventFilter::new()
                .resource_owner(owner)
                .event_types(["group.changed"]),
        )
        .await
        .unwrap();

    assert_eq!(owned.len(), 2);
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].sequence, 2);
}

pub async fn test_query_event_data<S: EventStore>(store: &S) {
    let id = new_id("test_data");
    store
        .append(
            AggregateType::Group,
            &id,
            "org1",
            0,
            vec![group_added("alpha"), group_renamed("beta"), group_renamed("gamma")],
        )
        .await
        .unwrap();

    let events = store
        .query(
            &EventFilter::stream(AggregateType::Group, &id)
                .event_data("name", "beta")
                .limit(5),
        )
        .await
        .unwrap();

    assert_eq!(events.len(), 1);
    assert_eq!(events[0].sequence, 2);
}

pub async fn test_query_descending_with_limit<S: EventStore>(store: &S) {
    let id = new_id("test_desc");
    store
        .append(
            AggregateType::Group,
            &id,
            "org1",
            0,
            vec![group_added("a"), group_renamed("b"), group_renamed("c")],
        )
        .await
        .unwrap();

    let events = store
        .query(
            &EventFilter::stream(AggregateType::Group, &id)
                .descending()
                .limit(2),
        )
        .await
        .unwrap();

    let sequences: Vec<u64> = events.iter().map(|e| e.sequence).collect();
    assert_eq!(sequences, vec![3, 2]);
}

pub async fn test_query_time_travel<S: EventStore>(store: &S) {
    let id = new_id("test_travel");
    store
        .append(AggregateType::Group, &id, "org1", 0, vec![group_added("a")])
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    let as_of = Utc::now();
    tokio::time::sleep(Duration::from_millis(20)).await;
    store
        .append(AggregateType::Group, &id, "org1", 1, vec![group_renamed("b")])
        .await
        .unwrap();

    let then = store
        .query(&EventFilter::stream(AggregateType::Group, &id).allow_time_travel(as_of))
        .await
        .unwrap();

    assert_eq!(then.len(), 1);
    assert_eq!(then[0].sequence, 1);
}

pub async fn test_query_awaiting_open_transactions<S: EventStore>(store: &S) {
    let id = new_id("test_await");
    store
        .append(AggregateType::Group, &id, "org1", 0, vec![group_added("a")])
        .await
        .unwrap();

    let events = store
        .query(
            &EventFilter::stream(AggregateType::Group, &id).await_open_transactions(),
        )
        .await
        .unwrap();

    assert_eq!(events.len(), 1);
}

pub async fn test_subscribe_notifies_commits<S: EventStore>(store: &S) {
    let mut notifications = store.subscribe();
    let id = new_id("test_notify");

    store
        .append(AggregateType::Group, &id, "org1", 0, vec![group_added("a")])
        .await
        .unwrap();

    let position = tokio::time::timeout(Duration::from_secs(2), notifications.recv())
        .await
        .expect("notification should arrive")
        .expect("channel should be open");
    assert!(position >= 1);
    assert!(position <= store.latest_position().await.unwrap());
}

// =============================================================================
// Test runner macro
// =============================================================================

/// Run all EventStore interface tests against a store implementation.
#[macro_export]
macro_rules! run_event_store_tests {
    ($store:expr) => {
        use $crate::storage::event_store_tests::*;

        // push/append tests
        test_append_assigns_sequences_from_one($store).await;
        println!("  test_append_assigns_sequences_from_one: PASSED");

        test_sequential_appends_continue_sequence($store).await;
        println!("  test_sequential_appends_continue_sequence: PASSED");

        test_stale_expected_sequence_conflicts($store).await;
        println!("  test_stale_expected_sequence_conflicts: PASSED");

        test_push_is_atomic_across_streams($store).await;
        println!("  test_push_is_atomic_across_streams: PASSED");

        test_push_returns_events_in_append_order($store).await;
        println!("  test_push_returns_events_in_append_order: PASSED");

        test_empty_request_only_asserts_sequence($store).await;
        println!("  test_empty_request_only_asserts_sequence: PASSED");

        test_concurrent_writers_one_wins($store).await;
        println!("  test_concurrent_writers_one_wins: PASSED");

        // query tests
        test_query_empty_stream($store).await;
        println!("  test_query_empty_stream: PASSED");

        test_query_preserves_payload($store).await;
        println!("  test_query_preserves_payload: PASSED");

        test_query_sequence_and_position_greater($store).await;
        println!("  test_query_sequence_and_position_greater: PASSED");

        test_query_by_owner_and_event_type($store).await;
        println!("  test_query_by_owner_and_event_type: PASSED");

        test_query_event_data($store).await;
        println!("  test_query_event_data: PASSED");

        test_query_descending_with_limit($store).await;
        println!("  test_query_descending_with_limit: PASSED");

        test_query_time_travel($store).await;
        println!("  test_query_time_travel: PASSED");

        test_query_awaiting_open_transactions($store).await;
        println!("  test_query_awaiting_open_transactions: PASSED");

        test_subscribe_notifies_commits($store).await;
        println!("  test_subscribe_notifies_commits: PASSED");
    };
}
