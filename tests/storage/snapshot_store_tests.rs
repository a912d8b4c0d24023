//! SnapshotStore interface tests.
//!
//! These tests verify the contract of the SnapshotStore trait.
//! Each storage implementation should run these tests.

use chrono::{TimeZone, Utc};
use serde_json::json;
use uuid::Uuid;

use palisade::model::AggregateType;
use palisade::storage::{Snapshot, SnapshotStore};

fn new_id(prefix: &str) -> String {
    format!("{}_{}", prefix, Uuid::new_v4().simple())
}

/// Create a test snapshot at the given sequence.
pub fn make_snapshot(sequence: u64) -> Snapshot {
    Snapshot {
        sequence,
        position: sequence * 10,
        resource_owner: "org1".to_string(),
        change_date: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        state: json!({"state": "active", "name": format!("v{sequence}")}),
    }
}

pub async fn test_get_nonexistent<S: SnapshotStore>(store: &S) {
    let snapshot = store
        .get(AggregateType::Group, &new_id("test_snap_none"))
        .await
        .expect("get should succeed");
    assert!(snapshot.is_none());
}

pub async fn test_put_and_get_preserves_data<S: SnapshotStore>(store: &S) {
    let id = new_id("test_snap_data");

    store
        .put(AggregateType::Group, &id, make_snapshot(3))
        .await
        .expect("put should succeed");

    let snapshot = store.get(AggregateType::Group, &id).await.unwrap();
    assert_eq!(snapshot, Some(make_snapshot(3)));
}

pub async fn test_put_replaces_older<S: SnapshotStore>(store: &S) {
    let id = new_id("test_snap_replace");

    store.put(AggregateType::Project, &id, make_snapshot(2)).await.unwrap();
    store.put(AggregateType::Project, &id, make_snapshot(5)).await.unwrap();

    let snapshot = store.get(AggregateType::Project, &id).await.unwrap().unwrap();
    assert_eq!(snapshot.sequence, 5);
    assert_eq!(snapshot.state["name"], "v5");
}

pub async fn test_delete<S: SnapshotStore>(store: &S) {
    let id = new_id("test_snap_delete");
    store.put(AggregateType::Group, &id, make_snapshot(1)).await.unwrap();

    store.delete(AggregateType::Group, &id).await.expect("delete should succeed");
    store
        .delete(AggregateType::Group, &new_id("test_snap_never"))
        .await
        .expect("deleting a missing snapshot should succeed");

    assert!(store.get(AggregateType::Group, &id).await.unwrap().is_none());
}

pub async fn test_aggregate_type_isolation<S: SnapshotStore>(store: &S) {
    let id = new_id("test_snap_iso");
    store.put(AggregateType::Group, &id, make_snapshot(1)).await.unwrap();

    assert!(store.get(AggregateType::Project, &id).await.unwrap().is_none());
}

/// Run all SnapshotStore interface tests against a store implementation.
#[macro_export]
macro_rules! run_snapshot_store_tests {
    ($store:expr) => {
        use $crate::storage::snapshot_store_tests::*;

        test_get_nonexistent($store).await;
        println!("  test_get_nonexistent: PASSED");

        test_put_and_get_preserves_data($store).await;
        println!("  test_put_and_get_preserves_data: PASSED");

        test_put_replaces_older($store).await;
        println!("  test_put_replaces_older: PASSED");

        test_delete($store).await;
        println!("  test_delete: PASSED");

        test_aggregate_type_isolation($store).await;
        println!("  test_aggregate_type_isolation: PASSED");
    };
}
