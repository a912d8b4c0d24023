use serde::Deserialize;

use super::*;
use crate::model::{Editor, EventPayload, PendingEvent};
use crate::storage::mock::{MockEventStore, MockSnapshotStore};
use crate::storage::SnapshotStore;

/// Records the names a group went through.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct NameHistory {
    names: Vec<String>,
}

impl WriteModel for NameHistory {
    fn apply(&mut self, event: &Event) {
        match &event.payload {
            EventPayload::GroupAdded { name, .. } => self.names.push(name.clone()),
            EventPayload::GroupChanged { name: Some(name), .. } => self.names.push(name.clone()),
            _ => {}
        }
    }
}

fn renamed(name: &str) -> PendingEvent {
    PendingEvent::new(
        Editor::system(),
        EventPayload::GroupChanged {
            name: Some(name.to_string()),
            description: None,
        },
    )
}

fn added(name: &str) -> PendingEvent {
    PendingEvent::new(
        Editor::system(),
        EventPayload::GroupAdded {
            name: name.to_string(),
            description: String::new(),
        },
    )
}

fn repo(
    events: Arc<MockEventStore>,
    snapshots: Arc<MockSnapshotStore>,
    interval: u64,
) -> WriteModelRepository {
    WriteModelRepository::new(events, SnapshotRepository::new(snapshots), interval)
}

#[tokio::test]
async fn test_load_returns_default_for_new_aggregate() {
    let repo = repo(
        Arc::new(MockEventStore::new()),
        Arc::new(MockSnapshotStore::new()),
        100,
    );

    let loaded: Loaded<NameHistory> = repo.load(AggregateType::Group, "g1").await.unwrap();

    assert_eq!(loaded.sequence, 0);
    assert!(loaded.model.names.is_empty());
    assert!(loaded.resource_owner.is_empty());
}

#[tokio::test]
async fn test_load_folds_events_in_order() {
    let events = Arc::new(MockEventStore::new());
    events
        .append(
            AggregateType::Group,
            "g1",
            "org1",
            0,
            vec![added("a"), renamed("b"), renamed("c")],
        )
        .await
        .unwrap();
    let repo = repo(events, Arc::new(MockSnapshotStore::new()), 100);

    let loaded: Loaded<NameHistory> = repo.load(AggregateType::Group, "g1").await.unwrap();

    assert_eq!(loaded.model.names, vec!["a", "b", "c"]);
    assert_eq!(loaded.sequence, 3);
    assert_eq!(loaded.resource_owner, "org1");
    assert_eq!(loaded.receipt().sequence, 3);
    assert_eq!(loaded.append().expected_sequence, 3);
}

#[tokio::test]
async fn test_load_writes_snapshot_after_interval() {
    let events = Arc::new(MockEventStore::new());
    let snapshots = Arc::new(MockSnapshotStore::new());
    events
        .append(
            AggregateType::Group,
            "g1",
            "org1",
            0,
            vec![added("a"), renamed("b")],
        )
        .await
        .unwrap();
    let repo = repo(events, snapshots.clone(), 2);

    let _: Loaded<NameHistory> = repo.load(AggregateType::Group, "g1").await.unwrap();

    let snapshot = snapshots
        .get(AggregateType::Group, "g1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(snapshot.sequence, 2);
    assert_eq!(snapshot.state["names"], serde_json::json!(["a", "b"]));
}

#[tokio::test]
async fn test_load_resumes_after_snapshot_sequence() {
    let events = Arc::new(MockEventStore::new());
    let snapshots = Arc::new(MockSnapshotStore::new());
    events
        .append(
            AggregateType::Group,
            "g1",
            "org1",
            0,
            vec![added("a"), renamed("b"), renamed("c")],
        )
        .await
        .unwrap();

    // Snapshot state deliberately differs from the replayed state so the
    // test can tell which events were folded on top of it.
    snapshots
        .put(
            AggregateType::Group,
            "g1",
            Snapshot {
                sequence: 2,
                position: 2,
                resource_owner: "org1".to_string(),
                change_date: Utc::now(),
                state: serde_json::json!({ "names": ["from-snapshot"] }),
            },
        )
        .await
        .unwrap();
    let repo = repo(events, snapshots, 100);

    let loaded: Loaded<NameHistory> = repo.load(AggregateType::Group, "g1").await.unwrap();

    assert_eq!(loaded.model.names, vec!["from-snapshot", "c"]);
    assert_eq!(loaded.sequence, 3);
}

#[tokio::test]
async fn test_load_ignores_snapshot_when_reads_disabled() {
    let events = Arc::new(MockEventStore::new());
    let snapshots = Arc::new(MockSnapshotStore::new());
    events
        .append(AggregateType::Group, "g1", "org1", 0, vec![added("a")])
        .await
        .unwrap();
    snapshots
        .put(
            AggregateType::Group,
            "g1",
            Snapshot {
                sequence: 1,
                position: 1,
                resource_owner: "org1".to_string(),
                change_date: Utc::now(),
                state: serde_json::json!({ "names": ["stale"] }),
            },
        )
        .await
        .unwrap();
    let repo = WriteModelRepository::new(
        events,
        SnapshotRepository::with_config(snapshots, false, false),
        100,
    );

    let loaded: Loaded<NameHistory> = repo.load(AggregateType::Group, "g1").await.unwrap();

    assert_eq!(loaded.model.names, vec!["a"]);
}
