use chrono::Utc;

use super::*;
use crate::storage::mock::MockPositionStore;

const PROJECTION: &str = "projections.groups";
const TRACKS: &[AggregateType] = &[AggregateType::Group, AggregateType::Org];

fn receipt(aggregate_type: AggregateType, sequence: u64, position: u64) -> ChangeReceipt {
    ChangeReceipt {
        aggregate_type,
        aggregate_id: "g1".to_string(),
        sequence,
        position,
        change_date: Utc::now(),
        resource_owner: "org1".to_string(),
    }
}

fn config(timeout_ms: u64) -> ConsistencyConfig {
    ConsistencyConfig {
        timeout_ms,
        min_delay_ms: 5,
        max_delay_ms: 40,
        factor: 2.0,
        jitter: false,
    }
}

#[tokio::test]
async fn test_returns_once_watermark_reached() {
    let positions = Arc::new(MockPositionStore::new());
    positions
        .put(PROJECTION, AggregateType::Group, "g1", 3)
        .await
        .unwrap();
    let coordinator = Coordinator::new(positions, Arc::new(ManualClock::new()), &config(100));

    let result = coordinator
        .wait(
            PROJECTION,
            TRACKS,
            &receipt(AggregateType::Group, 3, 10),
            &CancelSignal::never(),
        )
        .await;

    assert!(result.is_ok());
}

#[tokio::test]
async fn test_stale_read_after_deadline() {
    let positions = Arc::new(MockPositionStore::new());
    positions
        .put(PROJECTION, AggregateType::Group, "g1", 1)
        .await
        .unwrap();
    let clock = ManualClock::new();
    let coordinator = Coordinator::new(positions, Arc::new(clock.clone()), &config(100));

    let err = coordinator
        .wait(
            PROJECTION,
            TRACKS,
            &receipt(AggregateType::Group, 2, 10),
            &CancelSignal::never(),
        )
        .await
        .unwrap_err();

    match err {
        Error::StaleRead {
            projection,
            required,
            observed,
        } => {
            assert_eq!(projection, PROJECTION);
            assert_eq!(required, 2);
            assert_eq!(observed, 1);
        }
        other => panic!("expected StaleRead, got {other:?}"),
    }
    // The last delay is cut to the deadline.
    assert_eq!(clock.now(), Duration::from_millis(100));
    assert!(err_is_retryable_stale());
}

fn err_is_retryable_stale() -> bool {
    Error::StaleRead {
        projection: String::new(),
        required: 1,
        observed: 0,
    }
    .is_retryable()
}

#[tokio::test]
async fn test_untracked_type_uses_cursor() {
    let positions = Arc::new(MockPositionStore::new());
    positions.put_cursor(PROJECTION, 10).await.unwrap();
    let coordinator = Coordinator::new(positions, Arc::new(ManualClock::new()), &config(50));

    let caught_up = coordinator
        .wait(
            PROJECTION,
            TRACKS,
            &receipt(AggregateType::UserGrant, 7, 10),
            &CancelSignal::never(),
        )
        .await;
    let behind = coordinator
        .wait(
            PROJECTION,
            TRACKS,
            &receipt(AggregateType::UserGrant, 7, 11),
            &CancelSignal::never(),
        )
        .await;

    assert!(caught_up.is_ok());
    assert!(matches!(behind, Err(Error::StaleRead { required: 11, .. })));
}

#[tokio::test]
async fn test_waits_for_projection_progress() {
    let positions = Arc::new(MockPositionStore::new());
    let coordinator = Coordinator::new(
        positions.clone(),
        Arc::new(TokioClock::default()),
        &config(2_000),
    );

    let writer = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        positions
            .put(PROJECTION, AggregateType::Group, "g1", 1)
            .await
            .unwrap();
    });

    let result = coordinator
        .wait(
            PROJECTION,
            TRACKS,
            &receipt(AggregateType::Group, 1, 1),
            &CancelSignal::never(),
        )
        .await;
    writer.await.unwrap();

    assert!(result.is_ok());
}

#[tokio::test]
async fn test_cancel_interrupts_wait() {
    let positions = Arc::new(MockPositionStore::new());
    let coordinator = Coordinator::new(
        positions,
        Arc::new(TokioClock::default()),
        &config(60_000),
    );
    let (handle, signal) = cancel_pair();

    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.cancel();
    });

    let started = std::time::Instant::now();
    let result = coordinator
        .wait(
            PROJECTION,
            TRACKS,
            &receipt(AggregateType::Group, 1, 1),
            &signal,
        )
        .await;
    canceller.await.unwrap();

    assert!(matches!(result, Err(Error::Cancelled)));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_already_cancelled_fails_fast() {
    let coordinator = Coordinator::new(
        Arc::new(MockPositionStore::new()),
        Arc::new(ManualClock::new()),
        &config(1_000),
    );
    let (handle, signal) = cancel_pair();
    handle.cancel();

    let result = coordinator
        .wait(
            PROJECTION,
            TRACKS,
            &receipt(AggregateType::Group, 1, 1),
            &signal,
        )
        .await;

    assert!(matches!(result, Err(Error::Cancelled)));
}

#[tokio::test]
async fn test_dropped_handle_never_cancels() {
    let (handle, mut signal) = cancel_pair();
    drop(handle);

    let fired = tokio::time::timeout(Duration::from_millis(20), signal.cancelled()).await;

    assert!(fired.is_err());
    assert!(!signal.is_cancelled());
}
