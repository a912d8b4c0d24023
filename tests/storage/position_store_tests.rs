//! PositionStore interface tests.
//!
//! These tests verify the contract of the PositionStore trait.
//! Each storage implementation should run these tests.

use uuid::Uuid;

use palisade::model::AggregateType;
use palisade::storage::PositionStore;

fn projection(name: &str) -> String {
    format!("test_{}_{}", name, Uuid::new_v4().simple())
}

pub async fn test_get_nonexistent<S: PositionStore>(store: &S) {
    let projection = projection("nonexistent");

    let watermark = store
        .get(&projection, AggregateType::Group, "g1")
        .await
        .expect("get should succeed");
    let cursor = store.get_cursor(&projection).await.expect("get_cursor should succeed");

    assert_eq!(watermark, None);
    assert_eq!(cursor, 0);
}

pub async fn test_put_and_get<S: PositionStore>(store: &S) {
    let projection = projection("put_get");

    store
        .put(&projection, AggregateType::Group, "g1", 4)
        .await
        .expect("put should succeed");

    assert_eq!(
        store.get(&projection, AggregateType::Group, "g1").await.unwrap(),
        Some(4)
    );
}

pub async fn test_watermark_never_moves_back<S: PositionStore>(store: &S) {
    let projection = projection("monotonic");

    store.put(&projection, AggregateType::Group, "g1", 5).await.unwrap();
    store.put(&projection, AggregateType::Group, "g1", 3).await.unwrap();
    assert_eq!(
        store.get(&projection, AggregateType::Group, "g1").await.unwrap(),
        Some(5)
    );

    store.put(&projection, AggregateType::Group, "g1", 7).await.unwrap();
    assert_eq!(
        store.get(&projection, AggregateType::Group, "g1").await.unwrap(),
        Some(7)
    );
}

pub async fn test_watermark_isolation<S: PositionStore>(store: &S) {
    let first = projection("iso_a");
    let second = projection("iso_b");

    store.put(&first, AggregateType::Group, "x", 2).await.unwrap();
    store.put(&first, AggregateType::Project, "x", 9).await.unwrap();

    assert_eq!(store.get(&second, AggregateType::Group, "x").await.unwrap(), None);
    assert_eq!(store.get(&first, AggregateType::Group, "x").await.unwrap(), Some(2));
    assert_eq!(store.get(&first, AggregateType::Project, "x").await.unwrap(), Some(9));
    assert_eq!(store.get(&first, AggregateType::Group, "y").await.unwrap(), None);
}

pub async fn test_cursor_put_and_get<S: PositionStore>(store: &S) {
    let projection = projection("cursor");

    store.put_cursor(&projection, 10).await.unwrap();
    store.put_cursor(&projection, 12).await.unwrap();

    assert_eq!(store.get_cursor(&projection).await.unwrap(), 12);
}

pub async fn test_reset_forgets_projection<S: PositionStore>(store: &S) {
    let other = projection("reset_other");
    let projection = projection("reset");
    store.put(&projection, AggregateType::Group, "g1", 3).await.unwrap();
    store.put_cursor(&projection, 30).await.unwrap();
    store.put_cursor(&other, 5).await.unwrap();

    store.reset(&projection).await.expect("reset should succeed");

    assert_eq!(store.get(&projection, AggregateType::Group, "g1").await.unwrap(), None);
    assert_eq!(store.get_cursor(&projection).await.unwrap(), 0);
    assert_eq!(store.get_cursor(&other).await.unwrap(), 5);
}

/// Run all PositionStore interface tests against a store implementation.
#[macro_export]
macro_rules! run_position_store_tests {
    ($store:expr) => {
        use $crate::storage::position_store_tests::*;

        test_get_nonexistent($store).await;
        println!("  test_get_nonexistent: PASSED");

        test_put_and_get($store).await;
        println!("  test_put_and_get: PASSED");

        test_watermark_never_moves_back($store).await;
        println!("  test_watermark_never_moves_back: PASSED");

        test_watermark_isolation($store).await;
        println!("  test_watermark_isolation: PASSED");

        test_cursor_put_and_get($store).await;
        println!("  test_cursor_put_and_get: PASSED");

        test_reset_forgets_projection($store).await;
        println!("  test_reset_forgets_projection: PASSED");
    };
}
