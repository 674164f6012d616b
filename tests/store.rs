mod common;

use chrono::{Duration as ChronoDuration, Utc};
use common::{order, Harness};
use proximity_notifier::engine::orders::{self, ingest_orders};
use proximity_notifier::error::AppError;
use proximity_notifier::models::order::{OrderSource, OrderStatus};
use proximity_notifier::models::zone::ZoneKind;
use proximity_notifier::store::OrderStore;
use serde_json::{json, Value};
use std::time::Duration;

fn raw_orders(value: Value) -> Vec<Value> {
    serde_json::from_value(value).unwrap()
}

#[tokio::test]
async fn active_orders_keep_insertion_order_and_exclude_terminal_and_rejected() {
    let store = OrderStore::in_memory().await.unwrap();
    for (id, status) in [
        ("o-3", OrderStatus::Cooked),
        ("o-1", OrderStatus::Pending),
        ("o-4", OrderStatus::Completed),
        ("o-2", OrderStatus::Delivering),
        ("o-5", OrderStatus::Cooked),
    ] {
        store.upsert(&order(id, status), OrderSource::Rest).await.unwrap();
    }
    store.reject("o-5").await.unwrap();

    // re-upserting keeps the original position
    store
        .upsert(&order("o-3", OrderStatus::Delivering), OrderSource::Push)
        .await
        .unwrap();

    let ids: Vec<String> = store
        .get_active()
        .await
        .unwrap()
        .into_iter()
        .map(|order| order.id)
        .collect();
    assert_eq!(ids, vec!["o-3", "o-1", "o-2"]);
}

#[tokio::test]
async fn upsert_overwrites_mutable_fields_but_keeps_created_at_and_flags() {
    let store = OrderStore::in_memory().await.unwrap();
    let original = store
        .upsert(&order("o-1", OrderStatus::Cooked), OrderSource::Rest)
        .await
        .unwrap();
    store.set_zone_notified("o-1", ZoneKind::Restaurant, true).await.unwrap();

    let mut update = order("o-1", OrderStatus::Delivering);
    update.created_at = Utc::now() + ChronoDuration::days(1);
    update.tip = Some(15.0);
    let stored = store.upsert(&update, OrderSource::Push).await.unwrap();

    assert_eq!(stored.status, OrderStatus::Delivering);
    assert_eq!(stored.tip, Some(15.0));
    assert_eq!(stored.created_at, original.created_at);
    assert!(stored.notified.restaurant);
    assert!(!stored.notified.destination);

    let active = store.get_active().await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, "o-1");
}

#[tokio::test]
async fn rejected_set_survives_reopen_and_can_be_cleared() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("orders.db");

    {
        let store = OrderStore::connect(&path).await.unwrap();
        store.upsert(&order("o-1", OrderStatus::Cooked), OrderSource::Rest).await.unwrap();
        store.upsert(&order("o-2", OrderStatus::Cooked), OrderSource::Rest).await.unwrap();
        store.reject("o-2").await.unwrap();
        store.reject("o-2").await.unwrap();
        store.close().await;
    }

    let store = OrderStore::connect(&path).await.unwrap();
    assert!(store.is_rejected("o-2").await.unwrap());
    assert!(!store.is_rejected("o-1").await.unwrap());
    assert_eq!(store.rejected_ids().await.unwrap(), vec!["o-2".to_string()]);
    assert_eq!(store.get_active().await.unwrap().len(), 1);

    assert_eq!(store.clear_rejected().await.unwrap(), 1);
    assert_eq!(store.get_active().await.unwrap().len(), 2);
}

#[tokio::test]
async fn purge_removes_only_old_terminal_orders() {
    let store = OrderStore::in_memory().await.unwrap();
    let ten_days_ago = Utc::now() - ChronoDuration::days(10);

    let mut completed = order("old-done", OrderStatus::Completed);
    completed.created_at = ten_days_ago;
    completed.updated_at = ten_days_ago;
    let mut pending = order("old-pending", OrderStatus::Pending);
    pending.created_at = ten_days_ago;
    pending.updated_at = ten_days_ago;
    store.upsert(&completed, OrderSource::Rest).await.unwrap();
    store.upsert(&pending, OrderSource::Rest).await.unwrap();
    store
        .upsert(&order("fresh-done", OrderStatus::Cancelled), OrderSource::Rest)
        .await
        .unwrap();

    let removed = store
        .purge_older_than(Duration::from_secs(7 * 24 * 60 * 60))
        .await
        .unwrap();

    assert_eq!(removed, 1);
    assert!(store.get("old-done").await.unwrap().is_none());
    assert!(store.get("old-pending").await.unwrap().is_some());
    assert!(store.get("fresh-done").await.unwrap().is_some());
}

#[tokio::test]
async fn purge_with_out_of_range_retention_is_an_error() {
    let store = OrderStore::in_memory().await.unwrap();
    store
        .upsert(&order("done", OrderStatus::Completed), OrderSource::Rest)
        .await
        .unwrap();

    let result = store
        .purge_older_than(Duration::from_secs(1_000_000_000_000_000))
        .await;
    assert!(matches!(result, Err(AppError::Internal(_))));

    let result = store.purge_older_than(Duration::MAX).await;
    assert!(matches!(result, Err(AppError::Internal(_))));
    assert!(store.get("done").await.unwrap().is_some());
}

#[tokio::test]
async fn mark_terminal_validates_status_and_order() {
    let store = OrderStore::in_memory().await.unwrap();
    store.upsert(&order("o-1", OrderStatus::Cooked), OrderSource::Rest).await.unwrap();

    let not_terminal = store.mark_terminal("o-1", OrderStatus::Delivering).await;
    assert!(matches!(not_terminal, Err(AppError::BadRequest(_))));

    let missing = store.mark_terminal("nope", OrderStatus::Completed).await;
    assert!(matches!(missing, Err(AppError::NotFound(_))));

    store.mark_terminal("o-1", OrderStatus::Completed).await.unwrap();
    assert_eq!(
        store.get("o-1").await.unwrap().unwrap().status,
        OrderStatus::Completed
    );
    assert!(store.get_active().await.unwrap().is_empty());
}

#[tokio::test]
async fn closed_store_surfaces_persistence_errors() {
    let store = OrderStore::in_memory().await.unwrap();
    store.close().await;

    let result = store.get_active().await;
    assert!(matches!(result, Err(AppError::Persistence(_))));

    let result = store.upsert(&order("o-1", OrderStatus::Cooked), OrderSource::Rest).await;
    assert!(matches!(result, Err(AppError::Persistence(_))));

    // audit writes are best effort
    store.log_notification("o-1", "restaurant", "hello").await;
}

#[tokio::test]
async fn evaluation_skips_pass_when_store_is_unavailable() {
    let h = Harness::new().await;
    h.insert(order("o-1", OrderStatus::Cooked)).await;
    h.state.store.close().await;

    let events = h.state.engine.evaluate_once(&common::RESTAURANT).await;
    assert!(events.is_empty());
}

#[tokio::test]
async fn notification_log_filters_by_order() {
    let store = OrderStore::in_memory().await.unwrap();
    store.log_notification("o-1", "restaurant", "first").await;
    store.log_notification("o-2", "destination", "second").await;
    store.log_notification("o-1", "destination", "third").await;

    let all = store.notification_log(None).await.unwrap();
    assert_eq!(all.len(), 3);

    let messages: Vec<String> = store
        .notification_log(Some("o-1"))
        .await
        .unwrap()
        .into_iter()
        .map(|entry| entry.message)
        .collect();
    assert_eq!(messages, vec!["first", "third"]);
}

#[tokio::test]
async fn ingest_counts_malformed_records_and_stores_the_rest() {
    let h = Harness::new().await;

    let report = ingest_orders(
        &h.state,
        raw_orders(json!([
            {
                "_id": "a1",
                "orderCode": "A-1",
                "orderStatus": "cooked",
                "restaurantLocation": { "type": "Point", "coordinates": [38.74, 9.03] },
                "destinationLocation": { "lat": 9.01, "lng": 38.76 }
            },
            { "orderCode": "no-id" },
            { "id": "a2", "orderStatus": "teleporting" },
            {
                "id": "a3",
                "orderStatus": "pending",
                "restaurantLocation": { "lat": 123.0, "lng": 38.74 }
            }
        ])),
        OrderSource::Rest,
    )
    .await;

    assert_eq!(report.stored, 2);
    assert_eq!(report.malformed, 2);
    assert_eq!(report.failed, 0);

    let a3 = h.state.store.get("a3").await.unwrap().unwrap();
    assert!(a3.restaurant_point.is_none());
    assert_eq!(a3.code, "a3");
}

#[tokio::test]
async fn finishing_and_rejecting_clear_engine_state() {
    let h = Harness::new().await;
    h.insert(order("o-1", OrderStatus::Cooked)).await;
    h.insert(order("o-2", OrderStatus::Cooked)).await;
    h.state.engine.evaluate_once(&common::RESTAURANT).await;
    assert_eq!(h.state.engine.tracked_zones(), 2);

    orders::reject_order(&h.state, "o-1").await.unwrap();
    orders::finish_order(&h.state, "o-2", OrderStatus::Completed).await.unwrap();

    assert_eq!(h.state.engine.tracked_zones(), 0);
    assert!(h.state.store.get_active().await.unwrap().is_empty());

    let missing = orders::renotify_order(&h.state, "ghost").await;
    assert!(matches!(missing, Err(AppError::NotFound(_))));
}
