//! Order lifecycle operations that touch the store, the engine and the
//! dispatcher together.

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::engine::queue::{enqueue_trigger, Trigger};
use crate::error::AppError;
use crate::models::order::{OrderSource, OrderStatus};
use crate::state::AppState;
use crate::store::ingest::{normalize, RawOrder};

#[derive(Debug, Default, Clone, Serialize)]
pub struct IngestReport {
    pub stored: usize,
    pub malformed: usize,
    pub failed: usize,
}

/// Upserts REST or push records and schedules an evaluation so a driver who
/// is already standing inside a zone hears about the new order. Records are
/// decoded one by one; an undecodable record only counts as malformed.
pub async fn ingest_orders(state: &AppState, records: Vec<Value>, source: OrderSource) -> IngestReport {
    let mut report = IngestReport::default();
    let now = Utc::now();

    for record in records {
        let order = match RawOrder::from_value(record).and_then(|raw| normalize(raw, now)) {
            Ok(order) => order,
            Err(err) => {
                warn!(source = source.as_str(), error = %err, "skipping order record");
                report.malformed += 1;
                continue;
            }
        };

        if !order.has_any_point() {
            warn!(order_id = %order.id, "order has no usable coordinates, stored for display only");
        }

        match state.store.upsert(&order, source).await {
            Ok(stored) => {
                report.stored += 1;
                if stored.status.is_terminal() {
                    state.engine.reset(&stored.id).await;
                    state.dispatcher.discard(&stored.id).await;
                }
            }
            Err(err) => {
                warn!(order_id = %order.id, error = %err, "order upsert failed, will retry on next sync");
                report.failed += 1;
            }
        }
    }

    if report.stored > 0 {
        enqueue_trigger(state, Trigger::OrdersChanged);
    }

    info!(
        source = source.as_str(),
        stored = report.stored,
        malformed = report.malformed,
        failed = report.failed,
        "orders ingested"
    );
    report
}

/// Adds the order to the rejected set; it is never evaluated again until the
/// set is cleared.
pub async fn reject_order(state: &AppState, order_id: &str) -> Result<(), AppError> {
    state.store.reject(order_id).await?;
    state.engine.reset(order_id).await;
    state.dispatcher.discard(order_id).await;
    info!(order_id, "order rejected by driver");
    Ok(())
}

pub async fn clear_rejected(state: &AppState) -> Result<u64, AppError> {
    let cleared = state.store.clear_rejected().await?;
    if cleared > 0 {
        enqueue_trigger(state, Trigger::OrdersChanged);
    }
    info!(cleared, "rejected set cleared");
    Ok(cleared)
}

pub async fn finish_order(state: &AppState, order_id: &str, status: OrderStatus) -> Result<(), AppError> {
    state.store.mark_terminal(order_id, status).await?;
    state.engine.reset(order_id).await;
    state.dispatcher.discard(order_id).await;
    info!(order_id, status = %status, "order finished");
    Ok(())
}

/// Clears zone state so the next evaluation can notify again.
pub async fn renotify_order(state: &AppState, order_id: &str) -> Result<(), AppError> {
    if state.store.get(order_id).await?.is_none() {
        return Err(AppError::NotFound(format!("order {order_id} not found")));
    }

    state.engine.reset(order_id).await;
    enqueue_trigger(state, Trigger::OrdersChanged);
    Ok(())
}
