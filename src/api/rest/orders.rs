use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::Json;
use axum::Router;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::engine::orders::{self, IngestReport};
use crate::error::AppError;
use crate::models::notification::NotificationLogEntry;
use crate::models::order::{Order, OrderSource, OrderStatus};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orders/active", get(list_active))
        .route("/orders/sync", post(sync_orders))
        .route("/orders/push", post(push_order))
        .route("/orders/rejected", delete(clear_rejected))
        .route("/orders/:id/reject", post(reject_order))
        .route("/orders/:id/finish", post(finish_order))
        .route("/orders/:id/renotify", post(renotify_order))
        .route("/orders/:id/notifications", get(notification_log))
}

#[derive(Deserialize)]
pub struct FinishOrderRequest {
    pub status: OrderStatus,
}

#[derive(Serialize)]
struct ClearedResponse {
    cleared: u64,
}

async fn list_active(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Order>>, AppError> {
    Ok(Json(state.store.get_active().await?))
}

async fn sync_orders(
    State(state): State<Arc<AppState>>,
    Json(records): Json<Vec<Value>>,
) -> Json<IngestReport> {
    Json(orders::ingest_orders(&state, records, OrderSource::Rest).await)
}

async fn push_order(
    State(state): State<Arc<AppState>>,
    Json(record): Json<Value>,
) -> Json<IngestReport> {
    Json(orders::ingest_orders(&state, vec![record], OrderSource::Push).await)
}

async fn reject_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    orders::reject_order(&state, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn clear_rejected(State(state): State<Arc<AppState>>) -> Result<Json<ClearedResponse>, AppError> {
    let cleared = orders::clear_rejected(&state).await?;
    Ok(Json(ClearedResponse { cleared }))
}

async fn finish_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(payload): Json<FinishOrderRequest>,
) -> Result<StatusCode, AppError> {
    orders::finish_order(&state, &id, payload.status).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn renotify_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    orders::renotify_order(&state, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn notification_log(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<NotificationLogEntry>>, AppError> {
    Ok(Json(state.store.notification_log(Some(&id)).await?))
}
