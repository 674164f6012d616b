//! Durable local order table backed by SQLite.
//!
//! Each write is a single statement (or a short transaction for upsert), so a
//! row is never observed half-written by concurrent REST and push ingestion.

pub mod ingest;

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::{debug, warn};

use crate::error::AppError;
use crate::models::location::GeoPoint;
use crate::models::notification::NotificationLogEntry;
use crate::models::order::{NotifiedZones, Order, OrderSource, OrderStatus};
use crate::models::zone::ZoneKind;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

const ORDER_COLUMNS: &str = "id, code, status, restaurant_name, restaurant_lat, restaurant_lng, \
     destination_lat, destination_lng, delivery_fee, tip, restaurant_notified, \
     destination_notified, created_at, updated_at";

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: String,
    code: String,
    status: String,
    restaurant_name: Option<String>,
    restaurant_lat: Option<f64>,
    restaurant_lng: Option<f64>,
    destination_lat: Option<f64>,
    destination_lng: Option<f64>,
    delivery_fee: Option<f64>,
    tip: Option<f64>,
    restaurant_notified: bool,
    destination_notified: bool,
    created_at: i64,
    updated_at: i64,
}

impl TryFrom<OrderRow> for Order {
    type Error = AppError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let status = OrderStatus::from_str(&row.status).map_err(AppError::MalformedOrder)?;

        Ok(Order {
            id: row.id,
            code: row.code,
            status,
            restaurant_name: row.restaurant_name,
            restaurant_point: point(row.restaurant_lat, row.restaurant_lng),
            destination_point: point(row.destination_lat, row.destination_lng),
            delivery_fee: row.delivery_fee,
            tip: row.tip,
            notified: NotifiedZones {
                restaurant: row.restaurant_notified,
                destination: row.destination_notified,
            },
            created_at: from_millis(row.created_at),
            updated_at: from_millis(row.updated_at),
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct LogRow {
    id: i64,
    order_id: String,
    kind: String,
    message: String,
    created_at: i64,
}

pub struct OrderStore {
    pool: SqlitePool,
}

impl OrderStore {
    /// Opens (creating if needed) the database file and runs migrations.
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self, AppError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|err| {
                AppError::Persistence(format!("failed to create directory {parent:?}: {err}"))
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        Self::from_pool(pool).await
    }

    /// Single-connection in-memory database, used by tests.
    pub async fn in_memory() -> Result<Self, AppError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        Self::from_pool(pool).await
    }

    async fn from_pool(pool: SqlitePool) -> Result<Self, AppError> {
        MIGRATOR
            .run(&pool)
            .await
            .map_err(|err| AppError::Persistence(format!("failed to run migrations: {err}")))?;

        Ok(Self { pool })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Inserts or merges an order. Mutable fields are overwritten by the
    /// incoming record; `id`, `created_at`, insertion order and the notified
    /// flags are kept.
    pub async fn upsert(&self, order: &Order, source: OrderSource) -> Result<Order, AppError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO orders (id, code, status, restaurant_name, restaurant_lat, restaurant_lng,
                                destination_lat, destination_lng, delivery_fee, tip, source,
                                created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                code = excluded.code,
                status = excluded.status,
                restaurant_name = excluded.restaurant_name,
                restaurant_lat = excluded.restaurant_lat,
                restaurant_lng = excluded.restaurant_lng,
                destination_lat = excluded.destination_lat,
                destination_lng = excluded.destination_lng,
                delivery_fee = excluded.delivery_fee,
                tip = excluded.tip,
                source = excluded.source,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&order.id)
        .bind(&order.code)
        .bind(order.status.as_str())
        .bind(&order.restaurant_name)
        .bind(order.restaurant_point.map(|p| p.lat))
        .bind(order.restaurant_point.map(|p| p.lng))
        .bind(order.destination_point.map(|p| p.lat))
        .bind(order.destination_point.map(|p| p.lng))
        .bind(order.delivery_fee)
        .bind(order.tip)
        .bind(source.as_str())
        .bind(order.created_at.timestamp_millis())
        .bind(order.updated_at.timestamp_millis())
        .execute(&mut *tx)
        .await?;

        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = ?"
        ))
        .bind(&order.id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        debug!(order_id = %order.id, source = source.as_str(), status = %order.status, "order upserted");
        Order::try_from(row)
    }

    pub async fn get(&self, order_id: &str) -> Result<Option<Order>, AppError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = ?"
        ))
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Order::try_from).transpose()
    }

    /// Non-terminal orders that are not in the rejected set, in insertion order.
    pub async fn get_active(&self) -> Result<Vec<Order>, AppError> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            r#"
            SELECT {ORDER_COLUMNS} FROM orders
            WHERE status IN ('pending', 'cooked', 'delivering')
              AND id NOT IN (SELECT order_id FROM rejected_orders)
            ORDER BY seq ASC
            "#
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let id = row.id.clone();
                match Order::try_from(row) {
                    Ok(order) => Some(order),
                    Err(err) => {
                        warn!(order_id = %id, error = %err, "skipping unreadable order row");
                        None
                    }
                }
            })
            .collect())
    }

    pub async fn mark_terminal(&self, order_id: &str, status: OrderStatus) -> Result<(), AppError> {
        if !status.is_terminal() {
            return Err(AppError::BadRequest(format!(
                "{status} is not a terminal status"
            )));
        }

        let result = sqlx::query("UPDATE orders SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(Utc::now().timestamp_millis())
            .bind(order_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("order {order_id} not found")));
        }

        Ok(())
    }

    /// Deletes terminal orders last updated before `now - retention`.
    pub async fn purge_older_than(&self, retention: Duration) -> Result<u64, AppError> {
        let cutoff = chrono::Duration::from_std(retention)
            .ok()
            .and_then(|retention| Utc::now().checked_sub_signed(retention))
            .ok_or_else(|| {
                AppError::Internal(format!("retention of {retention:?} is out of range"))
            })?;

        let result = sqlx::query(
            r#"
            DELETE FROM orders
            WHERE status IN ('completed', 'cancelled', 'rejected')
              AND updated_at < ?
            "#,
        )
        .bind(cutoff.timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn set_zone_notified(
        &self,
        order_id: &str,
        zone: ZoneKind,
        notified: bool,
    ) -> Result<(), AppError> {
        let sql = match zone {
            ZoneKind::Restaurant => "UPDATE orders SET restaurant_notified = ? WHERE id = ?",
            ZoneKind::Destination => "UPDATE orders SET destination_notified = ? WHERE id = ?",
        };

        sqlx::query(sql)
            .bind(notified)
            .bind(order_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn clear_zone_notified(&self, order_id: &str) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE orders SET restaurant_notified = 0, destination_notified = 0 WHERE id = ?",
        )
        .bind(order_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn reject(&self, order_id: &str) -> Result<(), AppError> {
        sqlx::query("INSERT OR IGNORE INTO rejected_orders (order_id, rejected_at) VALUES (?, ?)")
            .bind(order_id)
            .bind(Utc::now().timestamp_millis())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn is_rejected(&self, order_id: &str) -> Result<bool, AppError> {
        let found: Option<String> =
            sqlx::query_scalar("SELECT order_id FROM rejected_orders WHERE order_id = ?")
                .bind(order_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(found.is_some())
    }

    pub async fn rejected_ids(&self) -> Result<Vec<String>, AppError> {
        let ids = sqlx::query_scalar("SELECT order_id FROM rejected_orders ORDER BY rejected_at ASC")
            .fetch_all(&self.pool)
            .await?;

        Ok(ids)
    }

    pub async fn clear_rejected(&self) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM rejected_orders")
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    /// Best-effort audit write; failures are logged and swallowed.
    pub async fn log_notification(&self, order_id: &str, kind: &str, message: &str) {
        let result = sqlx::query(
            "INSERT INTO notification_log (order_id, kind, message, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(order_id)
        .bind(kind)
        .bind(message)
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await;

        if let Err(err) = result {
            warn!(order_id, kind, error = %err, "failed to write notification log");
        }
    }

    pub async fn notification_log(
        &self,
        order_id: Option<&str>,
    ) -> Result<Vec<NotificationLogEntry>, AppError> {
        let rows = match order_id {
            Some(order_id) => {
                sqlx::query_as::<_, LogRow>(
                    "SELECT id, order_id, kind, message, created_at FROM notification_log \
                     WHERE order_id = ? ORDER BY id ASC",
                )
                .bind(order_id)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, LogRow>(
                    "SELECT id, order_id, kind, message, created_at FROM notification_log ORDER BY id ASC",
                )
                .fetch_all(&self.pool)
                .await?
            }
        };

        Ok(rows
            .into_iter()
            .map(|row| NotificationLogEntry {
                id: row.id,
                order_id: row.order_id,
                kind: row.kind,
                message: row.message,
                created_at: from_millis(row.created_at),
            })
            .collect())
    }

    pub async fn get_setting(&self, key: &str) -> Result<Option<String>, AppError> {
        let value = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        Ok(value)
    }

    pub async fn put_setting(&self, key: &str, value: &str) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO settings (key, value) VALUES (?, ?) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn point(lat: Option<f64>, lng: Option<f64>) -> Option<GeoPoint> {
    match (lat, lng) {
        (Some(lat), Some(lng)) => Some(GeoPoint::new(lat, lng)),
        _ => None,
    }
}

fn from_millis(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_default()
}
