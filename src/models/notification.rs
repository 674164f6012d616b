use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct NotificationLogEntry {
    pub id: i64,
    pub order_id: String,
    pub kind: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}
