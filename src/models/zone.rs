use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::location::GeoPoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneKind {
    Restaurant,
    Destination,
}

impl ZoneKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ZoneKind::Restaurant => "restaurant",
            ZoneKind::Destination => "destination",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneStatus {
    Outside,
    Inside,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ZoneState {
    pub status: ZoneStatus,
    pub last_transition_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ZoneKey {
    pub order_id: String,
    pub zone: ZoneKind,
}

impl ZoneKey {
    pub fn new(order_id: impl Into<String>, zone: ZoneKind) -> Self {
        Self {
            order_id: order_id.into(),
            zone,
        }
    }
}

/// Entry into an order's zone. Emitted once per Outside -> Inside transition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ZoneEvent {
    pub order_id: String,
    pub order_code: String,
    pub zone: ZoneKind,
    pub distance_m: f64,
    pub location: GeoPoint,
    pub occurred_at: DateTime<Utc>,
}

impl ZoneEvent {
    pub fn message(&self) -> String {
        match self.zone {
            ZoneKind::Restaurant => format!(
                "Order {} is ready for pickup, restaurant is {:.0} m away",
                self.order_code, self.distance_m
            ),
            ZoneKind::Destination => format!(
                "Order {}: customer drop-off is {:.0} m away",
                self.order_code, self.distance_m
            ),
        }
    }
}
