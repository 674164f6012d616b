use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::location::GeoPoint;
use crate::models::zone::ZoneKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    /// Cooked and waiting at the restaurant.
    Cooked,
    /// Picked up and out for delivery.
    Delivering,
    Completed,
    Cancelled,
    Rejected,
}

impl OrderStatus {
    pub const ACTIVE: [OrderStatus; 3] = [
        OrderStatus::Pending,
        OrderStatus::Cooked,
        OrderStatus::Delivering,
    ];

    pub const TERMINAL: [OrderStatus; 3] = [
        OrderStatus::Completed,
        OrderStatus::Cancelled,
        OrderStatus::Rejected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Cooked => "cooked",
            OrderStatus::Delivering => "delivering",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Rejected => "rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        Self::TERMINAL.contains(self)
    }

    /// The zone that is watched while the order is in this status.
    pub fn watched_zone(&self) -> Option<ZoneKind> {
        match self {
            OrderStatus::Cooked => Some(ZoneKind::Restaurant),
            OrderStatus::Delivering => Some(ZoneKind::Destination),
            _ => None,
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "pending" | "new" | "accepted" => Ok(OrderStatus::Pending),
            "cooked" | "ready" | "ready_for_pickup" | "prepared" => Ok(OrderStatus::Cooked),
            "delivering" | "out_for_delivery" | "picked_up" | "on_the_way" => {
                Ok(OrderStatus::Delivering)
            }
            "completed" | "delivered" => Ok(OrderStatus::Completed),
            "cancelled" | "canceled" => Ok(OrderStatus::Cancelled),
            "rejected" => Ok(OrderStatus::Rejected),
            _ => Err(format!("unknown order status: {raw}")),
        }
    }
}

/// Channel an order record arrived through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderSource {
    Rest,
    Push,
}

impl OrderSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSource::Rest => "rest",
            OrderSource::Push => "push",
        }
    }
}

/// Per-zone "already notified" flags, persisted with the order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifiedZones {
    pub restaurant: bool,
    pub destination: bool,
}

impl NotifiedZones {
    pub fn get(&self, zone: ZoneKind) -> bool {
        match zone {
            ZoneKind::Restaurant => self.restaurant,
            ZoneKind::Destination => self.destination,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub code: String,
    pub status: OrderStatus,
    pub restaurant_name: Option<String>,
    pub restaurant_point: Option<GeoPoint>,
    pub destination_point: Option<GeoPoint>,
    pub delivery_fee: Option<f64>,
    pub tip: Option<f64>,
    #[serde(default)]
    pub notified: NotifiedZones,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn zone_point(&self, zone: ZoneKind) -> Option<&GeoPoint> {
        match zone {
            ZoneKind::Restaurant => self.restaurant_point.as_ref(),
            ZoneKind::Destination => self.destination_point.as_ref(),
        }
    }

    pub fn has_any_point(&self) -> bool {
        self.restaurant_point.is_some() || self.destination_point.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_aliases_parse() {
        assert_eq!("READY_FOR_PICKUP".parse::<OrderStatus>(), Ok(OrderStatus::Cooked));
        assert_eq!("out-for-delivery".parse::<OrderStatus>(), Ok(OrderStatus::Delivering));
        assert_eq!("Canceled".parse::<OrderStatus>(), Ok(OrderStatus::Cancelled));
        assert!("teleported".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn only_pickup_and_delivery_statuses_watch_a_zone() {
        assert_eq!(OrderStatus::Pending.watched_zone(), None);
        assert_eq!(OrderStatus::Cooked.watched_zone(), Some(ZoneKind::Restaurant));
        assert_eq!(OrderStatus::Delivering.watched_zone(), Some(ZoneKind::Destination));
        assert_eq!(OrderStatus::Completed.watched_zone(), None);
    }
}
