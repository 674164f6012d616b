//! Normalization of order payloads from the REST fetch and the push feed.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::error::AppError;
use crate::models::location::GeoPoint;
use crate::models::order::{NotifiedZones, Order, OrderStatus};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawOrder {
    #[serde(alias = "_id")]
    pub id: Option<String>,
    pub order_code: Option<String>,
    pub order_status: Option<String>,
    pub restaurant_name: Option<String>,
    pub restaurant_location: Option<RawPoint>,
    pub destination_location: Option<RawPoint>,
    pub delivery_fee: Option<f64>,
    pub tip: Option<f64>,
    pub created_at: Option<RawTimestamp>,
}

impl RawOrder {
    /// Decodes one record of a batch on its own, so a bad record never sinks
    /// its neighbours.
    pub fn from_value(value: Value) -> Result<Self, AppError> {
        serde_json::from_value(value)
            .map_err(|err| AppError::MalformedOrder(format!("undecodable order record: {err}")))
    }
}

/// `createdAt` as RFC 3339 text or unix milliseconds.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawTimestamp {
    Millis(i64),
    Text(String),
    Other(Value),
}

impl RawTimestamp {
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            RawTimestamp::Millis(millis) => DateTime::from_timestamp_millis(*millis),
            RawTimestamp::Text(text) => DateTime::parse_from_rfc3339(text)
                .ok()
                .map(|parsed| parsed.with_timezone(&Utc)),
            RawTimestamp::Other(_) => None,
        }
    }
}

/// Either a GeoJSON point (`[lng, lat]`) or a plain `{lat, lng}` object.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawPoint {
    GeoJson {
        #[serde(rename = "type")]
        kind: String,
        coordinates: Vec<f64>,
    },
    LatLng {
        lat: f64,
        lng: f64,
    },
    /// Anything else; stored as a missing point.
    Other(Value),
}

impl RawPoint {
    pub fn to_point(&self) -> Option<GeoPoint> {
        let point = match self {
            RawPoint::GeoJson { kind, coordinates } => {
                if !kind.eq_ignore_ascii_case("point") || coordinates.len() < 2 {
                    return None;
                }
                GeoPoint::new(coordinates[1], coordinates[0])
            }
            RawPoint::LatLng { lat, lng } => GeoPoint::new(*lat, *lng),
            RawPoint::Other(_) => return None,
        };

        point.is_valid().then_some(point)
    }
}

/// Builds a storable order. A missing id or unknown status rejects the
/// record; bad coordinates only drop the affected point.
pub fn normalize(raw: RawOrder, now: DateTime<Utc>) -> Result<Order, AppError> {
    let id = raw
        .id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::MalformedOrder("order record without id".to_string()))?;

    let status = match raw.order_status.as_deref() {
        Some(status) => status
            .parse::<OrderStatus>()
            .map_err(|err| AppError::MalformedOrder(format!("order {id}: {err}")))?,
        None => OrderStatus::Pending,
    };

    let restaurant_point = convert_point(&id, "restaurantLocation", raw.restaurant_location.as_ref());
    let destination_point =
        convert_point(&id, "destinationLocation", raw.destination_location.as_ref());

    Ok(Order {
        code: raw.order_code.unwrap_or_else(|| id.clone()),
        id: id.clone(),
        status,
        restaurant_name: raw.restaurant_name,
        restaurant_point,
        destination_point,
        delivery_fee: raw.delivery_fee,
        tip: raw.tip,
        notified: NotifiedZones::default(),
        created_at: created_at(&id, raw.created_at.as_ref(), now),
        updated_at: now,
    })
}

fn created_at(order_id: &str, raw: Option<&RawTimestamp>, now: DateTime<Utc>) -> DateTime<Utc> {
    let Some(raw) = raw else {
        return now;
    };
    raw.to_datetime().unwrap_or_else(|| {
        warn!(order_id, raw = ?raw, "ignoring unreadable createdAt");
        now
    })
}

fn convert_point(order_id: &str, field: &str, raw: Option<&RawPoint>) -> Option<GeoPoint> {
    let raw = raw?;
    let point = raw.to_point();
    if point.is_none() {
        warn!(order_id, field, raw = ?raw, "ignoring invalid coordinates");
    }
    point
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn raw(value: serde_json::Value) -> RawOrder {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn geojson_and_lat_lng_points_normalize_to_the_same_shape() {
        let now = Utc::now();
        let order = normalize(
            raw(json!({
                "_id": "64f1",
                "orderCode": "A-17",
                "orderStatus": "COOKED",
                "restaurantLocation": { "type": "Point", "coordinates": [38.74, 9.03] },
                "destinationLocation": { "lat": 9.01, "lng": 38.76 },
                "deliveryFee": 45.0,
                "tip": 10.0
            })),
            now,
        )
        .unwrap();

        assert_eq!(order.id, "64f1");
        assert_eq!(order.code, "A-17");
        assert_eq!(order.status, OrderStatus::Cooked);
        assert_eq!(order.restaurant_point, Some(GeoPoint::new(9.03, 38.74)));
        assert_eq!(order.destination_point, Some(GeoPoint::new(9.01, 38.76)));
        assert_eq!(order.updated_at, now);
    }

    #[test]
    fn missing_id_is_malformed() {
        let result = normalize(raw(json!({ "orderCode": "A-1" })), Utc::now());
        assert!(matches!(result, Err(AppError::MalformedOrder(_))));
    }

    #[test]
    fn unknown_status_is_malformed() {
        let result = normalize(
            raw(json!({ "id": "o-1", "orderStatus": "LOST_IN_SPACE" })),
            Utc::now(),
        );
        assert!(matches!(result, Err(AppError::MalformedOrder(_))));
    }

    #[test]
    fn out_of_range_coordinates_drop_only_that_point() {
        let order = normalize(
            raw(json!({
                "id": "o-2",
                "orderStatus": "delivering",
                "restaurantLocation": { "type": "Point", "coordinates": [200.0, 9.0] },
                "destinationLocation": { "lat": 9.01, "lng": 38.76 }
            })),
            Utc::now(),
        )
        .unwrap();

        assert_eq!(order.restaurant_point, None);
        assert!(order.destination_point.is_some());
        assert_eq!(order.code, "o-2");
    }

    #[test]
    fn unexpected_point_shapes_become_missing_points() {
        let order = normalize(
            raw(json!({
                "id": "o-3",
                "orderStatus": "cooked",
                "restaurantLocation": { "lat": "9.03", "lng": "38.74" },
                "destinationLocation": {}
            })),
            Utc::now(),
        )
        .unwrap();

        assert_eq!(order.restaurant_point, None);
        assert_eq!(order.destination_point, None);
    }

    #[test]
    fn created_at_accepts_millis_and_text() {
        let now = Utc::now();
        let from_millis = normalize(raw(json!({ "id": "a", "createdAt": 1_700_000_000_000_i64 })), now).unwrap();
        assert_eq!(from_millis.created_at.timestamp_millis(), 1_700_000_000_000);

        let from_text = normalize(raw(json!({ "id": "b", "createdAt": "2024-03-01T10:00:00Z" })), now).unwrap();
        assert_eq!(from_text.created_at.to_rfc3339(), "2024-03-01T10:00:00+00:00");

        let garbled = normalize(raw(json!({ "id": "c", "createdAt": "yesterday" })), now).unwrap();
        assert_eq!(garbled.created_at, now);
    }

    #[test]
    fn undecodable_record_is_malformed() {
        let result = RawOrder::from_value(json!({ "id": "o-4", "tip": "lots" }));
        assert!(matches!(result, Err(AppError::MalformedOrder(_))));
    }

    #[test]
    fn short_coordinate_array_is_ignored() {
        let point = RawPoint::GeoJson {
            kind: "Point".to_string(),
            coordinates: vec![38.74],
        };
        assert_eq!(point.to_point(), None);
    }
}
