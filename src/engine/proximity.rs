//! Per-(order, zone) hysteresis state machine.
//!
//! A zone goes Outside -> Inside when the driver comes within the enter radius
//! and only returns to Outside beyond the exit radius. Only the first
//! transition emits a [`ZoneEvent`]; the way back is silent and re-arms the
//! zone.
//!
//! Passes are serialized by `pass_lock`, so sample-driven and timer-driven
//! evaluations never both observe `Outside` for the same transition. Zone
//! state is only written while that lock is held; readers go through the
//! `DashMap` directly.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use futures::Stream;
use tokio::sync::{broadcast, Mutex};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};

use crate::geo::distance_meters;
use crate::models::location::GeoPoint;
use crate::models::order::Order;
use crate::models::zone::{ZoneEvent, ZoneKey, ZoneKind, ZoneState, ZoneStatus};
use crate::observability::metrics::Metrics;
use crate::settings::{ProximitySettings, ZoneBand};
use crate::store::OrderStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Entered,
    Exited,
    Unchanged,
}

/// Pure transition rule for one zone.
pub fn step(status: ZoneStatus, distance_m: f64, band: &ZoneBand) -> Transition {
    match status {
        ZoneStatus::Outside if distance_m <= band.enter_m => Transition::Entered,
        ZoneStatus::Inside if distance_m > band.exit_m => Transition::Exited,
        _ => Transition::Unchanged,
    }
}

pub struct ProximityEngine {
    store: Arc<OrderStore>,
    settings: Arc<ProximitySettings>,
    zones: DashMap<ZoneKey, ZoneState>,
    pass_lock: Mutex<()>,
    events_tx: broadcast::Sender<ZoneEvent>,
    metrics: Metrics,
}

impl ProximityEngine {
    pub fn new(
        store: Arc<OrderStore>,
        settings: Arc<ProximitySettings>,
        event_buffer_size: usize,
        metrics: Metrics,
    ) -> Self {
        let (events_tx, _unused_rx) = broadcast::channel(event_buffer_size);

        Self {
            store,
            settings,
            zones: DashMap::new(),
            pass_lock: Mutex::new(()),
            events_tx,
            metrics,
        }
    }

    /// Stream of zone entry events for UI observers. Lagging observers skip
    /// the events they missed.
    pub fn subscribe(&self) -> impl Stream<Item = ZoneEvent> + Send + use<> {
        BroadcastStream::new(self.events_tx.subscribe()).filter_map(|event| event.ok())
    }

    pub fn zone_state(&self, order_id: &str, zone: ZoneKind) -> Option<ZoneState> {
        self.zones
            .get(&ZoneKey::new(order_id, zone))
            .map(|entry| *entry.value())
    }

    pub fn tracked_zones(&self) -> usize {
        self.zones.len()
    }

    /// Evaluates every active order against `location` and returns the entry
    /// events of this pass, ordered by order id.
    pub async fn evaluate_once(&self, location: &GeoPoint) -> Vec<ZoneEvent> {
        let _pass = self.pass_lock.lock().await;

        if !location.is_valid() {
            warn!(lat = location.lat, lng = location.lng, "skipping evaluation for invalid location");
            return Vec::new();
        }

        let mut orders = match self.store.get_active().await {
            Ok(orders) => orders,
            Err(err) => {
                warn!(error = %err, "failed to load active orders, skipping pass");
                return Vec::new();
            }
        };
        orders.sort_by(|a, b| a.id.cmp(&b.id));
        self.metrics.active_orders.set(orders.len() as i64);

        let band = self.settings.band();
        let mut watched = HashSet::new();
        let mut events = Vec::new();

        for order in &orders {
            let Some(zone) = order.status.watched_zone() else {
                continue;
            };
            let Some(point) = order.zone_point(zone) else {
                debug!(order_id = %order.id, zone = zone.as_str(), "order has no point for watched zone");
                continue;
            };

            let key = ZoneKey::new(order.id.clone(), zone);
            watched.insert(key.clone());

            if let Some(event) = self.evaluate_zone(order, zone, key, point, location, &band).await {
                events.push(event);
            }
        }

        self.zones.retain(|key, _| watched.contains(key));

        for event in &events {
            self.metrics
                .zone_events_total
                .with_label_values(&[event.zone.as_str()])
                .inc();
            let _ = self.events_tx.send(event.clone());
        }

        events
    }

    async fn evaluate_zone(
        &self,
        order: &Order,
        zone: ZoneKind,
        key: ZoneKey,
        point: &GeoPoint,
        location: &GeoPoint,
        band: &ZoneBand,
    ) -> Option<ZoneEvent> {
        let distance_m = distance_meters(location, point);
        if !distance_m.is_finite() {
            warn!(order_id = %order.id, zone = zone.as_str(), "distance is not finite, skipping zone");
            return None;
        }

        let now = Utc::now();
        let existing = self.zones.get(&key).map(|entry| entry.status);
        let status = match existing {
            Some(status) => status,
            None => self.restore(order, zone, &key, distance_m, band).await,
        };

        match step(status, distance_m, band) {
            Transition::Entered => {
                self.zones.insert(
                    key,
                    ZoneState {
                        status: ZoneStatus::Inside,
                        last_transition_at: now,
                    },
                );
                self.persist_notified(&order.id, zone, true).await;
                info!(order_id = %order.id, zone = zone.as_str(), distance_m, "zone entered");

                Some(ZoneEvent {
                    order_id: order.id.clone(),
                    order_code: order.code.clone(),
                    zone,
                    distance_m,
                    location: *location,
                    occurred_at: now,
                })
            }
            Transition::Exited => {
                self.zones.insert(
                    key,
                    ZoneState {
                        status: ZoneStatus::Outside,
                        last_transition_at: now,
                    },
                );
                self.persist_notified(&order.id, zone, false).await;
                debug!(order_id = %order.id, zone = zone.as_str(), distance_m, "zone exited, re-armed");
                None
            }
            Transition::Unchanged => None,
        }
    }

    /// First sight of a zone in this process. A persisted notified flag within
    /// the exit radius restores Inside without a new event; a flag beyond it is
    /// stale and cleared.
    async fn restore(
        &self,
        order: &Order,
        zone: ZoneKind,
        key: &ZoneKey,
        distance_m: f64,
        band: &ZoneBand,
    ) -> ZoneStatus {
        let status = if order.notified.get(zone) && distance_m <= band.exit_m {
            debug!(order_id = %order.id, zone = zone.as_str(), "restored inside from notified flag");
            ZoneStatus::Inside
        } else {
            if order.notified.get(zone) {
                self.persist_notified(&order.id, zone, false).await;
            }
            ZoneStatus::Outside
        };

        self.zones.insert(
            key.clone(),
            ZoneState {
                status,
                last_transition_at: Utc::now(),
            },
        );
        status
    }

    async fn persist_notified(&self, order_id: &str, zone: ZoneKind, notified: bool) {
        if let Err(err) = self.store.set_zone_notified(order_id, zone, notified).await {
            warn!(order_id, zone = zone.as_str(), error = %err, "failed to persist notified flag");
        }
    }

    /// Forgets all zone state for the order, in memory and on disk, so the
    /// next entry notifies again.
    pub async fn reset(&self, order_id: &str) {
        let _pass = self.pass_lock.lock().await;

        self.zones.retain(|key, _| key.order_id != order_id);
        if let Err(err) = self.store.clear_zone_notified(order_id).await {
            warn!(order_id, error = %err, "failed to clear notified flags");
        }
        debug!(order_id, "zone state reset");
    }
}
