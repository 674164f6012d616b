//! Single "current location" over foreground watch fixes and background batches.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::AppError;
use crate::geo::distance_meters;
use crate::models::location::{LocationSample, LocationSource, RawFix};
use crate::observability::metrics::Metrics;
use crate::platform::{LocationProvider, Permission, TrackingMode};

pub type Listener = Arc<dyn Fn(&LocationSample) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppVisibility {
    Foreground,
    Background,
}

#[derive(Debug, Clone, Copy)]
pub struct SampleFilter {
    pub min_movement_m: f64,
    pub min_interval: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Accepted,
    /// Not newer than the current sample.
    Stale,
    /// Too close in both space and time to the current sample.
    Duplicate,
}

impl Admission {
    fn as_str(&self) -> &'static str {
        match self {
            Admission::Accepted => "accepted",
            Admission::Stale => "stale",
            Admission::Duplicate => "duplicate",
        }
    }
}

impl SampleFilter {
    pub fn admit(&self, previous: Option<&LocationSample>, next: &LocationSample) -> Admission {
        let Some(previous) = previous else {
            return Admission::Accepted;
        };

        if next.timestamp <= previous.timestamp {
            return Admission::Stale;
        }

        let moved = distance_meters(&previous.point(), &next.point());
        let elapsed = (next.timestamp - previous.timestamp)
            .to_std()
            .unwrap_or_default();

        if moved > self.min_movement_m || elapsed >= self.min_interval {
            Admission::Accepted
        } else {
            Admission::Duplicate
        }
    }
}

/// Handle returned by [`LocationFeed::subscribe`].
#[derive(Debug)]
pub struct Subscription {
    id: u64,
}

pub struct LocationFeed {
    provider: Arc<dyn LocationProvider>,
    filter: SampleFilter,
    listeners: DashMap<u64, Listener>,
    next_listener_id: AtomicU64,
    lifecycle: Mutex<()>,
    tracking: AtomicBool,
    background_allowed: AtomicBool,
    degradation_logged: AtomicBool,
    current: RwLock<Option<LocationSample>>,
    metrics: Metrics,
}

impl LocationFeed {
    pub fn new(provider: Arc<dyn LocationProvider>, filter: SampleFilter, metrics: Metrics) -> Self {
        Self {
            provider,
            filter,
            listeners: DashMap::new(),
            next_listener_id: AtomicU64::new(1),
            lifecycle: Mutex::new(()),
            tracking: AtomicBool::new(false),
            background_allowed: AtomicBool::new(false),
            degradation_logged: AtomicBool::new(false),
            current: RwLock::new(None),
            metrics,
        }
    }

    /// Registers a listener for accepted samples. The first subscriber starts
    /// OS tracking; a denied foreground permission fails the subscription.
    pub async fn subscribe(&self, listener: Listener) -> Result<Subscription, AppError> {
        let _lifecycle = self.lifecycle.lock().await;

        if self.listeners.is_empty() {
            self.start_tracking().await?;
        }

        let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.insert(id, listener);
        debug!(listener_id = id, "location listener subscribed");

        Ok(Subscription { id })
    }

    /// Removes the listener; the last one out stops OS tracking.
    pub async fn unsubscribe(&self, subscription: Subscription) {
        let _lifecycle = self.lifecycle.lock().await;

        if self.listeners.remove(&subscription.id).is_none() {
            return;
        }
        debug!(listener_id = subscription.id, "location listener unsubscribed");

        if self.listeners.is_empty() {
            self.stop_tracking().await;
        }
    }

    async fn start_tracking(&self) -> Result<(), AppError> {
        if self.provider.request_foreground_permission().await == Permission::Denied {
            warn!("foreground location permission denied, proximity alerts disabled");
            return Err(AppError::PermissionDenied(
                "foreground location permission denied".to_string(),
            ));
        }

        self.provider.start_watch(TrackingMode::Foreground).await?;
        self.tracking.store(true, Ordering::SeqCst);
        info!("location tracking started");
        Ok(())
    }

    async fn stop_tracking(&self) {
        self.tracking.store(false, Ordering::SeqCst);
        self.provider.stop_watch().await;
        info!("location tracking stopped");
    }

    /// Asks for background location. Denial leaves the feed foreground-only and
    /// is logged once per feed.
    pub async fn enable_background(&self) -> Result<(), AppError> {
        if self.provider.request_background_permission().await == Permission::Denied {
            if !self.degradation_logged.swap(true, Ordering::SeqCst) {
                warn!("background location permission denied, falling back to foreground-only polling");
            }
            self.background_allowed.store(false, Ordering::SeqCst);
            return Err(AppError::PermissionDenied(
                "background location permission denied".to_string(),
            ));
        }

        self.background_allowed.store(true, Ordering::SeqCst);
        Ok(())
    }

    pub fn background_allowed(&self) -> bool {
        self.background_allowed.load(Ordering::SeqCst)
    }

    pub fn is_tracking(&self) -> bool {
        self.tracking.load(Ordering::SeqCst)
    }

    /// Switches the OS registration to match app visibility. Without background
    /// permission the foreground watch is kept as is.
    pub async fn set_visibility(&self, visibility: AppVisibility) -> Result<(), AppError> {
        let _lifecycle = self.lifecycle.lock().await;

        if !self.is_tracking() {
            return Ok(());
        }

        let mode = match visibility {
            AppVisibility::Foreground => TrackingMode::Foreground,
            AppVisibility::Background if self.background_allowed() => TrackingMode::Background,
            AppVisibility::Background => {
                debug!("app backgrounded without background permission, keeping foreground watch");
                return Ok(());
            }
        };

        self.provider.start_watch(mode).await?;
        info!(mode = ?mode, "location tracking mode switched");
        Ok(())
    }

    pub fn current(&self) -> Option<LocationSample> {
        self.current.read().clone()
    }

    pub fn ingest_foreground(&self, fix: &RawFix) -> Option<LocationSample> {
        self.ingest(fix, LocationSource::Foreground)
    }

    /// Applies the same filter to each fix of an OS batch, oldest first.
    /// Returns the accepted samples.
    pub fn ingest_background_batch(&self, fixes: &[RawFix]) -> Vec<LocationSample> {
        let mut ordered: Vec<&RawFix> = fixes.iter().collect();
        ordered.sort_by_key(|fix| fix.timestamp);

        ordered
            .into_iter()
            .filter_map(|fix| self.ingest(fix, LocationSource::Background))
            .collect()
    }

    fn ingest(&self, fix: &RawFix, source: LocationSource) -> Option<LocationSample> {
        if !self.is_tracking() {
            self.count(source, "inactive");
            debug!(source = source.as_str(), "dropping fix, no live subscription");
            return None;
        }

        let Some(sample) = LocationSample::from_fix(fix, source) else {
            self.count(source, "invalid");
            warn!(source = source.as_str(), latitude = fix.latitude, longitude = fix.longitude, "dropping invalid fix");
            return None;
        };

        {
            let mut current = self.current.write();
            let admission = self.filter.admit(current.as_ref(), &sample);
            self.count(source, admission.as_str());
            if admission != Admission::Accepted {
                return None;
            }
            *current = Some(sample.clone());
        }

        let listeners: Vec<Listener> = self
            .listeners
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        for listener in listeners {
            listener(&sample);
        }

        Some(sample)
    }

    fn count(&self, source: LocationSource, outcome: &str) {
        self.metrics
            .location_samples_total
            .with_label_values(&[source.as_str(), outcome])
            .inc();
    }
}
