#![allow(dead_code)]

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use proximity_notifier::config::Config;
use proximity_notifier::error::AppError;
use proximity_notifier::models::location::{GeoPoint, RawFix};
use proximity_notifier::models::order::{NotifiedZones, Order, OrderSource, OrderStatus};
use proximity_notifier::platform::{AlertOutput, LocationProvider, Permission, TrackingMode};
use proximity_notifier::state::AppState;
use proximity_notifier::store::OrderStore;

/// Meters per degree of latitude for the 6371 km sphere.
const METERS_PER_DEGREE: f64 = 6_371_000.0 * std::f64::consts::PI / 180.0;

pub const RESTAURANT: GeoPoint = GeoPoint { lat: 9.03, lng: 38.74 };

pub struct FakeLocationProvider {
    pub foreground: Mutex<Permission>,
    pub background: Mutex<Permission>,
    pub calls: Mutex<Vec<String>>,
}

impl FakeLocationProvider {
    pub fn new(foreground: Permission, background: Permission) -> Self {
        Self {
            foreground: Mutex::new(foreground),
            background: Mutex::new(background),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl LocationProvider for FakeLocationProvider {
    async fn request_foreground_permission(&self) -> Permission {
        *self.foreground.lock()
    }

    async fn request_background_permission(&self) -> Permission {
        *self.background.lock()
    }

    async fn start_watch(&self, mode: TrackingMode) -> Result<(), AppError> {
        self.calls.lock().push(format!("start_watch:{mode:?}"));
        Ok(())
    }

    async fn stop_watch(&self) {
        self.calls.lock().push("stop_watch".to_string());
    }
}

pub struct RecordingAlertOutput {
    pub permission: Permission,
    pub fail_sound: bool,
    pub calls: Mutex<Vec<String>>,
}

impl RecordingAlertOutput {
    pub fn new(permission: Permission) -> Self {
        Self {
            permission,
            fail_sound: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls.lock().iter().filter(|c| c.as_str() == call).count()
    }
}

#[async_trait]
impl AlertOutput for RecordingAlertOutput {
    async fn request_permission(&self) -> Permission {
        self.permission
    }

    async fn play_sound(&self) -> Result<(), AppError> {
        if self.fail_sound {
            self.calls.lock().push("play_sound_failed".to_string());
            return Err(AppError::Device("audio session busy".to_string()));
        }
        self.calls.lock().push("play_sound".to_string());
        Ok(())
    }

    async fn stop_sound(&self) -> Result<(), AppError> {
        self.calls.lock().push("stop_sound".to_string());
        Ok(())
    }

    async fn vibrate(&self, _pattern: &[u64]) -> Result<(), AppError> {
        self.calls.lock().push("vibrate".to_string());
        Ok(())
    }

    async fn cancel_vibration(&self) -> Result<(), AppError> {
        self.calls.lock().push("cancel_vibration".to_string());
        Ok(())
    }

    async fn schedule_notification(&self, _title: &str, body: &str) -> Result<(), AppError> {
        self.calls.lock().push(format!("notification:{body}"));
        Ok(())
    }
}

pub struct Harness {
    pub state: Arc<AppState>,
    pub provider: Arc<FakeLocationProvider>,
    pub output: Arc<RecordingAlertOutput>,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with(Config::default(), Permission::Granted, RecordingAlertOutput::new(Permission::Granted)).await
    }

    pub async fn with(config: Config, background: Permission, output: RecordingAlertOutput) -> Self {
        let store = Arc::new(OrderStore::in_memory().await.unwrap());
        Self::build(config, store, background, output)
    }

    pub async fn on_file(path: &Path) -> Self {
        let store = Arc::new(OrderStore::connect(path).await.unwrap());
        Self::build(
            Config::default(),
            store,
            Permission::Granted,
            RecordingAlertOutput::new(Permission::Granted),
        )
    }

    fn build(
        config: Config,
        store: Arc<OrderStore>,
        background: Permission,
        output: RecordingAlertOutput,
    ) -> Self {
        let provider = Arc::new(FakeLocationProvider::new(Permission::Granted, background));
        let output = Arc::new(output);
        let state = AppState::new(config, store, provider.clone(), output.clone()).unwrap();

        Self {
            state: Arc::new(state),
            provider,
            output,
        }
    }

    pub async fn insert(&self, order: Order) -> Order {
        self.state.store.upsert(&order, OrderSource::Rest).await.unwrap()
    }
}

pub fn order(id: &str, status: OrderStatus) -> Order {
    let now = Utc::now();
    Order {
        id: id.to_string(),
        code: format!("C-{id}"),
        status,
        restaurant_name: Some("Test Kitchen".to_string()),
        restaurant_point: Some(RESTAURANT),
        destination_point: Some(GeoPoint::new(9.01, 38.76)),
        delivery_fee: Some(40.0),
        tip: None,
        notified: NotifiedZones::default(),
        created_at: now,
        updated_at: now,
    }
}

/// Point exactly `meters` north of `origin` on the haversine sphere.
pub fn north_of(origin: GeoPoint, meters: f64) -> GeoPoint {
    GeoPoint::new(origin.lat + meters / METERS_PER_DEGREE, origin.lng)
}

pub fn fix(point: GeoPoint, millis: i64) -> RawFix {
    RawFix {
        latitude: point.lat,
        longitude: point.lng,
        accuracy: Some(8.0),
        timestamp: millis,
    }
}

pub async fn wait_until<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..100 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}
