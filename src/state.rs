use std::sync::Arc;

use tokio::sync::mpsc;

use crate::config::Config;
use crate::engine::alerts::AlertDispatcher;
use crate::engine::coordinator::Scheduler;
use crate::engine::feed::{LocationFeed, SampleFilter};
use crate::engine::proximity::ProximityEngine;
use crate::engine::queue::Trigger;
use crate::error::AppError;
use crate::observability::metrics::Metrics;
use crate::platform::{AlertOutput, LocationProvider};
use crate::settings::{ProximitySettings, ZoneBand};
use crate::store::OrderStore;

/// Everything one proximity-notification instance owns. Built once by the
/// binary (or per test) and shared behind an `Arc`.
pub struct AppState {
    pub config: Config,
    pub store: Arc<OrderStore>,
    pub settings: Arc<ProximitySettings>,
    pub feed: Arc<LocationFeed>,
    pub engine: Arc<ProximityEngine>,
    pub dispatcher: Arc<AlertDispatcher>,
    pub trigger_tx: mpsc::Sender<Trigger>,
    pub scheduler: Scheduler,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(
        config: Config,
        store: Arc<OrderStore>,
        provider: Arc<dyn LocationProvider>,
        output: Arc<dyn AlertOutput>,
    ) -> Result<Self, AppError> {
        config.validate()?;

        let metrics = Metrics::new();
        let (trigger_tx, trigger_rx) = mpsc::channel(config.trigger_queue_size);

        let band = ZoneBand::new(config.enter_radius_m, config.exit_radius_m)?;
        let settings = Arc::new(ProximitySettings::new(store.clone(), band));

        let feed = Arc::new(LocationFeed::new(
            provider,
            SampleFilter {
                min_movement_m: config.min_movement_m,
                min_interval: config.min_sample_interval,
            },
            metrics.clone(),
        ));

        let engine = Arc::new(ProximityEngine::new(
            store.clone(),
            settings.clone(),
            config.event_buffer_size,
            metrics.clone(),
        ));

        let dispatcher = Arc::new(AlertDispatcher::new(
            output,
            store.clone(),
            config.alert_advance,
            config.event_buffer_size,
            metrics.clone(),
        ));

        Ok(Self {
            config,
            store,
            settings,
            feed,
            engine,
            dispatcher,
            trigger_tx,
            scheduler: Scheduler::new(trigger_rx),
            metrics,
        })
    }
}
