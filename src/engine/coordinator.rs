use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::engine::feed::{AppVisibility, Listener, Subscription};
use crate::engine::queue::Trigger;
use crate::error::AppError;
use crate::models::location::LocationSample;
use crate::models::zone::ZoneEvent;
use crate::state::AppState;

/// Lifecycle slots for the evaluation loop. The trigger receiver is parked
/// here while tracking is stopped so a later start resumes the same queue.
pub struct Scheduler {
    trigger_rx: Mutex<Option<mpsc::Receiver<Trigger>>>,
    running: Mutex<Option<Running>>,
    active: AtomicBool,
}

struct Running {
    subscription: Subscription,
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<mpsc::Receiver<Trigger>>,
}

impl Scheduler {
    pub fn new(trigger_rx: mpsc::Receiver<Trigger>) -> Self {
        Self {
            trigger_rx: Mutex::new(Some(trigger_rx)),
            running: Mutex::new(None),
            active: AtomicBool::new(false),
        }
    }

    pub fn is_running(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StartReport {
    pub already_running: bool,
    pub background_tracking: bool,
    pub active_orders: usize,
    pub rejected_orders: usize,
}

/// Starts location tracking and the evaluation loop.
///
/// Foreground permission denial is returned as `PermissionDenied` and leaves
/// nothing running. Background denial only downgrades to foreground-only.
pub async fn start_tracking(state: &Arc<AppState>) -> Result<StartReport, AppError> {
    let mut running = state.scheduler.running.lock().await;
    if running.is_some() {
        return Ok(StartReport {
            already_running: true,
            background_tracking: state.feed.background_allowed(),
            active_orders: 0,
            rejected_orders: 0,
        });
    }

    let trigger_rx = state
        .scheduler
        .trigger_rx
        .lock()
        .await
        .take()
        .ok_or_else(|| AppError::Internal("trigger queue is not available".to_string()))?;

    let tx = state.trigger_tx.clone();
    let listener: Listener = Arc::new(move |sample: &LocationSample| {
        if let Err(err) = tx.try_send(Trigger::Sample(sample.clone())) {
            debug!(error = %err, "sample trigger dropped");
        }
    });

    let subscription = match state.feed.subscribe(listener).await {
        Ok(subscription) => subscription,
        Err(err) => {
            *state.scheduler.trigger_rx.lock().await = Some(trigger_rx);
            return Err(err);
        }
    };

    state.dispatcher.request_permission().await;
    let background_tracking = state.feed.enable_background().await.is_ok();

    state.settings.load().await;
    let active_orders = state.store.get_active().await.map(|orders| orders.len()).unwrap_or_else(|err| {
        warn!(error = %err, "failed to reload active orders");
        0
    });
    let rejected_orders = state.store.rejected_ids().await.map(|ids| ids.len()).unwrap_or_else(|err| {
        warn!(error = %err, "failed to reload rejected orders");
        0
    });

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(run_proximity_loop(state.clone(), trigger_rx, shutdown_rx));

    *running = Some(Running {
        subscription,
        shutdown_tx,
        handle,
    });
    state.scheduler.active.store(true, Ordering::SeqCst);

    info!(background_tracking, active_orders, rejected_orders, "proximity tracking started");

    Ok(StartReport {
        already_running: false,
        background_tracking,
        active_orders,
        rejected_orders,
    })
}

/// Stops the loop and OS tracking. Orders and zone state are kept, so a later
/// `start_tracking` resumes where this left off. Returns false if nothing ran.
pub async fn stop_tracking(state: &Arc<AppState>) -> bool {
    let Some(running) = state.scheduler.running.lock().await.take() else {
        return false;
    };

    let _ = running.shutdown_tx.send(true);
    match running.handle.await {
        Ok(trigger_rx) => *state.scheduler.trigger_rx.lock().await = Some(trigger_rx),
        Err(err) => error!(error = %err, "evaluation loop ended abnormally"),
    }

    state.feed.unsubscribe(running.subscription).await;
    state.scheduler.active.store(false, Ordering::SeqCst);
    info!("proximity tracking stopped");
    true
}

pub async fn set_visibility(state: &AppState, visibility: AppVisibility) -> Result<(), AppError> {
    debug!(visibility = ?visibility, "app visibility changed");
    state.feed.set_visibility(visibility).await
}

/// Serializes sample triggers, order-change triggers, the periodic scan and
/// the retention purge. Hands the receiver back on shutdown.
pub async fn run_proximity_loop(
    state: Arc<AppState>,
    mut trigger_rx: mpsc::Receiver<Trigger>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> mpsc::Receiver<Trigger> {
    info!("evaluation loop started");

    let mut scan = interval(state.config.scan_interval);
    scan.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut purge = interval(state.config.purge_interval);
    purge.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => break,
            Some(trigger) = trigger_rx.recv() => {
                let location = match &trigger {
                    Trigger::Sample(sample) => Some(sample.clone()),
                    Trigger::OrdersChanged => state.feed.current(),
                };
                run_pass(&state, trigger.label(), location).await;
            }
            _ = scan.tick() => {
                run_pass(&state, "scan", state.feed.current()).await;
            }
            _ = purge.tick() => {
                purge_expired(&state).await;
            }
        }
    }

    info!("evaluation loop stopped");
    trigger_rx
}

/// One evaluation pass followed by alert dispatch.
pub async fn run_pass(
    state: &AppState,
    trigger: &str,
    location: Option<LocationSample>,
) -> Vec<ZoneEvent> {
    let Some(location) = location else {
        debug!(trigger, "no location yet, skipping pass");
        return Vec::new();
    };

    let start = Instant::now();
    let events = state.engine.evaluate_once(&location.point()).await;
    state
        .metrics
        .evaluation_latency_seconds
        .with_label_values(&[trigger])
        .observe(start.elapsed().as_secs_f64());

    if !events.is_empty() {
        state.dispatcher.submit(events.clone()).await;
    }
    events
}

pub async fn purge_expired(state: &AppState) -> u64 {
    match state.store.purge_older_than(state.config.retention).await {
        Ok(removed) => {
            if removed > 0 {
                info!(removed, "purged expired terminal orders");
            }
            removed
        }
        Err(err) => {
            warn!(error = %err, "order purge failed");
            0
        }
    }
}
