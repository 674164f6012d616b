//! Turns zone events into sound, vibration, a system notification and a modal.
//!
//! At most one alert is active. Events submitted while one is showing wait in
//! a FIFO queue and are presented one at a time as alerts are dismissed (or
//! time out, under [`AlertAdvance::Timeout`]).

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::AlertAdvance;
use crate::error::AppError;
use crate::models::zone::{ZoneEvent, ZoneKind};
use crate::observability::metrics::Metrics;
use crate::platform::{AlertOutput, Permission};
use crate::store::OrderStore;

const VIBRATION_PATTERN_MS: [u64; 4] = [0, 500, 250, 500];

#[derive(Debug, Clone, Serialize)]
pub struct ActiveAlert {
    pub session_id: Uuid,
    pub event: ZoneEvent,
    pub started_at: DateTime<Utc>,
}

/// Observer feed for the modal layer.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AlertUpdate {
    Presented { alert: ActiveAlert },
    Dismissed { session_id: Uuid, order_id: String },
}

#[derive(Default)]
struct DispatchState {
    active: Option<ActiveAlert>,
    queue: VecDeque<ZoneEvent>,
}

pub struct AlertDispatcher {
    output: Arc<dyn AlertOutput>,
    store: Arc<OrderStore>,
    advance: AlertAdvance,
    state: Mutex<DispatchState>,
    output_lock: tokio::sync::Mutex<()>,
    audible: AtomicBool,
    permission_checked: AtomicBool,
    updates_tx: broadcast::Sender<AlertUpdate>,
    metrics: Metrics,
}

impl AlertDispatcher {
    pub fn new(
        output: Arc<dyn AlertOutput>,
        store: Arc<OrderStore>,
        advance: AlertAdvance,
        event_buffer_size: usize,
        metrics: Metrics,
    ) -> Self {
        let (updates_tx, _unused_rx) = broadcast::channel(event_buffer_size);

        Self {
            output,
            store,
            advance,
            state: Mutex::new(DispatchState::default()),
            output_lock: tokio::sync::Mutex::new(()),
            audible: AtomicBool::new(true),
            permission_checked: AtomicBool::new(false),
            updates_tx,
            metrics,
        }
    }

    /// Asks the OS for notification permission once. Without it alerts are
    /// vibration-only.
    pub async fn request_permission(&self) {
        if self.permission_checked.swap(true, Ordering::SeqCst) {
            return;
        }

        if self.output.request_permission().await == Permission::Denied {
            self.audible.store(false, Ordering::SeqCst);
            warn!("notification permission denied, alerts degrade to vibration only");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AlertUpdate> {
        self.updates_tx.subscribe()
    }

    pub fn active(&self) -> Option<ActiveAlert> {
        self.state.lock().active.clone()
    }

    pub fn pending(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Presents the first event now if nothing is active; queues the rest.
    pub async fn submit(self: &Arc<Self>, events: Vec<ZoneEvent>) {
        for event in events {
            let started = {
                let mut state = self.state.lock();
                if state.active.is_none() && state.queue.is_empty() {
                    let alert = new_alert(event);
                    state.active = Some(alert.clone());
                    Some(alert)
                } else {
                    debug!(order_id = %event.order_id, zone = event.zone.as_str(), "alert queued");
                    state.queue.push_back(event);
                    self.metrics.alerts_pending.set(state.queue.len() as i64);
                    None
                }
            };

            if let Some(alert) = started {
                self.present(alert).await;
            }
        }
    }

    /// Presents `event` immediately, stopping whatever alert is active. The
    /// preempted alert is not re-queued.
    pub async fn fire(self: &Arc<Self>, event: ZoneEvent) -> ActiveAlert {
        let alert = new_alert(event);
        let preempted = self.state.lock().active.replace(alert.clone());

        if let Some(previous) = preempted {
            debug!(session_id = %previous.session_id, "active alert preempted");
            let _ = self.updates_tx.send(AlertUpdate::Dismissed {
                session_id: previous.session_id,
                order_id: previous.event.order_id,
            });
        }

        self.present(alert.clone()).await;
        alert
    }

    /// Stops sound and vibration and advances the queue. Returns the dismissed
    /// alert, or `None` when nothing was active.
    pub async fn dismiss(self: &Arc<Self>) -> Option<ActiveAlert> {
        let dismissed = self.state.lock().active.take()?;
        self.finish(&dismissed).await;
        self.advance().await;
        Some(dismissed)
    }

    /// Drops queued events for the order and dismisses its active alert.
    pub async fn discard(self: &Arc<Self>, order_id: &str) {
        let active_matches = {
            let mut state = self.state.lock();
            state.queue.retain(|event| event.order_id != order_id);
            self.metrics.alerts_pending.set(state.queue.len() as i64);
            state
                .active
                .as_ref()
                .is_some_and(|alert| alert.event.order_id == order_id)
        };

        if active_matches {
            self.dismiss().await;
        }
    }

    async fn dismiss_session(self: &Arc<Self>, session_id: Uuid) {
        let dismissed = {
            let mut state = self.state.lock();
            let same_session = state
                .active
                .as_ref()
                .is_some_and(|alert| alert.session_id == session_id);
            if same_session { state.active.take() } else { None }
        };

        if let Some(dismissed) = dismissed {
            debug!(session_id = %session_id, "alert display time elapsed");
            self.finish(&dismissed).await;
            self.advance().await;
        }
    }

    async fn advance(self: &Arc<Self>) {
        let next = {
            let mut state = self.state.lock();
            if state.active.is_some() {
                return;
            }
            let next = state.queue.pop_front().map(new_alert);
            state.active = next.clone();
            self.metrics.alerts_pending.set(state.queue.len() as i64);
            next
        };

        if let Some(alert) = next {
            self.present(alert).await;
        }
    }

    async fn finish(&self, alert: &ActiveAlert) {
        {
            let _output = self.output_lock.lock().await;
            guard("stop_sound", self.output.stop_sound().await);
            guard("cancel_vibration", self.output.cancel_vibration().await);
        }

        info!(order_id = %alert.event.order_id, session_id = %alert.session_id, "alert dismissed");
        let _ = self.updates_tx.send(AlertUpdate::Dismissed {
            session_id: alert.session_id,
            order_id: alert.event.order_id.clone(),
        });
    }

    fn is_current(&self, session_id: Uuid) -> bool {
        self.state
            .lock()
            .active
            .as_ref()
            .is_some_and(|alert| alert.session_id == session_id)
    }

    /// Runs the side effects in order, each independently guarded. Stops early
    /// if the alert was dismissed or preempted meanwhile.
    async fn present(self: &Arc<Self>, alert: ActiveAlert) {
        let event = &alert.event;
        let audible = self.audible.load(Ordering::SeqCst);

        {
            let _output = self.output_lock.lock().await;

            guard("stop_sound", self.output.stop_sound().await);
            if !self.is_current(alert.session_id) {
                return;
            }

            if audible {
                guard("play_sound", self.output.play_sound().await);
                if !self.is_current(alert.session_id) {
                    guard("stop_sound", self.output.stop_sound().await);
                    return;
                }
            }

            guard("vibrate", self.output.vibrate(&VIBRATION_PATTERN_MS).await);
            if !self.is_current(alert.session_id) {
                guard("stop_sound", self.output.stop_sound().await);
                guard("cancel_vibration", self.output.cancel_vibration().await);
                return;
            }

            if audible {
                guard(
                    "schedule_notification",
                    self.output
                        .schedule_notification(notification_title(event), &event.message())
                        .await,
                );
            }
        }

        info!(
            order_id = %event.order_id,
            zone = event.zone.as_str(),
            session_id = %alert.session_id,
            "alert presented"
        );
        let _ = self.updates_tx.send(AlertUpdate::Presented {
            alert: alert.clone(),
        });

        self.store
            .log_notification(&event.order_id, event.zone.as_str(), &event.message())
            .await;

        if let AlertAdvance::Timeout(after) = self.advance {
            self.schedule_auto_dismiss(alert.session_id, after);
        }
    }

    fn schedule_auto_dismiss(self: &Arc<Self>, session_id: Uuid, after: Duration) {
        let dispatcher = Arc::clone(self);
        let task: BoxFuture<'static, ()> = Box::pin(async move {
            tokio::time::sleep(after).await;
            dispatcher.dismiss_session(session_id).await;
        });
        tokio::spawn(task);
    }
}

fn new_alert(event: ZoneEvent) -> ActiveAlert {
    ActiveAlert {
        session_id: Uuid::new_v4(),
        event,
        started_at: Utc::now(),
    }
}

fn notification_title(event: &ZoneEvent) -> &'static str {
    match event.zone {
        ZoneKind::Restaurant => "Pickup nearby",
        ZoneKind::Destination => "Drop-off nearby",
    }
}

fn guard(step: &str, result: Result<(), AppError>) {
    if let Err(err) = result {
        warn!(step, error = %err, "alert step failed");
    }
}
