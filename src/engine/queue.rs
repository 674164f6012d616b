use tracing::debug;

use crate::models::location::LocationSample;
use crate::state::AppState;

/// Reasons to run an evaluation pass.
#[derive(Debug, Clone)]
pub enum Trigger {
    /// A sample accepted by the location feed.
    Sample(LocationSample),
    /// Orders were upserted or reset; re-check against the last known location.
    OrdersChanged,
}

impl Trigger {
    pub fn label(&self) -> &'static str {
        match self {
            Trigger::Sample(_) => "sample",
            Trigger::OrdersChanged => "orders",
        }
    }
}

/// Non-blocking: a full queue drops the trigger, the periodic scan catches up.
pub fn enqueue_trigger(state: &AppState, trigger: Trigger) {
    if let Err(err) = state.trigger_tx.try_send(trigger) {
        debug!(error = %err, "evaluation trigger dropped");
    }
}
