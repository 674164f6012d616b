use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::SinkExt;
use futures::StreamExt;
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::engine::alerts::AlertUpdate;
use crate::models::zone::ZoneEvent;
use crate::state::AppState;

#[derive(Serialize)]
#[serde(tag = "channel", content = "payload", rename_all = "snake_case")]
enum Outbound {
    ZoneEvent(ZoneEvent),
    Alert(AlertUpdate),
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let mut zone_events = Box::pin(state.engine.subscribe());
    let mut alerts = state.dispatcher.subscribe();

    info!("websocket client connected");

    let send_task = tokio::spawn(async move {
        loop {
            let outbound = tokio::select! {
                Some(event) = zone_events.next() => Outbound::ZoneEvent(event),
                update = alerts.recv() => match update {
                    Ok(update) => Outbound::Alert(update),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "websocket client lagging on alert updates");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                },
                else => break,
            };

            let json = match serde_json::to_string(&outbound) {
                Ok(json) => json,
                Err(err) => {
                    warn!(error = %err, "failed to serialize outbound message for ws");
                    continue;
                }
            };

            if sender.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
    });

    let recv_task = tokio::spawn(async move {
        while let Some(Ok(_msg)) = receiver.next().await {}
    });

    first_to_finish(send_task, recv_task).await;

    info!("websocket client disconnected");
}

/// Waits for either task and aborts the other.
async fn first_to_finish(mut left: JoinHandle<()>, mut right: JoinHandle<()>) {
    tokio::select! {
        _ = &mut left => right.abort(),
        _ = &mut right => left.abort(),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn finished_task_aborts_the_other() {
        let (alive_tx, alive_rx) = tokio::sync::oneshot::channel::<()>();
        let pending = tokio::spawn(async move {
            let _alive = alive_tx;
            tokio::time::sleep(Duration::from_secs(3600)).await;
        });
        let done = tokio::spawn(async {});

        first_to_finish(pending, done).await;

        // the aborted task drops its sender
        let dropped = tokio::time::timeout(Duration::from_secs(1), alive_rx).await;
        assert!(matches!(dropped, Ok(Err(_))));
    }
}
