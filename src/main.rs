use std::sync::Arc;

use proximity_notifier::api;
use proximity_notifier::config::Config;
use proximity_notifier::engine::coordinator;
use proximity_notifier::error::AppError;
use proximity_notifier::platform::bridge::{BridgeLocationProvider, LoggingAlertOutput};
use proximity_notifier::state::AppState;
use proximity_notifier::store::OrderStore;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .with_target(false)
        .compact()
        .init();

    let store = Arc::new(OrderStore::connect(&config.database_path).await?);
    let provider = Arc::new(BridgeLocationProvider::new(
        config.location_permission,
        config.background_location_permission,
    ));
    let output = Arc::new(LoggingAlertOutput::new(config.notification_permission));

    let http_port = config.http_port;
    let shared_state = Arc::new(AppState::new(config, store.clone(), provider, output)?);

    match coordinator::start_tracking(&shared_state).await {
        Ok(report) => tracing::info!(
            background_tracking = report.background_tracking,
            active_orders = report.active_orders,
            "proximity engine ready"
        ),
        Err(AppError::PermissionDenied(reason)) => tracing::error!(
            reason = %reason,
            "location permission denied, waiting for POST /tracking/start retry"
        ),
        Err(err) => return Err(err),
    }

    let app = api::rest::router(shared_state.clone());

    let bind_addr = format!("127.0.0.1:{http_port}");
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| AppError::Internal(format!("failed to bind {bind_addr}: {err}")))?;

    tracing::info!(http_port, "bridge api started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::Internal(format!("server error: {err}")))?;

    coordinator::stop_tracking(&shared_state).await;
    store.close().await;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
