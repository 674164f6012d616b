//! Adapters used when the engine runs behind the local bridge API: the mobile
//! shell owns the real OS calls and pushes fixes over HTTP, so these only log.

use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::AppError;
use crate::platform::{AlertOutput, LocationProvider, Permission, TrackingMode};

pub struct BridgeLocationProvider {
    foreground: Permission,
    background: Permission,
}

impl BridgeLocationProvider {
    pub fn new(foreground: Permission, background: Permission) -> Self {
        Self {
            foreground,
            background,
        }
    }
}

#[async_trait]
impl LocationProvider for BridgeLocationProvider {
    async fn request_foreground_permission(&self) -> Permission {
        self.foreground
    }

    async fn request_background_permission(&self) -> Permission {
        self.background
    }

    async fn start_watch(&self, mode: TrackingMode) -> Result<(), AppError> {
        info!(mode = ?mode, "location watch requested from shell");
        Ok(())
    }

    async fn stop_watch(&self) {
        info!("location watch released");
    }
}

pub struct LoggingAlertOutput {
    permission: Permission,
}

impl LoggingAlertOutput {
    pub fn new(permission: Permission) -> Self {
        Self { permission }
    }
}

#[async_trait]
impl AlertOutput for LoggingAlertOutput {
    async fn request_permission(&self) -> Permission {
        self.permission
    }

    async fn play_sound(&self) -> Result<(), AppError> {
        debug!("alert sound started");
        Ok(())
    }

    async fn stop_sound(&self) -> Result<(), AppError> {
        debug!("alert sound stopped");
        Ok(())
    }

    async fn vibrate(&self, pattern: &[u64]) -> Result<(), AppError> {
        debug!(pattern = ?pattern, "vibration started");
        Ok(())
    }

    async fn cancel_vibration(&self) -> Result<(), AppError> {
        debug!("vibration cancelled");
        Ok(())
    }

    async fn schedule_notification(&self, title: &str, body: &str) -> Result<(), AppError> {
        info!(title, body, "local notification scheduled");
        Ok(())
    }
}
