//! Seams to the OS location, audio, vibration and notification APIs.

pub mod bridge;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    Granted,
    Denied,
}

impl FromStr for Permission {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "granted" | "true" | "yes" => Ok(Permission::Granted),
            "denied" | "false" | "no" => Ok(Permission::Denied),
            other => Err(format!("unknown permission value: {other}")),
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Permission::Granted => f.write_str("granted"),
            Permission::Denied => f.write_str("denied"),
        }
    }
}

/// Continuous watch while the app is visible, OS-batched updates otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingMode {
    Foreground,
    Background,
}

#[async_trait]
pub trait LocationProvider: Send + Sync {
    async fn request_foreground_permission(&self) -> Permission;

    async fn request_background_permission(&self) -> Permission;

    /// Starts (or switches) the OS registration. Fixes flow back through
    /// `LocationFeed::ingest_*`.
    async fn start_watch(&self, mode: TrackingMode) -> Result<(), AppError>;

    async fn stop_watch(&self);
}

#[async_trait]
pub trait AlertOutput: Send + Sync {
    async fn request_permission(&self) -> Permission;

    async fn play_sound(&self) -> Result<(), AppError>;

    async fn stop_sound(&self) -> Result<(), AppError>;

    /// Pattern in milliseconds, alternating wait and vibrate.
    async fn vibrate(&self, pattern: &[u64]) -> Result<(), AppError>;

    async fn cancel_vibration(&self) -> Result<(), AppError>;

    async fn schedule_notification(&self, title: &str, body: &str) -> Result<(), AppError>;
}
