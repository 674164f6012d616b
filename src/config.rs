use std::env;
use std::time::Duration;

use crate::error::AppError;
use crate::platform::Permission;

/// How queued alerts advance once one is on screen.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AlertAdvance {
    /// The next alert waits for an explicit `dismiss()`.
    Dismissal,
    /// The active alert dismisses itself after the given duration.
    Timeout(Duration),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub database_path: String,
    pub enter_radius_m: f64,
    pub exit_radius_m: f64,
    pub min_movement_m: f64,
    pub min_sample_interval: Duration,
    pub scan_interval: Duration,
    pub retention: Duration,
    pub purge_interval: Duration,
    pub trigger_queue_size: usize,
    pub event_buffer_size: usize,
    pub alert_advance: AlertAdvance,
    pub location_permission: Permission,
    pub background_location_permission: Permission,
    pub notification_permission: Permission,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: 3000,
            log_level: "info".to_string(),
            database_path: ".data/proximity.db".to_string(),
            enter_radius_m: 200.0,
            exit_radius_m: 300.0,
            min_movement_m: 10.0,
            min_sample_interval: Duration::from_secs(5),
            scan_interval: Duration::from_secs(30),
            retention: Duration::from_secs(7 * 24 * 3600),
            purge_interval: Duration::from_secs(3600),
            trigger_queue_size: 256,
            event_buffer_size: 256,
            alert_advance: AlertAdvance::Dismissal,
            location_permission: Permission::Granted,
            background_location_permission: Permission::Granted,
            notification_permission: Permission::Granted,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();
        let defaults = Self::default();

        let alert_advance = match env::var("ALERT_ADVANCE")
            .unwrap_or_else(|_| "dismiss".to_string())
            .as_str()
        {
            "dismiss" => AlertAdvance::Dismissal,
            "timeout" => {
                AlertAdvance::Timeout(Duration::from_secs(parse_or_default("ALERT_DISPLAY_SECS", 15)?))
            }
            other => {
                return Err(AppError::Internal(format!(
                    "invalid ALERT_ADVANCE: {other}, expected dismiss/timeout"
                )));
            }
        };

        let config = Self {
            http_port: parse_or_default("HTTP_PORT", defaults.http_port)?,
            log_level: env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
            database_path: env::var("DATABASE_PATH").unwrap_or(defaults.database_path),
            enter_radius_m: parse_or_default("ENTER_RADIUS_M", defaults.enter_radius_m)?,
            exit_radius_m: parse_or_default("EXIT_RADIUS_M", defaults.exit_radius_m)?,
            min_movement_m: parse_or_default("MIN_MOVEMENT_M", defaults.min_movement_m)?,
            min_sample_interval: Duration::from_secs(parse_or_default(
                "MIN_SAMPLE_INTERVAL_SECS",
                5,
            )?),
            scan_interval: Duration::from_secs(parse_or_default("SCAN_INTERVAL_SECS", 30)?),
            retention: retention_from_days(parse_or_default("RETENTION_DAYS", 7)?)?,
            purge_interval: Duration::from_secs(parse_or_default("PURGE_INTERVAL_SECS", 3600)?),
            trigger_queue_size: parse_or_default("TRIGGER_QUEUE_SIZE", defaults.trigger_queue_size)?,
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", defaults.event_buffer_size)?,
            alert_advance,
            location_permission: parse_or_default("LOCATION_PERMISSION", Permission::Granted)?,
            background_location_permission: parse_or_default(
                "BACKGROUND_LOCATION_PERMISSION",
                Permission::Granted,
            )?,
            notification_permission: parse_or_default(
                "NOTIFICATION_PERMISSION",
                Permission::Granted,
            )?,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if !(self.enter_radius_m > 0.0) {
            return Err(AppError::Internal(format!(
                "ENTER_RADIUS_M must be > 0, got {}",
                self.enter_radius_m
            )));
        }
        if self.exit_radius_m <= self.enter_radius_m {
            return Err(AppError::Internal(format!(
                "EXIT_RADIUS_M ({}) must exceed ENTER_RADIUS_M ({})",
                self.exit_radius_m, self.enter_radius_m
            )));
        }
        if self.scan_interval.is_zero() || self.purge_interval.is_zero() {
            return Err(AppError::Internal(
                "scan and purge intervals must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

const SECS_PER_DAY: u64 = 24 * 3600;

fn retention_from_days(days: u64) -> Result<Duration, AppError> {
    days.checked_mul(SECS_PER_DAY)
        .map(Duration::from_secs)
        .ok_or_else(|| AppError::Internal(format!("RETENTION_DAYS {days} is out of range")))
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}
