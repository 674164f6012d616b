//! User-selectable proximity radius.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::AppError;
use crate::store::OrderStore;

pub const RADIUS_PRESETS_M: [f64; 6] = [500.0, 1_000.0, 2_000.0, 3_000.0, 5_000.0, 10_000.0];

const RADIUS_KEY: &str = "proximity_radius_m";

/// Enter/exit thresholds in meters. `exit_m > enter_m` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ZoneBand {
    pub enter_m: f64,
    pub exit_m: f64,
}

impl ZoneBand {
    pub fn new(enter_m: f64, exit_m: f64) -> Result<Self, AppError> {
        if !(enter_m > 0.0) || !(exit_m > enter_m) {
            return Err(AppError::BadRequest(format!(
                "invalid zone band: enter {enter_m} m, exit {exit_m} m"
            )));
        }
        Ok(Self { enter_m, exit_m })
    }
}

pub struct ProximitySettings {
    store: Arc<OrderStore>,
    default_band: ZoneBand,
    cached: RwLock<ZoneBand>,
}

impl ProximitySettings {
    pub fn new(store: Arc<OrderStore>, default_band: ZoneBand) -> Self {
        Self {
            store,
            default_band,
            cached: RwLock::new(default_band),
        }
    }

    /// Last known band, without touching storage.
    pub fn band(&self) -> ZoneBand {
        *self.cached.read()
    }

    /// Reads the persisted preset and refreshes the cache. Falls back to the
    /// cached band when storage is unavailable.
    pub async fn load(&self) -> ZoneBand {
        let band = match self.store.get_setting(RADIUS_KEY).await {
            Ok(Some(raw)) => match raw.parse::<f64>() {
                Ok(meters) => self.band_for(meters),
                Err(err) => {
                    warn!(value = %raw, error = %err, "ignoring unreadable radius setting");
                    self.default_band
                }
            },
            Ok(None) => self.default_band,
            Err(err) => {
                warn!(error = %err, "failed to read radius setting, using cached value");
                return self.band();
            }
        };

        *self.cached.write() = band;
        band
    }

    pub async fn set_radius(&self, meters: f64) -> Result<ZoneBand, AppError> {
        if !RADIUS_PRESETS_M.contains(&meters) {
            return Err(AppError::BadRequest(format!(
                "radius {meters} m is not one of the presets {RADIUS_PRESETS_M:?}"
            )));
        }

        self.store.put_setting(RADIUS_KEY, &meters.to_string()).await?;

        let band = self.band_for(meters);
        *self.cached.write() = band;
        info!(enter_m = band.enter_m, exit_m = band.exit_m, "proximity radius updated");
        Ok(band)
    }

    /// Keeps the configured exit/enter ratio when scaling to a preset.
    fn band_for(&self, enter_m: f64) -> ZoneBand {
        let ratio = self.default_band.exit_m / self.default_band.enter_m;
        ZoneBand {
            enter_m,
            exit_m: enter_m * ratio,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn settings() -> ProximitySettings {
        let store = Arc::new(OrderStore::in_memory().await.unwrap());
        ProximitySettings::new(store, ZoneBand::new(200.0, 300.0).unwrap())
    }

    #[tokio::test]
    async fn default_band_applies_until_a_preset_is_chosen() {
        let settings = settings().await;
        assert_eq!(settings.load().await, ZoneBand::new(200.0, 300.0).unwrap());
    }

    #[tokio::test]
    async fn preset_scales_exit_radius_and_persists() {
        let settings = settings().await;
        let band = settings.set_radius(1_000.0).await.unwrap();

        assert_eq!(band.enter_m, 1_000.0);
        assert_eq!(band.exit_m, 1_500.0);
        assert_eq!(settings.band(), band);
        assert_eq!(settings.load().await, band);
    }

    #[tokio::test]
    async fn non_preset_radius_is_rejected() {
        let settings = settings().await;
        let result = settings.set_radius(750.0).await;

        assert!(matches!(result, Err(AppError::BadRequest(_))));
        assert_eq!(settings.band().enter_m, 200.0);
    }

    #[test]
    fn band_requires_exit_beyond_enter() {
        assert!(ZoneBand::new(200.0, 200.0).is_err());
        assert!(ZoneBand::new(0.0, 10.0).is_err());
    }
}
