use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::{Deserialize, Serialize};

use crate::engine::alerts::ActiveAlert;
use crate::error::AppError;
use crate::settings::{ZoneBand, RADIUS_PRESETS_M};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/alerts/active", get(active_alert))
        .route("/alerts/dismiss", post(dismiss_alert))
        .route("/settings/radius", get(get_radius).put(set_radius))
}

#[derive(Serialize)]
struct ActiveAlertResponse {
    active: Option<ActiveAlert>,
    pending: usize,
}

#[derive(Serialize)]
struct RadiusResponse {
    band: ZoneBand,
    presets_m: [f64; 6],
}

#[derive(Deserialize)]
pub struct SetRadiusRequest {
    pub radius_m: f64,
}

async fn active_alert(State(state): State<Arc<AppState>>) -> Json<ActiveAlertResponse> {
    Json(ActiveAlertResponse {
        active: state.dispatcher.active(),
        pending: state.dispatcher.pending(),
    })
}

async fn dismiss_alert(State(state): State<Arc<AppState>>) -> Json<Option<ActiveAlert>> {
    Json(state.dispatcher.dismiss().await)
}

async fn get_radius(State(state): State<Arc<AppState>>) -> Json<RadiusResponse> {
    Json(RadiusResponse {
        band: state.settings.load().await,
        presets_m: RADIUS_PRESETS_M,
    })
}

async fn set_radius(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SetRadiusRequest>,
) -> Result<Json<RadiusResponse>, AppError> {
    let band = state.settings.set_radius(payload.radius_m).await?;
    Ok(Json(RadiusResponse {
        band,
        presets_m: RADIUS_PRESETS_M,
    }))
}
