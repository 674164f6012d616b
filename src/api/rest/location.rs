use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::{Deserialize, Serialize};

use crate::engine::coordinator::{self, StartReport};
use crate::engine::feed::AppVisibility;
use crate::error::AppError;
use crate::models::location::{LocationSample, RawFix};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/location", get(current_location))
        .route("/location/foreground", post(foreground_fix))
        .route("/location/background", post(background_batch))
        .route("/tracking/start", post(start_tracking))
        .route("/tracking/stop", post(stop_tracking))
        .route("/app/visibility", post(set_visibility))
}

#[derive(Deserialize)]
pub struct VisibilityRequest {
    pub visibility: AppVisibility,
}

#[derive(Serialize)]
struct StopResponse {
    stopped: bool,
}

async fn current_location(State(state): State<Arc<AppState>>) -> Json<Option<LocationSample>> {
    Json(state.feed.current())
}

async fn foreground_fix(
    State(state): State<Arc<AppState>>,
    Json(fix): Json<RawFix>,
) -> Json<Option<LocationSample>> {
    Json(state.feed.ingest_foreground(&fix))
}

async fn background_batch(
    State(state): State<Arc<AppState>>,
    Json(fixes): Json<Vec<RawFix>>,
) -> Json<Vec<LocationSample>> {
    Json(state.feed.ingest_background_batch(&fixes))
}

async fn start_tracking(State(state): State<Arc<AppState>>) -> Result<Json<StartReport>, AppError> {
    Ok(Json(coordinator::start_tracking(&state).await?))
}

async fn stop_tracking(State(state): State<Arc<AppState>>) -> Json<StopResponse> {
    Json(StopResponse {
        stopped: coordinator::stop_tracking(&state).await,
    })
}

async fn set_visibility(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<VisibilityRequest>,
) -> Result<StatusCode, AppError> {
    coordinator::set_visibility(&state, payload.visibility).await?;
    Ok(StatusCode::NO_CONTENT)
}
