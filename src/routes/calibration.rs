use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;

use crate::engine::types::RatioSample;
use crate::response::{ok, AppError};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(start_calibration))
        .route("/compute", post(compute_calibration))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CalibrationRequest {
    baseline_seconds: Option<f64>,
}

async fn start_calibration(
    State(state): State<AppState>,
    body: Option<Json<CalibrationRequest>>,
) -> Result<impl IntoResponse, AppError> {
    if !state.monitor().is_running().await {
        return Err(AppError::bad_request(
            "NOT_RUNNING",
            "Start monitoring before calibrating",
        ));
    }
    let req = body.map(|Json(req)| req).unwrap_or_default();
    let baseline = state
        .monitor()
        .request_calibration(req.baseline_seconds)
        .await?;
    Ok(ok(serde_json::json!({
        "armed": true,
        "baselineSeconds": baseline,
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ComputeRequest {
    samples: Vec<RatioSample>,
    baseline_seconds: Option<f64>,
}

async fn compute_calibration(
    State(state): State<AppState>,
    Json(req): Json<ComputeRequest>,
) -> Result<impl IntoResponse, AppError> {
    let baseline = req
        .baseline_seconds
        .unwrap_or(state.monitor().config().calibration_seconds);
    let result = state
        .monitor()
        .calibrate_from(&req.samples, baseline)
        .await?;
    Ok(ok(result))
}
