use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use crate::config::SourceKind;
use crate::engine::types::FaceLandmarks;
use crate::response::{ok, AppError};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/start", post(start_monitoring))
        .route("/stop", post(stop_monitoring))
        .route("/status", get(get_status))
        .route("/stats", get(get_stats))
        .route("/frames", post(push_frame))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartRequest {
    source: Option<SourceKind>,
}

async fn start_monitoring(
    State(state): State<AppState>,
    body: Option<Json<StartRequest>>,
) -> Result<impl IntoResponse, AppError> {
    let req = body.map(|Json(req)| req).unwrap_or_default();
    let kind = req.source.unwrap_or(state.config().engine.source);
    let started_at = state
        .monitor()
        .start_with(|| state.landmark_source(kind))
        .await?;

    Ok(ok(serde_json::json!({
        "running": true,
        "source": kind,
        "startedAt": started_at,
        "settings": state.monitor().settings().await,
    })))
}

async fn stop_monitoring(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let stats = state.monitor().stop().await;
    Ok(ok(serde_json::json!({
        "running": false,
        "stats": stats,
    })))
}

async fn get_status(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    Ok(ok(state.monitor().status().await))
}

async fn get_stats(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    Ok(ok(state.monitor().snapshot().await))
}

async fn push_frame(
    State(state): State<AppState>,
    Json(frame): Json<FaceLandmarks>,
) -> Result<impl IntoResponse, AppError> {
    frame.check_topology()?;
    let replaced = state.frame_slot().push(frame);
    Ok(ok(serde_json::json!({
        "accepted": true,
        "replaced": replaced,
    })))
}
