use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::engine::monitor::SettingsPatch;
use crate::response::{ok, AppError};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(get_settings).put(update_settings))
        .route("/reset", post(reset_settings))
}

async fn get_settings(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    Ok(ok(state.monitor().settings().await))
}

async fn update_settings(
    State(state): State<AppState>,
    Json(patch): Json<SettingsPatch>,
) -> Result<impl IntoResponse, AppError> {
    let settings = state.monitor().update_settings(&patch).await?;
    Ok(ok(settings))
}

async fn reset_settings(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    Ok(ok(state.monitor().reset_settings().await))
}
