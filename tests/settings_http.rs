mod common;

use axum::http::{Method, StatusCode};
use serde_json::json;

use common::app::spawn_test_app;
use common::http::{assert_json_error, assert_status_ok_json, call};

#[tokio::test]
async fn it_settings_defaults() {
    let app = spawn_test_app().await;

    let (status, body) = call(&app.app, Method::GET, "/api/settings", None).await;
    assert_status_ok_json(status, &body);
    let data = &body["data"];
    assert_eq!(data["thresholds"]["earThreshold"], 0.28);
    assert_eq!(data["thresholds"]["marThreshold"], 0.6);
    assert_eq!(data["thresholds"]["sustainSeconds"], 2.0);
    assert_eq!(data["alerts"]["audioEnabled"], true);
    assert_eq!(data["alerts"]["volume"], 70);
}

#[tokio::test]
async fn it_partial_update_keeps_other_fields() {
    let app = spawn_test_app().await;

    let (status, body) = call(
        &app.app,
        Method::PUT,
        "/api/settings",
        Some(json!({ "earThreshold": 0.25, "volume": 40 })),
    )
    .await;
    assert_status_ok_json(status, &body);
    assert_eq!(body["data"]["thresholds"]["earThreshold"], 0.25);
    assert_eq!(body["data"]["thresholds"]["marThreshold"], 0.6);
    assert_eq!(body["data"]["alerts"]["volume"], 40);
}

#[tokio::test]
async fn it_invalid_update_is_rejected_and_previous_kept() {
    let app = spawn_test_app().await;

    for patch in [
        json!({ "earThreshold": 1.2 }),
        json!({ "marThreshold": 0.0 }),
        json!({ "sustainSeconds": -1.0 }),
        json!({ "volume": 101 }),
    ] {
        let (status, body) = call(&app.app, Method::PUT, "/api/settings", Some(patch)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_json_error(&body, "INVALID_CONFIGURATION");
    }

    let (_, body) = call(&app.app, Method::GET, "/api/settings", None).await;
    assert_eq!(body["data"]["thresholds"]["earThreshold"], 0.28);
    assert_eq!(body["data"]["alerts"]["volume"], 70);
}

#[tokio::test]
async fn it_reset_restores_defaults() {
    let app = spawn_test_app().await;

    call(
        &app.app,
        Method::PUT,
        "/api/settings",
        Some(json!({ "marThreshold": 0.9, "audioEnabled": false })),
    )
    .await;

    let (status, body) = call(&app.app, Method::POST, "/api/settings/reset", None).await;
    assert_status_ok_json(status, &body);
    assert_eq!(body["data"]["thresholds"]["marThreshold"], 0.6);
    assert_eq!(body["data"]["alerts"]["audioEnabled"], true);
}
