mod common;

use std::time::Duration;

use axum::http::{Method, StatusCode};
use serde_json::{json, Value};

use common::app::spawn_test_app;
use common::http::{assert_json_error, assert_status_ok_json, call};

/// 均值 0.32、总体标准差 0.02 的基线样本
fn baseline_samples(n: usize, period: f64) -> Vec<Value> {
    (0..n)
        .map(|i| {
            let ear = if i % 2 == 0 { 0.30 } else { 0.34 };
            json!({ "ear": ear, "mar": 0.30, "timestamp": i as f64 * period })
        })
        .collect()
}

#[tokio::test]
async fn it_calibration_requires_running_session() {
    let app = spawn_test_app().await;

    let (status, body) = call(&app.app, Method::POST, "/api/calibration", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_json_error(&body, "NOT_RUNNING");
}

#[tokio::test]
async fn it_compute_applies_thresholds() {
    let app = spawn_test_app().await;

    let (status, body) = call(
        &app.app,
        Method::POST,
        "/api/calibration/compute",
        Some(json!({ "samples": baseline_samples(20, 0.005), "baselineSeconds": 0.1 })),
    )
    .await;
    assert_status_ok_json(status, &body);
    let ear = body["data"]["thresholds"]["earThreshold"].as_f64().unwrap();
    assert!((ear - 0.28).abs() < 1e-9);
    assert_eq!(body["data"]["baseline"]["samples"], 20);

    let (_, settings) = call(&app.app, Method::GET, "/api/settings", None).await;
    let applied = settings["data"]["thresholds"]["earThreshold"].as_f64().unwrap();
    assert!((applied - ear).abs() < 1e-12);
    assert_eq!(settings["data"]["thresholds"]["sustainSeconds"], 2.0);
}

#[tokio::test]
async fn it_compute_with_too_few_samples_keeps_thresholds() {
    let app = spawn_test_app().await;

    let (status, body) = call(
        &app.app,
        Method::POST,
        "/api/calibration/compute",
        Some(json!({ "samples": baseline_samples(2, 0.5), "baselineSeconds": 10.0 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_json_error(&body, "INSUFFICIENT_SAMPLES");

    let (_, settings) = call(&app.app, Method::GET, "/api/settings", None).await;
    assert_eq!(settings["data"]["thresholds"]["earThreshold"], 0.28);
}

#[tokio::test]
async fn it_calibration_window_on_running_session() {
    let app = spawn_test_app().await;
    let mut events = app.state.monitor().subscribe();

    call(
        &app.app,
        Method::POST,
        "/api/monitor/start",
        Some(json!({ "source": "simulated" })),
    )
    .await;

    let (status, body) = call(
        &app.app,
        Method::POST,
        "/api/calibration",
        Some(json!({ "baselineSeconds": 0.1 })),
    )
    .await;
    assert_status_ok_json(status, &body);
    assert_eq!(body["data"]["baselineSeconds"], 0.1);

    let mut finished = None;
    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    while finished.is_none() && tokio::time::Instant::now() < deadline {
        if let Ok(Ok(event)) = tokio::time::timeout(Duration::from_millis(200), events.recv()).await {
            match event.name() {
                "calibration_completed" => finished = Some(true),
                "calibration_failed" => {
                    // 调度抖动导致样本不足时重新开窗
                    app.state.monitor().request_calibration(Some(0.1)).await.unwrap();
                }
                _ => {}
            }
        }
    }
    app.state.monitor().stop().await;
    assert_eq!(finished, Some(true));

    let (_, status_body) = call(&app.app, Method::GET, "/api/monitor/status", None).await;
    assert!(status_body["data"]["lastCalibration"].is_object());
}

#[tokio::test]
async fn it_invalid_baseline_is_rejected() {
    let app = spawn_test_app().await;
    call(&app.app, Method::POST, "/api/monitor/start", None).await;

    let (status, body) = call(
        &app.app,
        Method::POST,
        "/api/calibration",
        Some(json!({ "baselineSeconds": 0.0 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_json_error(&body, "INVALID_CONFIGURATION");

    app.state.monitor().stop().await;
}
