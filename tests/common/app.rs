use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use axum::Router;
use tokio::sync::broadcast;

use drowsiness_engine::config::{Config, EngineEnvConfig, SourceKind};
use drowsiness_engine::engine::alert::AlertPreferences;
use drowsiness_engine::routes::build_router;
use drowsiness_engine::state::AppState;

pub struct TestApp {
    pub app: Router,
    pub state: AppState,
    pub config: Config,
}

/// 直接构造 Config，避免使用 set_var 造成多线程测试环境变量竞态
pub fn test_config() -> Config {
    Config {
        host: IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)),
        port: 3000,
        log_level: "info".to_string(),
        enable_file_logs: false,
        log_dir: "./logs".to_string(),
        cors_origin: "http://localhost:5173".to_string(),
        engine: EngineEnvConfig {
            tick_interval_ms: 10,
            ear_threshold: 0.28,
            mar_threshold: 0.60,
            sustain_seconds: 2.0,
            calibration_seconds: 0.1,
            auto_calibrate: false,
            source: SourceKind::Queue,
            frame_max_age_ms: 1000,
            sim_seed: Some(7),
        },
        alerts: AlertPreferences::default(),
    }
}

pub async fn spawn_with(config: Config) -> TestApp {
    let (shutdown_tx, _) = broadcast::channel::<()>(8);
    let state = AppState::new(&config, shutdown_tx);
    let app = build_router(state.clone());

    TestApp { app, state, config }
}

pub async fn spawn_test_app() -> TestApp {
    spawn_with(test_config()).await
}

/// 等待采样循环至少跑几个 tick
pub async fn let_ticks_run(app: &TestApp, ticks: u32) {
    let interval = Duration::from_millis(app.config.engine.tick_interval_ms);
    tokio::time::sleep(interval * ticks).await;
}
