use std::env;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::engine::alert::AlertPreferences;
use crate::engine::monitor::MonitorConfig;
use crate::engine::pipeline::EngineSettings;
use crate::engine::types::{
    Thresholds, DEFAULT_EAR_THRESHOLD, DEFAULT_MAR_THRESHOLD, DEFAULT_SUSTAIN_SECONDS,
};

pub const DEFAULT_CALIBRATION_SECONDS: f64 = 10.0;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    pub log_level: String,
    pub enable_file_logs: bool,
    pub log_dir: String,
    pub cors_origin: String,
    pub engine: EngineEnvConfig,
    pub alerts: AlertPreferences,
}

#[derive(Debug, Clone)]
pub struct EngineEnvConfig {
    pub tick_interval_ms: u64,
    pub ear_threshold: f64,
    pub mar_threshold: f64,
    pub sustain_seconds: f64,
    pub calibration_seconds: f64,
    pub auto_calibrate: bool,
    pub source: SourceKind,
    pub frame_max_age_ms: u64,
    pub sim_seed: Option<u64>,
}

/// 关键点来源：外部推送的单槽队列，或演示用随机生成器
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SourceKind {
    #[default]
    Queue,
    Simulated,
}

impl FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "queue" => Ok(Self::Queue),
            "simulated" | "sim" => Ok(Self::Simulated),
            other => Err(format!("unknown landmark source: {other}")),
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Queue => f.write_str("queue"),
            Self::Simulated => f.write_str("simulated"),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            host: env_or_parse("HOST", IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))),
            port: env_or_parse("PORT", 3000_u16),
            log_level: env_or("RUST_LOG", "info"),
            enable_file_logs: env_or_bool("ENABLE_FILE_LOGS", false),
            log_dir: env_or("LOG_DIR", "./logs"),
            cors_origin: env_or("CORS_ORIGIN", "http://localhost:5173"),
            engine: EngineEnvConfig {
                tick_interval_ms: env_or_parse("ENGINE_TICK_INTERVAL_MS", 500_u64),
                ear_threshold: env_or_parse("ENGINE_EAR_THRESHOLD", DEFAULT_EAR_THRESHOLD),
                mar_threshold: env_or_parse("ENGINE_MAR_THRESHOLD", DEFAULT_MAR_THRESHOLD),
                sustain_seconds: env_or_parse("ENGINE_SUSTAIN_SECONDS", DEFAULT_SUSTAIN_SECONDS),
                calibration_seconds: env_or_parse(
                    "ENGINE_CALIBRATION_SECONDS",
                    DEFAULT_CALIBRATION_SECONDS,
                ),
                auto_calibrate: env_or_bool("ENGINE_AUTO_CALIBRATE", true),
                source: env_or_parse("ENGINE_SOURCE", SourceKind::Queue),
                frame_max_age_ms: env_or_parse("ENGINE_FRAME_MAX_AGE_MS", 1000_u64),
                sim_seed: env_opt_parse("ENGINE_SIM_SEED"),
            },
            alerts: AlertPreferences {
                audio_enabled: env_or_bool("ALERT_AUDIO_ENABLED", true),
                visual_enabled: env_or_bool("ALERT_VISUAL_ENABLED", true),
                volume: env_or_parse("ALERT_VOLUME", 70_u8),
            },
        }
    }

    /// 启动时的默认设置；环境变量中的非法阈值回退到内置默认值
    pub fn engine_settings(&self) -> EngineSettings {
        let thresholds = Thresholds {
            ear_threshold: self.engine.ear_threshold,
            mar_threshold: self.engine.mar_threshold,
            sustain_seconds: self.engine.sustain_seconds,
        };
        let thresholds = match thresholds.validate() {
            Ok(()) => thresholds,
            Err(e) => {
                tracing::warn!(error = %e, "Invalid threshold env vars, using defaults");
                Thresholds::default()
            }
        };
        let alerts = match self.alerts.validate() {
            Ok(()) => self.alerts,
            Err(e) => {
                tracing::warn!(error = %e, "Invalid alert env vars, using defaults");
                AlertPreferences::default()
            }
        };
        EngineSettings { thresholds, alerts }
    }

    pub fn monitor_config(&self) -> MonitorConfig {
        let calibration_seconds = self.engine.calibration_seconds;
        let calibration_seconds = if calibration_seconds > 0.0 && calibration_seconds.is_finite() {
            calibration_seconds
        } else {
            tracing::warn!(
                value = calibration_seconds,
                "Invalid ENGINE_CALIBRATION_SECONDS, using default"
            );
            DEFAULT_CALIBRATION_SECONDS
        };
        MonitorConfig {
            tick_interval: Duration::from_millis(self.engine.tick_interval_ms.max(1)),
            calibration_seconds,
            auto_calibrate: self.engine.auto_calibrate,
        }
    }

    pub fn frame_max_age(&self) -> Duration {
        Duration::from_millis(self.engine.frame_max_age_ms)
    }
}

pub fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

pub fn env_or_parse<T>(key: &str, default: T) -> T
where
    T: FromStr + Copy,
{
    match env::var(key) {
        Ok(raw) => match raw.parse::<T>() {
            Ok(v) => v,
            Err(_) => {
                tracing::warn!(
                    key,
                    value = %raw,
                    "Failed to parse env var, using default"
                );
                default
            }
        },
        Err(_) => default,
    }
}

pub fn env_opt_parse<T: FromStr>(key: &str) -> Option<T> {
    let raw = env::var(key).ok()?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "Failed to parse env var, ignoring");
            None
        }
    }
}

pub fn env_or_bool(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => default,
        },
        Err(_) => default,
    }
}
