//! 告警提示决策
//!
//! 引擎只决定 *是否* 以及 *以什么等级* 发出提示音，波形合成由外部完成。

use serde::{Deserialize, Serialize};

use crate::engine::error::EngineError;
use crate::engine::types::AlertLevel;

const WARNING_TONE_HZ: f64 = 600.0;
const WARNING_TONE_SECS: f64 = 0.3;
const DANGER_TONE_HZ: f64 = 800.0;
const DANGER_TONE_SECS: f64 = 0.5;
/// 音量 100% 时的峰值增益
const FULL_SCALE_GAIN: f64 = 0.3;

/// 瞬时困倦指示的 EAR 余量：低于阈值该值以上视为 High
pub const HIGH_DROWSINESS_MARGIN: f64 = 0.03;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertPreferences {
    pub audio_enabled: bool,
    pub visual_enabled: bool,
    /// 0-100
    pub volume: u8,
}

impl Default for AlertPreferences {
    fn default() -> Self {
        Self {
            audio_enabled: true,
            visual_enabled: true,
            volume: 70,
        }
    }
}

impl AlertPreferences {
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.volume > 100 {
            return Err(EngineError::InvalidConfiguration(format!(
                "volume must be in [0, 100], got {}",
                self.volume
            )));
        }
        Ok(())
    }
}

/// 提示音参数，交给音频协作方合成
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertCue {
    pub level: AlertLevel,
    pub frequency_hz: f64,
    pub duration_secs: f64,
    pub gain: f64,
}

/// 只在进入 Warning / Danger 的那一刻给出提示音
pub fn cue_for(
    level: AlertLevel,
    transitioned: bool,
    prefs: &AlertPreferences,
) -> Option<AlertCue> {
    if !transitioned || !prefs.audio_enabled || prefs.volume == 0 {
        return None;
    }
    let (frequency_hz, duration_secs) = match level {
        AlertLevel::None => return None,
        AlertLevel::Warning => (WARNING_TONE_HZ, WARNING_TONE_SECS),
        AlertLevel::Danger => (DANGER_TONE_HZ, DANGER_TONE_SECS),
    };
    Some(AlertCue {
        level,
        frequency_hz,
        duration_secs,
        gain: FULL_SCALE_GAIN * f64::from(prefs.volume.min(100)) / 100.0,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DrowsinessIndicator {
    Low,
    Medium,
    High,
}

impl DrowsinessIndicator {
    pub fn from_ear(ear: f64, ear_threshold: f64) -> Self {
        if ear < ear_threshold - HIGH_DROWSINESS_MARGIN {
            Self::High
        } else if ear < ear_threshold {
            Self::Medium
        } else {
            Self::Low
        }
    }
}
