use std::fmt;

use serde::{Deserialize, Serialize};

use crate::engine::error::EngineError;

/// 眼部关键点数量：外眼角、上睑1、上睑2、内眼角、下睑2、下睑1
pub const EYE_POINTS: usize = 6;

/// 嘴部关键点数量：左嘴角、上唇1、上唇中、上唇2、右嘴角、下唇2、下唇中、下唇1
pub const MOUTH_POINTS: usize = 8;

/// 二维点（图像坐标或归一化坐标均可，比值与尺度无关）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// 单帧面部关键点。
///
/// `right_eye` 为空时按单眼计算 EAR。每帧只在一次 tick 内被消费。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FaceLandmarks {
    pub left_eye: Vec<Point>,
    #[serde(default)]
    pub right_eye: Vec<Point>,
    pub mouth: Vec<Point>,
}

impl FaceLandmarks {
    /// 拓扑校验，不做几何计算。用于入队前快速拒绝格式错误的帧。
    pub fn check_topology(&self) -> Result<(), EngineError> {
        check_len(LandmarkPart::LeftEye, &self.left_eye, EYE_POINTS)?;
        if !self.right_eye.is_empty() {
            check_len(LandmarkPart::RightEye, &self.right_eye, EYE_POINTS)?;
        }
        check_len(LandmarkPart::Mouth, &self.mouth, MOUTH_POINTS)
    }
}

fn check_len(part: LandmarkPart, points: &[Point], expected: usize) -> Result<(), EngineError> {
    if points.len() != expected {
        return Err(EngineError::InvalidLandmarkTopology {
            part,
            expected,
            actual: points.len(),
        });
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LandmarkPart {
    LeftEye,
    RightEye,
    Mouth,
}

impl fmt::Display for LandmarkPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::LeftEye => "left_eye",
            Self::RightEye => "right_eye",
            Self::Mouth => "mouth",
        };
        f.write_str(name)
    }
}

/// 单个采样点：EAR / MAR 与会话内单调时间戳（秒）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RatioSample {
    pub ear: f64,
    pub mar: f64,
    pub timestamp: f64,
}

impl RatioSample {
    pub fn new(ear: f64, mar: f64, timestamp: f64) -> Self {
        Self {
            ear,
            mar,
            timestamp,
        }
    }
}

/// 告警等级，全序 None < Warning < Danger
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub enum AlertLevel {
    #[default]
    None,
    Warning,
    Danger,
}

impl AlertLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Warning => "warning",
            Self::Danger => "danger",
        }
    }

    pub fn is_alert(self) -> bool {
        self != Self::None
    }
}

pub const DEFAULT_EAR_THRESHOLD: f64 = 0.28;
pub const DEFAULT_MAR_THRESHOLD: f64 = 0.60;
pub const DEFAULT_SUSTAIN_SECONDS: f64 = 2.0;

/// 检测阈值快照。整体替换，不做字段级更新。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Thresholds {
    pub ear_threshold: f64,
    pub mar_threshold: f64,
    pub sustain_seconds: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            ear_threshold: DEFAULT_EAR_THRESHOLD,
            mar_threshold: DEFAULT_MAR_THRESHOLD,
            sustain_seconds: DEFAULT_SUSTAIN_SECONDS,
        }
    }
}

impl Thresholds {
    pub fn validate(&self) -> Result<(), EngineError> {
        if !(self.ear_threshold > 0.0 && self.ear_threshold < 1.0) {
            return Err(EngineError::InvalidConfiguration(format!(
                "earThreshold must be in (0, 1), got {}",
                self.ear_threshold
            )));
        }
        if !(self.mar_threshold > 0.0 && self.mar_threshold < 2.0) {
            return Err(EngineError::InvalidConfiguration(format!(
                "marThreshold must be in (0, 2), got {}",
                self.mar_threshold
            )));
        }
        if !(self.sustain_seconds >= 0.0 && self.sustain_seconds.is_finite()) {
            return Err(EngineError::InvalidConfiguration(format!(
                "sustainSeconds must be >= 0, got {}",
                self.sustain_seconds
            )));
        }
        Ok(())
    }
}
