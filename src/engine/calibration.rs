//! 阈值校准
//!
//! 基线窗口内假设用户清醒、闭口：
//! - `ear_threshold = mean(ear) - K_EAR * std(ear)`
//! - `mar_threshold = mean(mar) + K_MAR * std(mar)`
//!
//! std 为总体标准差。结果钳位到 [`EAR_RANGE`] / [`MAR_RANGE`]，
//! `sustain_seconds` 沿用调用方当前配置，不参与校准。

use serde::{Deserialize, Serialize};

use crate::engine::error::EngineError;
use crate::engine::types::{RatioSample, Thresholds};

pub const K_EAR: f64 = 2.0;
pub const K_MAR: f64 = 3.0;
pub const EAR_RANGE: (f64, f64) = (0.05, 0.95);
pub const MAR_RANGE: (f64, f64) = (0.05, 1.95);

/// 最少需要覆盖的基线时长（秒）
pub const MIN_BASELINE_SECS: f64 = 5.0;
const MIN_ABSOLUTE_SAMPLES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaselineStats {
    pub samples: usize,
    pub ear_mean: f64,
    pub ear_std: f64,
    pub mar_mean: f64,
    pub mar_std: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalibrationResult {
    pub thresholds: Thresholds,
    pub baseline: BaselineStats,
}

#[derive(Debug, Clone)]
pub struct Calibrator {
    /// 采样周期（秒），用于换算最少样本数
    expected_period_secs: f64,
    sustain_seconds: f64,
}

impl Calibrator {
    pub fn new(expected_period_secs: f64, sustain_seconds: f64) -> Self {
        Self {
            expected_period_secs: if expected_period_secs > 0.0 {
                expected_period_secs
            } else {
                0.5
            },
            sustain_seconds,
        }
    }

    pub fn required_samples(&self, baseline_seconds: f64) -> usize {
        let covered = MIN_BASELINE_SECS.min(baseline_seconds.max(0.0));
        let n = (covered / self.expected_period_secs).ceil() as usize;
        n.max(MIN_ABSOLUTE_SAMPLES)
    }

    pub fn calibrate(
        &self,
        samples: &[RatioSample],
        baseline_seconds: f64,
    ) -> Result<CalibrationResult, EngineError> {
        let start = samples
            .iter()
            .find(|s| s.timestamp.is_finite())
            .map(|s| s.timestamp)
            .unwrap_or(0.0);
        let window: Vec<&RatioSample> = samples
            .iter()
            .filter(|s| s.ear.is_finite() && s.mar.is_finite())
            .filter(|s| s.timestamp - start <= baseline_seconds)
            .collect();

        let required = self.required_samples(baseline_seconds);
        if window.len() < required {
            return Err(EngineError::InsufficientSamples {
                required,
                actual: window.len(),
            });
        }

        let (ear_mean, ear_std) = mean_std(window.iter().map(|s| s.ear));
        let (mar_mean, mar_std) = mean_std(window.iter().map(|s| s.mar));

        let thresholds = Thresholds {
            ear_threshold: (ear_mean - K_EAR * ear_std).clamp(EAR_RANGE.0, EAR_RANGE.1),
            mar_threshold: (mar_mean + K_MAR * mar_std).clamp(MAR_RANGE.0, MAR_RANGE.1),
            sustain_seconds: self.sustain_seconds,
        };
        thresholds.validate()?;

        Ok(CalibrationResult {
            thresholds,
            baseline: BaselineStats {
                samples: window.len(),
                ear_mean,
                ear_std,
                mar_mean,
                mar_std,
            },
        })
    }
}

/// 增量计算均值与总体标准差
fn mean_std(values: impl Iterator<Item = f64>) -> (f64, f64) {
    let mut n = 0u64;
    let mut mean = 0.0;
    let mut m2 = 0.0;
    for x in values {
        n += 1;
        let delta = x - mean;
        mean += delta / n as f64;
        m2 += delta * (x - mean);
    }
    if n == 0 {
        return (0.0, 0.0);
    }
    (mean, (m2 / n as f64).max(0.0).sqrt())
}
