//! 单次 tick 的处理流水线：几何 → 分类 → 统计
//!
//! 纯同步、确定性，时间由调用方传入。`monitor` 只负责按周期驱动它。

use serde::{Deserialize, Serialize};

use crate::engine::alert::{cue_for, AlertCue, AlertPreferences, DrowsinessIndicator};
use crate::engine::calibration::{CalibrationResult, Calibrator};
use crate::engine::classifier::TemporalClassifier;
use crate::engine::error::EngineError;
use crate::engine::geometry::{compute_face_ratios, Ratio};
use crate::engine::stats::{MinuteTrend, SessionStats, StatisticsAggregator};
use crate::engine::types::{AlertLevel, FaceLandmarks, RatioSample, Thresholds};

/// 可在 tick 之间整体替换的设置快照
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineSettings {
    pub thresholds: Thresholds,
    pub alerts: AlertPreferences,
}

impl EngineSettings {
    pub fn validate(&self) -> Result<(), EngineError> {
        self.thresholds.validate()?;
        self.alerts.validate()
    }
}

/// 每个 tick 发布给 UI / 音频协作方的结果
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TickReport {
    pub level: AlertLevel,
    pub transitioned: bool,
    pub face_detected: bool,
    pub sample: Option<RatioSample>,
    pub eyes_closed: bool,
    pub yawning: bool,
    pub indicator: Option<DrowsinessIndicator>,
    pub cue: Option<AlertCue>,
    pub visual_alert: bool,
    pub calibrating: bool,
    pub stats: SessionStats,
    /// 本 tick 被修正的输入问题（错误码）
    pub diagnostics: Vec<&'static str>,
    #[serde(skip)]
    pub calibration: Option<Result<CalibrationResult, EngineError>>,
}

#[derive(Debug, Clone)]
struct CalibrationWindow {
    started_at: f64,
    baseline_seconds: f64,
    samples: Vec<RatioSample>,
}

#[derive(Debug, Clone)]
pub struct Pipeline {
    classifier: TemporalClassifier,
    aggregator: StatisticsAggregator,
    alerts: AlertPreferences,
    tick_period_secs: f64,
    last_ear: Option<f64>,
    last_mar: Option<f64>,
    calibration: Option<CalibrationWindow>,
}

impl Pipeline {
    pub fn new(settings: EngineSettings, tick_period_secs: f64) -> Self {
        Self {
            classifier: TemporalClassifier::new(settings.thresholds),
            aggregator: StatisticsAggregator::new(),
            alerts: settings.alerts,
            tick_period_secs,
            last_ear: None,
            last_mar: None,
            calibration: None,
        }
    }

    pub fn thresholds(&self) -> &Thresholds {
        self.classifier.thresholds()
    }

    pub fn stats(&self) -> SessionStats {
        self.aggregator.snapshot()
    }

    pub fn trend(&self) -> Vec<MinuteTrend> {
        self.aggregator.trend()
    }

    pub fn is_calibrating(&self) -> bool {
        self.calibration.is_some()
    }

    /// 在 tick 之间应用新设置；阈值非法时保留旧值
    pub fn apply_settings(&mut self, settings: &EngineSettings) -> Result<(), EngineError> {
        settings.validate()?;
        if self.classifier.thresholds() != &settings.thresholds {
            self.classifier.set_thresholds(settings.thresholds)?;
        }
        self.alerts = settings.alerts;
        Ok(())
    }

    /// 从 `now` 起收集 `baseline_seconds` 的有效样本，分类照常进行
    pub fn begin_calibration(&mut self, baseline_seconds: f64, now: f64) {
        self.calibration = Some(CalibrationWindow {
            started_at: now,
            baseline_seconds,
            samples: Vec::new(),
        });
    }

    pub fn tick(
        &mut self,
        frame: Result<FaceLandmarks, EngineError>,
        elapsed_secs: f64,
    ) -> TickReport {
        let mut diagnostics = Vec::new();
        let mut fresh = false;

        let sample = match frame {
            Ok(face) => match compute_face_ratios(&face) {
                Ok(ratios) => {
                    diagnostics.extend(ratios.diagnostics.iter().map(EngineError::code));
                    let ear = resolve_ratio(ratios.ear, self.last_ear);
                    let mar = resolve_ratio(ratios.mar, self.last_mar);
                    fresh = !ratios.ear.degenerate && !ratios.mar.degenerate;
                    match (ear, mar) {
                        (Some(ear), Some(mar)) => Some(RatioSample::new(ear, mar, elapsed_secs)),
                        _ => None,
                    }
                }
                Err(err) => {
                    tracing::warn!(error = %err, "Malformed landmarks, holding previous ratios");
                    diagnostics.push(err.code());
                    self.last_sample(elapsed_secs)
                }
            },
            Err(err) => {
                if err != EngineError::NoFaceDetected {
                    diagnostics.push(err.code());
                }
                None
            }
        };

        let face_detected = sample.is_some();
        let (classification, stats) = match &sample {
            Some(sample) => {
                self.last_ear = Some(sample.ear);
                self.last_mar = Some(sample.mar);
                let c = self.classifier.classify(sample);
                let stats = self.aggregator.update(sample, &c, elapsed_secs);
                (c, stats)
            }
            None => {
                let c = self.classifier.hold();
                let stats = self.aggregator.record_missing(elapsed_secs);
                (c, stats)
            }
        };

        if classification.transitioned {
            tracing::debug!(
                level = classification.level.as_str(),
                ts = elapsed_secs,
                "Alert level changed"
            );
        }

        let calibration = self.advance_calibration(sample.filter(|_| fresh), elapsed_secs);

        let thresholds = *self.classifier.thresholds();
        TickReport {
            level: classification.level,
            transitioned: classification.transitioned,
            face_detected,
            sample,
            eyes_closed: classification.eyes_closed,
            yawning: classification.yawning,
            indicator: sample
                .map(|s| DrowsinessIndicator::from_ear(s.ear, thresholds.ear_threshold)),
            cue: cue_for(classification.level, classification.transitioned, &self.alerts),
            visual_alert: self.alerts.visual_enabled && classification.level.is_alert(),
            calibrating: self.calibration.is_some(),
            stats,
            diagnostics,
            calibration,
        }
    }

    fn last_sample(&self, elapsed_secs: f64) -> Option<RatioSample> {
        match (self.last_ear, self.last_mar) {
            (Some(ear), Some(mar)) => Some(RatioSample::new(ear, mar, elapsed_secs)),
            _ => None,
        }
    }

    fn advance_calibration(
        &mut self,
        sample: Option<RatioSample>,
        elapsed_secs: f64,
    ) -> Option<Result<CalibrationResult, EngineError>> {
        let window = self.calibration.as_mut()?;
        if let Some(sample) = sample {
            window.samples.push(sample);
        }
        if elapsed_secs - window.started_at < window.baseline_seconds {
            return None;
        }

        let window = self.calibration.take()?;
        let calibrator = Calibrator::new(
            self.tick_period_secs,
            self.classifier.thresholds().sustain_seconds,
        );
        Some(calibrator.calibrate(&window.samples, window.baseline_seconds))
    }
}

/// 退化或非有限的比值沿用上一次的有效值；没有历史时只接受有限的钳位值
fn resolve_ratio(ratio: Ratio, last: Option<f64>) -> Option<f64> {
    if !ratio.degenerate && ratio.value.is_finite() {
        return Some(ratio.value);
    }
    last.or_else(|| ratio.value.is_finite().then_some(ratio.value))
}
