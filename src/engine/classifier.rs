//! 时序分类器
//!
//! 用 "since" 时间戳做去抖：条件（闭眼 / 哈欠）持续 `sustain_seconds`
//! 以上才视为成立，与采样频率无关。
//! - 两个条件都成立 → Danger
//! - 只有一个成立 → Warning
//! - 都不成立 → None

use serde::Serialize;

use crate::engine::error::EngineError;
use crate::engine::types::{AlertLevel, RatioSample, Thresholds};

/// 分类器内部状态，只在处理样本时被修改
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifierState {
    pub eyes_closed_since: Option<f64>,
    pub yawning_since: Option<f64>,
    pub current_level: AlertLevel,
    pub thresholds: Thresholds,
    /// 上一个样本时闭眼 / 哈欠是否已处于持续状态，用于边沿检测
    pub closure_latched: bool,
    pub yawn_latched: bool,
}

impl ClassifierState {
    pub fn new(thresholds: Thresholds) -> Self {
        Self {
            eyes_closed_since: None,
            yawning_since: None,
            current_level: AlertLevel::None,
            thresholds,
            closure_latched: false,
            yawn_latched: false,
        }
    }
}

/// 一次闭眼结束（睁眼）时的记录，用于眨眼统计
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClosureEnd {
    pub started_at: f64,
    pub duration: f64,
    /// 闭眼期间是否被判定为持续闭眼（否则计为一次眨眼）
    pub sustained: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    pub level: AlertLevel,
    pub transitioned: bool,
    pub eyes_closed: bool,
    pub yawning: bool,
    pub eyes_closed_sustained: bool,
    pub yawning_sustained: bool,
    /// 哈欠刚刚进入持续状态（边沿）
    pub yawn_onset: bool,
    pub closure_ended: Option<ClosureEnd>,
}

impl Classification {
    /// 缺帧时的保持结果：等级不变、无边沿
    fn held(state: &ClassifierState) -> Self {
        Self {
            level: state.current_level,
            transitioned: false,
            eyes_closed: state.eyes_closed_since.is_some(),
            yawning: state.yawning_since.is_some(),
            eyes_closed_sustained: false,
            yawning_sustained: false,
            yawn_onset: false,
            closure_ended: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TemporalClassifier {
    state: ClassifierState,
}

impl TemporalClassifier {
    pub fn new(thresholds: Thresholds) -> Self {
        Self {
            state: ClassifierState::new(thresholds),
        }
    }

    pub fn from_state(state: ClassifierState) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &ClassifierState {
        &self.state
    }

    pub fn level(&self) -> AlertLevel {
        self.state.current_level
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.state.thresholds
    }

    /// 整体替换阈值；校验失败时保留旧值
    pub fn set_thresholds(&mut self, thresholds: Thresholds) -> Result<(), EngineError> {
        thresholds.validate()?;
        self.state.thresholds = thresholds;
        Ok(())
    }

    pub fn classify(&mut self, sample: &RatioSample) -> Classification {
        let thresholds = self.state.thresholds;
        let ts = sample.timestamp;

        let eyes_closed = sample.ear < thresholds.ear_threshold;
        let yawning = sample.mar > thresholds.mar_threshold;

        let mut closure_ended = None;
        if eyes_closed {
            self.state.eyes_closed_since.get_or_insert(ts);
        } else if let Some(since) = self.state.eyes_closed_since.take() {
            let duration = (ts - since).max(0.0);
            closure_ended = Some(ClosureEnd {
                started_at: since,
                duration,
                sustained: self.state.closure_latched,
            });
        }

        if yawning {
            self.state.yawning_since.get_or_insert(ts);
        } else {
            self.state.yawning_since = None;
        }

        let eyes_closed_sustained = self
            .state
            .eyes_closed_since
            .map(|since| is_sustained(since, ts, thresholds.sustain_seconds))
            .unwrap_or(false);
        let yawning_sustained = self
            .state
            .yawning_since
            .map(|since| is_sustained(since, ts, thresholds.sustain_seconds))
            .unwrap_or(false);

        let level = match (eyes_closed_sustained, yawning_sustained) {
            (true, true) => AlertLevel::Danger,
            (true, false) | (false, true) => AlertLevel::Warning,
            (false, false) => AlertLevel::None,
        };

        self.state.closure_latched = eyes_closed_sustained;
        let yawn_onset = yawning_sustained && !self.state.yawn_latched;
        self.state.yawn_latched = yawning_sustained;

        let transitioned = level != self.state.current_level;
        self.state.current_level = level;

        Classification {
            level,
            transitioned,
            eyes_closed,
            yawning,
            eyes_closed_sustained,
            yawning_sustained,
            yawn_onset,
            closure_ended,
        }
    }

    /// 无人脸 tick：不启动也不清除计时器，等级保持
    pub fn hold(&self) -> Classification {
        Classification::held(&self.state)
    }

    pub fn reset(&mut self) {
        self.state = ClassifierState::new(self.state.thresholds);
    }
}

fn is_sustained(since: f64, now: f64, sustain_seconds: f64) -> bool {
    now - since >= sustain_seconds
}
