//! 会话统计
//!
//! - `total_alerts` / `yawn_count` 只在边沿递增，持续状态不重复计数
//! - `average_ear` 为累计增量均值 `m += (x - m) / n`，不保存累加和
//! - 眨眼率：最近 60 秒内的眨眼次数按 `60 / min(60, 会话时长)` 折算为次/分钟，
//!   会话前 10 秒输出 0
//! - 趋势：按分钟聚合 EAR / MAR 均值和告警数，保留最近 30 分钟

use std::collections::VecDeque;

use serde::Serialize;

use crate::engine::classifier::Classification;
use crate::engine::types::{AlertLevel, RatioSample};

pub const BLINK_WINDOW_SECS: f64 = 60.0;
pub const BLINK_WARMUP_SECS: f64 = 10.0;
pub const TREND_MINUTES: usize = 30;

const RATING_FAIR_ALERTS: u32 = 5;
const RATING_POOR_ALERTS: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionRating {
    #[default]
    Good,
    Fair,
    Poor,
}

impl SessionRating {
    pub fn from_alerts(total_alerts: u32) -> Self {
        match total_alerts {
            n if n < RATING_FAIR_ALERTS => Self::Good,
            n if n < RATING_POOR_ALERTS => Self::Fair,
            _ => Self::Poor,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStats {
    pub total_alerts: u32,
    pub session_duration_seconds: u64,
    pub average_ear: f64,
    pub yawn_count: u32,
    pub blink_rate_estimate: f64,
    pub blink_count: u64,
    pub missed_frames: u64,
    pub alerts_per_minute: f64,
    pub rating: SessionRating,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MinuteTrend {
    pub minute: u64,
    pub mean_ear: f64,
    pub mean_mar: f64,
    pub alerts: u32,
}

#[derive(Debug, Clone, Default)]
struct MinuteAccumulator {
    minute: u64,
    ear_sum: f64,
    mar_sum: f64,
    samples: u32,
    alerts: u32,
}

impl MinuteAccumulator {
    /// 整分钟都没有人脸时没有均值可言，不产生趋势点
    fn to_trend(&self) -> Option<MinuteTrend> {
        if self.samples == 0 {
            return None;
        }
        let n = self.samples as f64;
        Some(MinuteTrend {
            minute: self.minute,
            mean_ear: self.ear_sum / n,
            mean_mar: self.mar_sum / n,
            alerts: self.alerts,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct StatisticsAggregator {
    stats: SessionStats,
    ear_samples: u64,
    last_level: AlertLevel,
    blinks: VecDeque<f64>,
    trend: VecDeque<MinuteTrend>,
    current_minute: MinuteAccumulator,
}

impl StatisticsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> SessionStats {
        self.stats.clone()
    }

    /// 已完成的分钟 + 当前未完成的分钟
    pub fn trend(&self) -> Vec<MinuteTrend> {
        let mut out: Vec<MinuteTrend> = self.trend.iter().cloned().collect();
        out.extend(self.current_minute.to_trend());
        out
    }

    /// 处理一个有效样本。`elapsed_secs` 来自采样循环的会话时钟。
    pub fn update(
        &mut self,
        sample: &RatioSample,
        classification: &Classification,
        elapsed_secs: f64,
    ) -> SessionStats {
        self.advance_clock(elapsed_secs);

        self.ear_samples += 1;
        self.stats.average_ear += (sample.ear - self.stats.average_ear) / self.ear_samples as f64;

        let escalated = classification.transitioned && classification.level > self.last_level;
        self.last_level = classification.level;
        if escalated {
            self.stats.total_alerts = self.stats.total_alerts.saturating_add(1);
            self.current_minute.alerts += 1;
        }

        if classification.yawn_onset {
            self.stats.yawn_count = self.stats.yawn_count.saturating_add(1);
        }

        if let Some(closure) = classification.closure_ended {
            if !closure.sustained {
                self.stats.blink_count += 1;
                self.blinks.push_back(sample.timestamp);
            }
        }

        self.current_minute.ear_sum += sample.ear;
        self.current_minute.mar_sum += sample.mar;
        self.current_minute.samples += 1;

        self.refresh_derived(elapsed_secs);
        self.stats.clone()
    }

    /// 无人脸 tick：只推进时钟并计数
    pub fn record_missing(&mut self, elapsed_secs: f64) -> SessionStats {
        self.advance_clock(elapsed_secs);
        self.stats.missed_frames += 1;
        self.refresh_derived(elapsed_secs);
        self.stats.clone()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    fn advance_clock(&mut self, elapsed_secs: f64) {
        let elapsed_secs = elapsed_secs.max(0.0);
        let whole = elapsed_secs.floor() as u64;
        self.stats.session_duration_seconds = self.stats.session_duration_seconds.max(whole);

        let minute = (elapsed_secs / 60.0).floor() as u64;
        if minute > self.current_minute.minute {
            let finished = std::mem::take(&mut self.current_minute);
            self.trend.extend(finished.to_trend());
            while self.trend.len() > TREND_MINUTES {
                self.trend.pop_front();
            }
            self.current_minute.minute = minute;
        }
    }

    fn refresh_derived(&mut self, elapsed_secs: f64) {
        let cutoff = elapsed_secs - BLINK_WINDOW_SECS;
        while let Some(&front) = self.blinks.front() {
            if front < cutoff {
                self.blinks.pop_front();
            } else {
                break;
            }
        }

        self.stats.blink_rate_estimate = if elapsed_secs < BLINK_WARMUP_SECS {
            0.0
        } else {
            let span = elapsed_secs.min(BLINK_WINDOW_SECS);
            self.blinks.len() as f64 * 60.0 / span
        };

        let minutes = self.stats.session_duration_seconds as f64 / 60.0;
        self.stats.alerts_per_minute = if self.stats.session_duration_seconds == 0 {
            0.0
        } else {
            self.stats.total_alerts as f64 / minutes
        };
        self.stats.rating = SessionRating::from_alerts(self.stats.total_alerts);
    }
}
