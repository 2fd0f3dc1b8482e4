//! 采样循环
//!
//! 单个 tokio 任务按固定周期驱动 [`Pipeline`]，状态 Idle → Running → Idle。
//! - 同一时刻只有一个 tick 在执行；来源迟到时跳过而不是堆积
//! - 设置只在 tick 之间替换，读者总是看到完整的快照
//! - stop 等待进行中的 tick 完成后再释放来源

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, oneshot, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::engine::calibration::{CalibrationResult, Calibrator};
use crate::engine::error::EngineError;
use crate::engine::pipeline::{EngineSettings, Pipeline, TickReport};
use crate::engine::source::LandmarkSource;
use crate::engine::stats::{MinuteTrend, SessionStats};
use crate::engine::types::{RatioSample, Thresholds};

const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub tick_interval: Duration,
    pub calibration_seconds: f64,
    pub auto_calibrate: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(500),
            calibration_seconds: 10.0,
            auto_calibrate: true,
        }
    }
}

/// 推送给实时订阅者的事件
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum MonitorEvent {
    SessionStarted {
        started_at: DateTime<Utc>,
        thresholds: Thresholds,
    },
    Tick(TickReport),
    CalibrationStarted {
        baseline_seconds: f64,
    },
    CalibrationCompleted(CalibrationResult),
    CalibrationFailed {
        code: &'static str,
        message: String,
    },
    SessionStopped {
        stats: SessionStats,
    },
}

impl MonitorEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::SessionStarted { .. } => "session_started",
            Self::Tick(_) => "tick",
            Self::CalibrationStarted { .. } => "calibration_started",
            Self::CalibrationCompleted(_) => "calibration_completed",
            Self::CalibrationFailed { .. } => "calibration_failed",
            Self::SessionStopped { .. } => "session_stopped",
        }
    }
}

/// 局部更新设置；缺省字段保持不变
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsPatch {
    pub ear_threshold: Option<f64>,
    pub mar_threshold: Option<f64>,
    pub sustain_seconds: Option<f64>,
    pub audio_enabled: Option<bool>,
    pub visual_enabled: Option<bool>,
    pub volume: Option<u8>,
}

impl SettingsPatch {
    pub fn apply_to(&self, base: EngineSettings) -> EngineSettings {
        let mut next = base;
        if let Some(v) = self.ear_threshold {
            next.thresholds.ear_threshold = v;
        }
        if let Some(v) = self.mar_threshold {
            next.thresholds.mar_threshold = v;
        }
        if let Some(v) = self.sustain_seconds {
            next.thresholds.sustain_seconds = v;
        }
        if let Some(v) = self.audio_enabled {
            next.alerts.audio_enabled = v;
        }
        if let Some(v) = self.visual_enabled {
            next.alerts.visual_enabled = v;
        }
        if let Some(v) = self.volume {
            next.alerts.volume = v;
        }
        next
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorStatus {
    pub running: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub settings: EngineSettings,
    pub calibrating: bool,
    pub last_calibration: Option<CalibrationResult>,
    pub latest: Option<TickReport>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub stats: SessionStats,
    pub trend: Vec<MinuteTrend>,
}

struct Shared {
    settings: RwLock<EngineSettings>,
    latest: RwLock<Option<TickReport>>,
    trend: RwLock<Vec<MinuteTrend>>,
    last_calibration: RwLock<Option<CalibrationResult>>,
    pending_calibration: std::sync::Mutex<Option<f64>>,
    events: broadcast::Sender<MonitorEvent>,
}

impl Shared {
    fn publish(&self, event: MonitorEvent) {
        // 没有订阅者时发送失败是正常情况
        let _ = self.events.send(event);
    }

    fn take_pending_calibration(&self) -> Option<f64> {
        self.pending_calibration
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
    }

    fn set_pending_calibration(&self, baseline: Option<f64>) {
        *self
            .pending_calibration
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = baseline;
    }

    /// 校准结果只替换 EAR / MAR 阈值，持续时间沿用当前设置
    async fn apply_calibration(&self, result: &CalibrationResult) {
        {
            let mut settings = self.settings.write().await;
            settings.thresholds.ear_threshold = result.thresholds.ear_threshold;
            settings.thresholds.mar_threshold = result.thresholds.mar_threshold;
        }
        *self.last_calibration.write().await = Some(*result);
        tracing::info!(
            ear_threshold = result.thresholds.ear_threshold,
            mar_threshold = result.thresholds.mar_threshold,
            samples = result.baseline.samples,
            "Calibration applied"
        );
        self.publish(MonitorEvent::CalibrationCompleted(*result));
    }
}

struct Session {
    started_at: DateTime<Utc>,
    stop_tx: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

pub struct Monitor {
    config: MonitorConfig,
    defaults: EngineSettings,
    shared: Arc<Shared>,
    session: Mutex<Option<Session>>,
}

impl Monitor {
    pub fn new(config: MonitorConfig, defaults: EngineSettings) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            config,
            defaults,
            shared: Arc::new(Shared {
                settings: RwLock::new(defaults),
                latest: RwLock::new(None),
                trend: RwLock::new(Vec::new()),
                last_calibration: RwLock::new(None),
                pending_calibration: std::sync::Mutex::new(None),
                events,
            }),
            session: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.shared.events.subscribe()
    }

    pub async fn is_running(&self) -> bool {
        self.session
            .lock()
            .await
            .as_ref()
            .map(|s| !s.handle.is_finished())
            .unwrap_or(false)
    }

    /// 开始新会话，统计清零；已在运行时返回 `AlreadyRunning`
    pub async fn start(
        &self,
        source: Box<dyn LandmarkSource>,
    ) -> Result<DateTime<Utc>, EngineError> {
        self.start_with(move || source).await
    }

    /// 同 [`Monitor::start`]，但只在确认没有会话运行后才构造来源，
    /// 被拒绝的启动不会触碰正在使用的来源
    pub async fn start_with<F>(&self, make_source: F) -> Result<DateTime<Utc>, EngineError>
    where
        F: FnOnce() -> Box<dyn LandmarkSource>,
    {
        let mut session = self.session.lock().await;
        if session.as_ref().is_some_and(|s| !s.handle.is_finished()) {
            return Err(EngineError::AlreadyRunning);
        }
        let source = make_source();

        *self.shared.latest.write().await = None;
        self.shared.trend.write().await.clear();
        self.shared.set_pending_calibration(
            self.config
                .auto_calibrate
                .then_some(self.config.calibration_seconds),
        );

        let settings = *self.shared.settings.read().await;
        let started_at = Utc::now();
        self.shared.publish(MonitorEvent::SessionStarted {
            started_at,
            thresholds: settings.thresholds,
        });

        let (stop_tx, stop_rx) = oneshot::channel();
        let handle = tokio::spawn(run_loop(
            self.shared.clone(),
            source,
            stop_rx,
            self.config.tick_interval,
        ));

        *session = Some(Session {
            started_at,
            stop_tx,
            handle,
        });

        tracing::info!(
            tick_ms = self.config.tick_interval.as_millis() as u64,
            auto_calibrate = self.config.auto_calibrate,
            "Monitoring session started"
        );
        Ok(started_at)
    }

    /// 幂等；返回最后一次会话的统计（从未运行过则为 None）
    ///
    /// 会话锁一直持有到旧循环退出、来源释放之后，
    /// 并发的 start 只能在此之后开始新循环
    pub async fn stop(&self) -> Option<SessionStats> {
        let mut guard = self.session.lock().await;
        let Some(session) = guard.take() else {
            return self.stats().await;
        };

        let _ = session.stop_tx.send(());
        if let Err(e) = session.handle.await {
            tracing::error!(error = %e, "Sampling loop task failed");
        }
        self.shared.set_pending_calibration(None);

        let stats = self.stats().await;
        let duration = stats
            .as_ref()
            .map(|s| s.session_duration_seconds)
            .unwrap_or(0);
        tracing::info!(duration_secs = duration, "Monitoring session stopped");
        self.shared.publish(MonitorEvent::SessionStopped {
            stats: stats.clone().unwrap_or_default(),
        });
        stats
    }

    pub async fn status(&self) -> MonitorStatus {
        let (running, started_at) = {
            let session = self.session.lock().await;
            match session.as_ref() {
                Some(s) if !s.handle.is_finished() => (true, Some(s.started_at)),
                _ => (false, None),
            }
        };
        let latest = self.shared.latest.read().await.clone();
        MonitorStatus {
            running,
            started_at,
            settings: *self.shared.settings.read().await,
            calibrating: latest.as_ref().map(|r| r.calibrating).unwrap_or(false),
            last_calibration: *self.shared.last_calibration.read().await,
            latest,
        }
    }

    pub async fn latest(&self) -> Option<TickReport> {
        self.shared.latest.read().await.clone()
    }

    pub async fn stats(&self) -> Option<SessionStats> {
        self.shared
            .latest
            .read()
            .await
            .as_ref()
            .map(|r| r.stats.clone())
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            stats: self.stats().await.unwrap_or_default(),
            trend: self.shared.trend.read().await.clone(),
        }
    }

    pub async fn settings(&self) -> EngineSettings {
        *self.shared.settings.read().await
    }

    /// 校验整份新设置后再替换，失败时旧设置保持生效
    pub async fn update_settings(
        &self,
        patch: &SettingsPatch,
    ) -> Result<EngineSettings, EngineError> {
        let mut settings = self.shared.settings.write().await;
        let next = patch.apply_to(*settings);
        if let Err(e) = next.validate() {
            tracing::warn!(error = %e, "Rejected settings update");
            return Err(e);
        }
        *settings = next;
        tracing::info!(
            ear_threshold = next.thresholds.ear_threshold,
            mar_threshold = next.thresholds.mar_threshold,
            sustain_seconds = next.thresholds.sustain_seconds,
            "Settings updated"
        );
        Ok(next)
    }

    pub async fn reset_settings(&self) -> EngineSettings {
        *self.shared.settings.write().await = self.defaults;
        tracing::info!("Settings reset to defaults");
        self.defaults
    }

    /// 在运行中的会话上开启校准窗口
    pub async fn request_calibration(
        &self,
        baseline_seconds: Option<f64>,
    ) -> Result<f64, EngineError> {
        let baseline = baseline_seconds.unwrap_or(self.config.calibration_seconds);
        if !(baseline > 0.0 && baseline.is_finite()) {
            return Err(EngineError::InvalidConfiguration(format!(
                "baselineSeconds must be > 0, got {baseline}"
            )));
        }
        self.shared.set_pending_calibration(Some(baseline));
        Ok(baseline)
    }

    /// 直接用调用方提供的样本校准并应用
    pub async fn calibrate_from(
        &self,
        samples: &[RatioSample],
        baseline_seconds: f64,
    ) -> Result<CalibrationResult, EngineError> {
        let sustain = self.shared.settings.read().await.thresholds.sustain_seconds;
        let calibrator = Calibrator::new(self.config.tick_interval.as_secs_f64(), sustain);
        match calibrator.calibrate(samples, baseline_seconds) {
            Ok(result) => {
                self.shared.apply_calibration(&result).await;
                Ok(result)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Calibration rejected");
                Err(e)
            }
        }
    }
}

async fn run_loop(
    shared: Arc<Shared>,
    mut source: Box<dyn LandmarkSource>,
    mut stop_rx: oneshot::Receiver<()>,
    tick_interval: Duration,
) {
    let settings = *shared.settings.read().await;
    let mut pipeline = Pipeline::new(settings, tick_interval.as_secs_f64());
    let mut interval = tokio::time::interval(tick_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let clock = Instant::now();

    loop {
        tokio::select! {
            biased;
            _ = &mut stop_rx => break,
            _ = interval.tick() => {
                let elapsed = clock.elapsed().as_secs_f64();

                let settings = *shared.settings.read().await;
                if let Err(e) = pipeline.apply_settings(&settings) {
                    tracing::warn!(error = %e, "Skipping invalid settings snapshot");
                }

                if let Some(baseline) = shared.take_pending_calibration() {
                    pipeline.begin_calibration(baseline, elapsed);
                    tracing::info!(baseline_secs = baseline, "Calibration window opened");
                    shared.publish(MonitorEvent::CalibrationStarted { baseline_seconds: baseline });
                }

                let frame = source.next_frame();
                let report = pipeline.tick(frame, elapsed);

                match &report.calibration {
                    Some(Ok(result)) => {
                        shared.apply_calibration(result).await;
                        let settings = *shared.settings.read().await;
                        if let Err(e) = pipeline.apply_settings(&settings) {
                            tracing::warn!(error = %e, "Calibrated thresholds rejected");
                        }
                    }
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "Calibration failed, keeping previous thresholds");
                        shared.publish(MonitorEvent::CalibrationFailed {
                            code: e.code(),
                            message: e.to_string(),
                        });
                    }
                    None => {}
                }

                *shared.trend.write().await = pipeline.trend();
                *shared.latest.write().await = Some(report.clone());
                shared.publish(MonitorEvent::Tick(report));
            }
        }
    }

    source.release();
    tracing::debug!("Sampling loop exited");
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use super::*;
    use crate::engine::source::{synthetic_face, SimulatedSource};
    use crate::engine::types::{AlertLevel, FaceLandmarks};

    fn fast_config(auto_calibrate: bool) -> MonitorConfig {
        MonitorConfig {
            tick_interval: Duration::from_millis(10),
            calibration_seconds: 0.1,
            auto_calibrate,
        }
    }

    struct ClosedEyes;

    impl LandmarkSource for ClosedEyes {
        fn next_frame(&mut self) -> Result<FaceLandmarks, EngineError> {
            Ok(synthetic_face(0.10, 0.30))
        }
    }

    /// 记录 next_frame 的重叠、完成次数和 release 调用
    #[derive(Default)]
    struct TickTracker {
        in_flight: AtomicBool,
        overlaps: AtomicUsize,
        frames: AtomicUsize,
        releases: AtomicUsize,
        released_mid_tick: AtomicBool,
        calls: std::sync::Mutex<Vec<Instant>>,
    }

    struct TrackedSource {
        tracker: Arc<TickTracker>,
        delay: Duration,
        slow_calls: usize,
    }

    impl TrackedSource {
        fn new(tracker: &Arc<TickTracker>, delay: Duration, slow_calls: usize) -> Self {
            Self {
                tracker: tracker.clone(),
                delay,
                slow_calls,
            }
        }
    }

    impl LandmarkSource for TrackedSource {
        fn next_frame(&mut self) -> Result<FaceLandmarks, EngineError> {
            if self.tracker.in_flight.swap(true, Ordering::SeqCst) {
                self.tracker.overlaps.fetch_add(1, Ordering::SeqCst);
            }
            if self.slow_calls > 0 {
                self.slow_calls -= 1;
                std::thread::sleep(self.delay);
            }
            self.tracker.calls.lock().unwrap().push(Instant::now());
            self.tracker.frames.fetch_add(1, Ordering::SeqCst);
            self.tracker.in_flight.store(false, Ordering::SeqCst);
            Ok(synthetic_face(0.30, 0.30))
        }

        fn release(&mut self) {
            if self.tracker.in_flight.load(Ordering::SeqCst) {
                self.tracker.released_mid_tick.store(true, Ordering::SeqCst);
            }
            self.tracker.releases.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn start_during_stop_waits_for_old_loop() {
        let monitor = Arc::new(Monitor::new(fast_config(false), EngineSettings::default()));
        let tracker = Arc::new(TickTracker::default());

        monitor
            .start(Box::new(TrackedSource::new(
                &tracker,
                Duration::from_millis(300),
                usize::MAX,
            )))
            .await
            .unwrap();
        // 第一个 tick 立即触发，此时正阻塞在慢来源里
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(tracker.in_flight.load(Ordering::SeqCst));

        let stopper = {
            let monitor = monitor.clone();
            tokio::spawn(async move { monitor.stop().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        monitor
            .start(Box::new(TrackedSource::new(&tracker, Duration::ZERO, 0)))
            .await
            .unwrap();
        assert_eq!(tracker.releases.load(Ordering::SeqCst), 1);
        assert!(stopper.await.unwrap().is_some());

        tokio::time::sleep(Duration::from_millis(60)).await;
        monitor.stop().await;

        assert_eq!(tracker.overlaps.load(Ordering::SeqCst), 0);
        assert!(tracker.frames.load(Ordering::SeqCst) > 1);
        assert_eq!(tracker.releases.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn stop_finishes_in_flight_tick_then_releases_once() {
        let monitor = Monitor::new(fast_config(false), EngineSettings::default());
        let tracker = Arc::new(TickTracker::default());
        monitor
            .start(Box::new(TrackedSource::new(
                &tracker,
                Duration::from_millis(100),
                1,
            )))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(tracker.in_flight.load(Ordering::SeqCst));

        monitor.stop().await;
        assert_eq!(tracker.frames.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.releases.load(Ordering::SeqCst), 1);
        assert!(!tracker.released_mid_tick.load(Ordering::SeqCst));
        // 进行中的 tick 的结果已经发布
        assert!(monitor.latest().await.unwrap().face_detected);

        monitor.stop().await;
        assert_eq!(tracker.releases.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn late_ticks_are_skipped_not_replayed() {
        let monitor = Monitor::new(fast_config(false), EngineSettings::default());
        let tracker = Arc::new(TickTracker::default());
        monitor
            .start(Box::new(TrackedSource::new(
                &tracker,
                Duration::from_millis(200),
                1,
            )))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        monitor.stop().await;

        let calls = tracker.calls.lock().unwrap().clone();
        assert!(calls.len() >= 3);
        let stall_end = calls[0];
        // 停顿 200ms 相当于错过 20 个 tick；堆积模式会在停顿后立刻连发
        let burst = calls[1..]
            .iter()
            .filter(|t| t.duration_since(stall_end) < Duration::from_millis(25))
            .count();
        assert!(burst <= 5, "{burst} ticks fired right after the stall");
        assert_eq!(tracker.overlaps.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn start_twice_is_rejected_and_stop_is_idempotent() {
        let monitor = Monitor::new(fast_config(false), EngineSettings::default());
        assert!(monitor.stop().await.is_none());

        monitor
            .start(Box::new(SimulatedSource::new(Some(3))))
            .await
            .unwrap();
        let err = monitor
            .start(Box::new(SimulatedSource::new(Some(3))))
            .await
            .unwrap_err();
        assert_eq!(err, EngineError::AlreadyRunning);

        tokio::time::sleep(Duration::from_millis(60)).await;
        let stats = monitor.stop().await.unwrap();
        assert!(!monitor.is_running().await);
        assert_eq!(monitor.stop().await, Some(stats));
    }

    #[tokio::test]
    async fn ticks_are_published_to_subscribers() {
        let monitor = Monitor::new(fast_config(false), EngineSettings::default());
        let mut rx = monitor.subscribe();
        monitor
            .start(Box::new(SimulatedSource::new(Some(9))))
            .await
            .unwrap();

        let first = rx.recv().await.unwrap();
        assert_eq!(first.name(), "session_started");
        let tick = rx.recv().await.unwrap();
        assert_eq!(tick.name(), "tick");
        monitor.stop().await;
    }

    #[tokio::test]
    async fn sustained_closure_raises_warning() {
        let mut settings = EngineSettings::default();
        settings.thresholds.sustain_seconds = 0.02;
        let monitor = Monitor::new(fast_config(false), settings);
        monitor.start(Box::new(ClosedEyes)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(120)).await;
        let stats = monitor.stop().await.unwrap();
        assert_eq!(stats.total_alerts, 1);
        assert_eq!(
            monitor.latest().await.unwrap().level,
            AlertLevel::Warning
        );
    }

    #[tokio::test]
    async fn restart_resets_session() {
        let mut settings = EngineSettings::default();
        settings.thresholds.sustain_seconds = 0.0;
        let monitor = Monitor::new(fast_config(false), settings);
        monitor.start(Box::new(ClosedEyes)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        monitor.stop().await;

        monitor
            .start(Box::new(SimulatedSource::new(Some(1)).with_face_loss(1.0)))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        let stats = monitor.stop().await.unwrap();
        assert_eq!(stats.total_alerts, 0);
        assert!(stats.missed_frames > 0);
    }

    #[tokio::test]
    async fn rejected_start_does_not_build_a_source() {
        let monitor = Monitor::new(fast_config(false), EngineSettings::default());
        monitor
            .start(Box::new(SimulatedSource::new(Some(2))))
            .await
            .unwrap();

        let mut built = false;
        let err = monitor
            .start_with(|| {
                built = true;
                Box::new(ClosedEyes)
            })
            .await
            .unwrap_err();
        assert_eq!(err, EngineError::AlreadyRunning);
        assert!(!built);
        monitor.stop().await;
    }

    #[tokio::test]
    async fn stop_then_start_keeps_new_auto_calibration() {
        let source = SimulatedSource::new(Some(4)).with_ranges((0.30, 0.34), (0.30, 0.32));
        let monitor = Monitor::new(fast_config(true), EngineSettings::default());
        monitor.start(Box::new(ClosedEyes)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        monitor.stop().await;

        let mut rx = monitor.subscribe();
        monitor.start(Box::new(source)).await.unwrap();
        let mut opened = false;
        let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
        while !opened && tokio::time::Instant::now() < deadline {
            if let Ok(Ok(MonitorEvent::CalibrationStarted { .. })) =
                tokio::time::timeout(Duration::from_millis(100), rx.recv()).await
            {
                opened = true;
            }
        }
        monitor.stop().await;
        assert!(opened);
    }

    #[tokio::test]
    async fn invalid_settings_update_keeps_previous() {
        let monitor = Monitor::new(fast_config(false), EngineSettings::default());
        let err = monitor
            .update_settings(&SettingsPatch {
                ear_threshold: Some(0.0),
                volume: Some(10),
                ..SettingsPatch::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_CONFIGURATION");
        assert_eq!(monitor.settings().await, EngineSettings::default());

        let next = monitor
            .update_settings(&SettingsPatch {
                sustain_seconds: Some(3.0),
                ..SettingsPatch::default()
            })
            .await
            .unwrap();
        assert_eq!(next.thresholds.sustain_seconds, 3.0);
        assert_eq!(monitor.reset_settings().await, EngineSettings::default());
    }

    #[tokio::test]
    async fn auto_calibration_replaces_thresholds() {
        let source = SimulatedSource::new(Some(5)).with_ranges((0.30, 0.34), (0.30, 0.32));
        let monitor = Monitor::new(fast_config(true), EngineSettings::default());
        let mut rx = monitor.subscribe();
        monitor.start(Box::new(source)).await.unwrap();

        let mut completed = None;
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while completed.is_none() && tokio::time::Instant::now() < deadline {
            if let Ok(Ok(event)) =
                tokio::time::timeout(Duration::from_millis(200), rx.recv()).await
            {
                match event {
                    MonitorEvent::CalibrationCompleted(result) => completed = Some(result),
                    MonitorEvent::CalibrationFailed { .. } => {
                        // 调度抖动导致样本不足时重试
                        monitor.request_calibration(None).await.unwrap();
                    }
                    _ => {}
                }
            }
        }
        monitor.stop().await;

        let result = completed.expect("calibration should complete");
        let settings = monitor.settings().await;
        assert_eq!(settings.thresholds.ear_threshold, result.thresholds.ear_threshold);
        assert_eq!(settings.thresholds.sustain_seconds, 2.0);
        assert!(settings.thresholds.ear_threshold < 0.34);
    }

    #[tokio::test]
    async fn calibrate_from_samples_applies_result() {
        let monitor = Monitor::new(fast_config(false), EngineSettings::default());
        let samples: Vec<RatioSample> = (0..20)
            .map(|i| {
                let ear = if i % 2 == 0 { 0.30 } else { 0.34 };
                RatioSample::new(ear, 0.30, i as f64 * 0.01)
            })
            .collect();
        let result = monitor.calibrate_from(&samples, 0.2).await.unwrap();
        assert_eq!(result.baseline.samples, 20);
        assert!((result.thresholds.ear_threshold - 0.28).abs() < 1e-9);
        assert_eq!(
            monitor.settings().await.thresholds.ear_threshold,
            result.thresholds.ear_threshold
        );
    }
}
