//! 关键点来源
//!
//! 采样循环每个 tick 同步调用一次 `next_frame`，实现方不得阻塞。

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::engine::error::EngineError;
use crate::engine::types::{FaceLandmarks, Point};

pub trait LandmarkSource: Send {
    /// 取一帧；没有可用帧时返回 `NoFaceDetected`
    fn next_frame(&mut self) -> Result<FaceLandmarks, EngineError>;

    /// 停止监测时释放采集资源
    fn release(&mut self) {}
}

/// 单槽信箱：新帧覆盖旧帧，不积压
#[derive(Debug, Default)]
pub struct FrameSlot {
    latest: Mutex<Option<(FaceLandmarks, Instant)>>,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// 写入一帧，返回是否覆盖了未被消费的旧帧
    pub fn push(&self, frame: FaceLandmarks) -> bool {
        let mut slot = self.latest.lock().unwrap_or_else(|e| e.into_inner());
        slot.replace((frame, Instant::now())).is_some()
    }

    pub fn take(&self) -> Option<(FaceLandmarks, Instant)> {
        self.latest.lock().unwrap_or_else(|e| e.into_inner()).take()
    }

    pub fn clear(&self) {
        self.take();
    }
}

pub struct SlotSource {
    slot: Arc<FrameSlot>,
    max_age: Duration,
}

impl SlotSource {
    pub fn new(slot: Arc<FrameSlot>, max_age: Duration) -> Self {
        Self { slot, max_age }
    }
}

impl LandmarkSource for SlotSource {
    fn next_frame(&mut self) -> Result<FaceLandmarks, EngineError> {
        match self.slot.take() {
            Some((frame, received_at)) if received_at.elapsed() <= self.max_age => Ok(frame),
            Some(_) => {
                tracing::debug!("Dropping stale landmark frame");
                Err(EngineError::NoFaceDetected)
            }
            None => Err(EngineError::NoFaceDetected),
        }
    }

    fn release(&mut self) {
        self.slot.clear();
    }
}

const SIM_EYE_WIDTH: f64 = 0.06;
const SIM_MOUTH_WIDTH: f64 = 0.10;

/// 演示用随机来源：EAR ∈ [0.25, 0.35)，MAR ∈ [0.40, 0.70)，
/// 按给定比值生成真实的关键点几何
pub struct SimulatedSource {
    rng: StdRng,
    ear_range: (f64, f64),
    mar_range: (f64, f64),
    face_loss_probability: f64,
}

impl SimulatedSource {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            rng,
            ear_range: (0.25, 0.35),
            mar_range: (0.40, 0.70),
            face_loss_probability: 0.0,
        }
    }

    pub fn with_ranges(mut self, ear: (f64, f64), mar: (f64, f64)) -> Self {
        self.ear_range = ear;
        self.mar_range = mar;
        self
    }

    pub fn with_face_loss(mut self, probability: f64) -> Self {
        self.face_loss_probability = probability.clamp(0.0, 1.0);
        self
    }
}

impl LandmarkSource for SimulatedSource {
    fn next_frame(&mut self) -> Result<FaceLandmarks, EngineError> {
        if self.face_loss_probability > 0.0 && self.rng.gen_bool(self.face_loss_probability) {
            return Err(EngineError::NoFaceDetected);
        }
        let ear = sample_range(&mut self.rng, self.ear_range);
        let mar = sample_range(&mut self.rng, self.mar_range);
        Ok(synthetic_face(ear, mar))
    }
}

fn sample_range(rng: &mut StdRng, (low, high): (f64, f64)) -> f64 {
    if high > low {
        rng.gen_range(low..high)
    } else {
        low
    }
}

/// 生成 EAR / MAR 恰为给定值的一帧（归一化坐标）
pub fn synthetic_face(ear: f64, mar: f64) -> FaceLandmarks {
    FaceLandmarks {
        left_eye: synthetic_eye(ear, 0.30, 0.40),
        right_eye: synthetic_eye(ear, 0.64, 0.40),
        mouth: synthetic_mouth(mar, 0.45, 0.70),
    }
}

fn synthetic_eye(ear: f64, x0: f64, y0: f64) -> Vec<Point> {
    let w = SIM_EYE_WIDTH;
    let half_gap = ear * w / 2.0;
    vec![
        Point::new(x0, y0),
        Point::new(x0 + w / 3.0, y0 - half_gap),
        Point::new(x0 + 2.0 * w / 3.0, y0 - half_gap),
        Point::new(x0 + w, y0),
        Point::new(x0 + 2.0 * w / 3.0, y0 + half_gap),
        Point::new(x0 + w / 3.0, y0 + half_gap),
    ]
}

fn synthetic_mouth(mar: f64, x0: f64, y0: f64) -> Vec<Point> {
    let w = SIM_MOUTH_WIDTH;
    let half_gap = mar * w / 2.0;
    vec![
        Point::new(x0, y0),
        Point::new(x0 + w / 4.0, y0 - half_gap * 0.8),
        Point::new(x0 + w / 2.0, y0 - half_gap),
        Point::new(x0 + 3.0 * w / 4.0, y0 - half_gap * 0.8),
        Point::new(x0 + w, y0),
        Point::new(x0 + 3.0 * w / 4.0, y0 + half_gap * 0.8),
        Point::new(x0 + w / 2.0, y0 + half_gap),
        Point::new(x0 + w / 4.0, y0 + half_gap * 0.8),
    ]
}
