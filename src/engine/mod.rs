//! 疲劳检测核心
//!
//! 几何、分类、统计、校准均为同步纯逻辑，时间由调用方传入；
//! 只有 [`monitor`] 接触时钟与 tokio 运行时。

pub mod alert;
pub mod calibration;
pub mod classifier;
pub mod error;
pub mod geometry;
pub mod monitor;
pub mod pipeline;
pub mod source;
pub mod stats;
pub mod types;

pub use alert::{AlertCue, AlertPreferences, DrowsinessIndicator};
pub use calibration::{CalibrationResult, Calibrator};
pub use classifier::{Classification, ClassifierState, TemporalClassifier};
pub use error::EngineError;
pub use geometry::{compute_ear, compute_face_ratios, compute_mar};
pub use monitor::{Monitor, MonitorConfig, MonitorEvent, SettingsPatch};
pub use pipeline::{EngineSettings, Pipeline, TickReport};
pub use source::{FrameSlot, LandmarkSource, SimulatedSource, SlotSource};
pub use stats::{SessionRating, SessionStats, StatisticsAggregator};
pub use types::{AlertLevel, FaceLandmarks, Point, RatioSample, Thresholds};
