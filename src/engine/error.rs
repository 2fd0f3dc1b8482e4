use thiserror::Error;

use crate::engine::types::LandmarkPart;

/// 推理引擎错误。核心内没有致命错误：要么局部修正，要么作为结果返回给调用方，
/// 同时保留最后一次有效状态。
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("invalid landmark topology: part={part}, expected={expected}, actual={actual}")]
    InvalidLandmarkTopology {
        part: LandmarkPart,
        expected: usize,
        actual: usize,
    },
    #[error("degenerate geometry: part={part}")]
    DegenerateGeometry { part: LandmarkPart },
    #[error("no face detected")]
    NoFaceDetected,
    #[error("insufficient calibration samples: required={required}, actual={actual}")]
    InsufficientSamples { required: usize, actual: usize },
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("monitoring session already running")]
    AlreadyRunning,
}

impl EngineError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidLandmarkTopology { .. } => "INVALID_LANDMARK_TOPOLOGY",
            Self::DegenerateGeometry { .. } => "DEGENERATE_GEOMETRY",
            Self::NoFaceDetected => "NO_FACE_DETECTED",
            Self::InsufficientSamples { .. } => "INSUFFICIENT_SAMPLES",
            Self::InvalidConfiguration(_) => "INVALID_CONFIGURATION",
            Self::AlreadyRunning => "ALREADY_RUNNING",
        }
    }
}
