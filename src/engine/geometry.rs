//! EAR / MAR 几何比值计算
//!
//! 纯函数，无副作用。
//! - EAR = (|p2-p6| + |p3-p5|) / (2 * |p1-p4|)
//! - MAR = |top-bottom| / |left-right|
//!
//! 分母接近 0 时钳位到 [`MIN_DENOMINATOR`]，并在诊断中标记 `DegenerateGeometry`。

use crate::engine::error::EngineError;
use crate::engine::types::{FaceLandmarks, LandmarkPart, Point, EYE_POINTS, MOUTH_POINTS};

pub const MIN_DENOMINATOR: f64 = 1e-6;

// 嘴部 8 点中用于张口度的四个点
const MOUTH_LEFT: usize = 0;
const MOUTH_TOP: usize = 2;
const MOUTH_RIGHT: usize = 4;
const MOUTH_BOTTOM: usize = 6;

/// 单个比值及其退化标记
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ratio {
    pub value: f64,
    pub degenerate: bool,
}

/// 一帧的几何结果
#[derive(Debug, Clone, PartialEq)]
pub struct FaceRatios {
    pub ear: Ratio,
    pub mar: Ratio,
    /// 退化几何诊断（不影响返回值的可用性）
    pub diagnostics: Vec<EngineError>,
}

/// 标准 6 点 EAR
///
/// 点顺序: 外眼角 p1, 上睑 p2, 上睑 p3, 内眼角 p4, 下睑 p5, 下睑 p6
pub fn compute_ear(eye: &[Point]) -> Result<Ratio, EngineError> {
    compute_ear_for(LandmarkPart::LeftEye, eye)
}

/// 8 点 MAR，取上下唇中点与左右嘴角
pub fn compute_mar(mouth: &[Point]) -> Result<Ratio, EngineError> {
    if mouth.len() != MOUTH_POINTS {
        return Err(EngineError::InvalidLandmarkTopology {
            part: LandmarkPart::Mouth,
            expected: MOUTH_POINTS,
            actual: mouth.len(),
        });
    }

    let vertical = mouth[MOUTH_TOP].distance(&mouth[MOUTH_BOTTOM]);
    let horizontal = mouth[MOUTH_LEFT].distance(&mouth[MOUTH_RIGHT]);
    Ok(clamped_ratio(vertical, horizontal))
}

/// 双眼取平均；`right_eye` 为空时仅用左眼
pub fn compute_face_ratios(face: &FaceLandmarks) -> Result<FaceRatios, EngineError> {
    let left = compute_ear_for(LandmarkPart::LeftEye, &face.left_eye)?;
    let right = if face.right_eye.is_empty() {
        None
    } else {
        Some(compute_ear_for(LandmarkPart::RightEye, &face.right_eye)?)
    };
    let mar = compute_mar(&face.mouth)?;

    let mut diagnostics = Vec::new();
    if left.degenerate {
        diagnostics.push(EngineError::DegenerateGeometry {
            part: LandmarkPart::LeftEye,
        });
    }
    if right.map(|r| r.degenerate).unwrap_or(false) {
        diagnostics.push(EngineError::DegenerateGeometry {
            part: LandmarkPart::RightEye,
        });
    }
    if mar.degenerate {
        diagnostics.push(EngineError::DegenerateGeometry {
            part: LandmarkPart::Mouth,
        });
    }

    let ear = match right {
        Some(r) => Ratio {
            value: (left.value + r.value) / 2.0,
            degenerate: left.degenerate || r.degenerate,
        },
        None => left,
    };

    Ok(FaceRatios {
        ear,
        mar,
        diagnostics,
    })
}

fn compute_ear_for(part: LandmarkPart, eye: &[Point]) -> Result<Ratio, EngineError> {
    if eye.len() != EYE_POINTS {
        return Err(EngineError::InvalidLandmarkTopology {
            part,
            expected: EYE_POINTS,
            actual: eye.len(),
        });
    }

    let vertical1 = eye[1].distance(&eye[5]);
    let vertical2 = eye[2].distance(&eye[4]);
    let horizontal = eye[0].distance(&eye[3]);
    Ok(clamped_ratio(vertical1 + vertical2, 2.0 * horizontal))
}

fn clamped_ratio(numerator: f64, denominator: f64) -> Ratio {
    let degenerate = !(denominator >= MIN_DENOMINATOR);
    let denominator = if degenerate { MIN_DENOMINATOR } else { denominator };
    Ratio {
        value: numerator / denominator,
        degenerate,
    }
}
