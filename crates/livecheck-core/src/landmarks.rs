//! Facial landmarks and the extraction capability the evaluator consumes.
//!
//! The evaluator never talks to a detector directly. Anything that can turn a
//! [`Frame`] into an optional [`FaceLandmarks`] implements
//! [`FaceLandmarkExtractor`]; the backend tag ([`ExtractorKind`]) only says
//! whether head pose comes from the landmarks or from the model itself.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::frame::Frame;
use crate::geometry::{self, centroid, Point2, EPSILON};

/// Number of points in the iBUG 68-point annotation layout.
pub const IBUG68_POINTS: usize = 68;

/// Index ranges in the iBUG 68-point layout.
mod ibug68 {
    pub const JAW_FIRST: usize = 0;
    pub const CHIN: usize = 8;
    pub const JAW_LAST: usize = 16;
    pub const NOSE_TIP: usize = 30;
    /// Eye on the image-left side (the subject's right eye), 36..=41.
    pub const IMAGE_LEFT_EYE: usize = 36;
    /// Eye on the image-right side (the subject's left eye), 42..=47.
    pub const IMAGE_RIGHT_EYE: usize = 42;
}

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("landmark inference failed: {0}")]
    Inference(String),
    #[error("unsupported frame: {0}")]
    UnsupportedFrame(String),
}

/// Which backend produced the landmarks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractorKind {
    /// Plain 2D landmarks; head pose is estimated from nose/jaw geometry.
    HeuristicLandmarks,
    /// A model that also regresses head pose; its [`HeadPose`] is used as-is.
    ModelBased,
}

/// Head orientation in degrees.
///
/// Positive yaw means the nose sits right of the jaw midpoint in image
/// coordinates; positive pitch means the nose sits below its neutral height.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct HeadPose {
    pub yaw: f32,
    pub pitch: f32,
}

impl HeadPose {
    pub const fn new(yaw: f32, pitch: f32) -> Self {
        Self { yaw, pitch }
    }
}

/// The subset of facial landmarks liveness evaluation needs.
///
/// "Left" and "right" are image-space sides, not the subject's.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceLandmarks {
    /// Six-point eye contour, ordered as described in [`geometry::eye_aspect_ratio`].
    pub left_eye: [Point2; 6],
    pub right_eye: [Point2; 6],
    pub nose_tip: Point2,
    /// Outermost jaw point on the image-left side.
    pub jaw_left: Point2,
    /// Outermost jaw point on the image-right side.
    pub jaw_right: Point2,
    pub chin: Point2,
    /// Head pose regressed by the extractor, if it provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pose: Option<HeadPose>,
}

impl FaceLandmarks {
    /// Build from a 68-point iBUG layout. Returns `None` if `points` is shorter
    /// than [`IBUG68_POINTS`].
    pub fn from_ibug68(points: &[Point2]) -> Option<Self> {
        if points.len() < IBUG68_POINTS {
            return None;
        }
        let eye_at = |start: usize| -> [Point2; 6] {
            [
                points[start],
                points[start + 1],
                points[start + 2],
                points[start + 3],
                points[start + 4],
                points[start + 5],
            ]
        };
        Some(Self {
            left_eye: eye_at(ibug68::IMAGE_LEFT_EYE),
            right_eye: eye_at(ibug68::IMAGE_RIGHT_EYE),
            nose_tip: points[ibug68::NOSE_TIP],
            jaw_left: points[ibug68::JAW_FIRST],
            jaw_right: points[ibug68::JAW_LAST],
            chin: points[ibug68::CHIN],
            pose: None,
        })
    }

    /// Attach a model-regressed pose.
    pub fn with_pose(mut self, pose: HeadPose) -> Self {
        self.pose = Some(pose);
        self
    }

    /// Average of the left and right eye aspect ratios.
    ///
    /// If one eye is degenerate the other is used alone; `None` if both are.
    pub fn eye_aspect_ratio(&self) -> Option<f32> {
        match (
            geometry::eye_aspect_ratio(&self.left_eye),
            geometry::eye_aspect_ratio(&self.right_eye),
        ) {
            (Some(l), Some(r)) => Some((l + r) / 2.0),
            (Some(one), None) | (None, Some(one)) => Some(one),
            (None, None) => None,
        }
    }

    /// Pose to feed the evaluator: the model's if present, otherwise the
    /// geometric estimate.
    pub fn head_pose(&self) -> HeadPose {
        self.pose.unwrap_or_else(|| self.estimate_pose())
    }

    /// Relative head pose from landmark geometry alone.
    ///
    /// Yaw is the nose's horizontal offset from the jaw midpoint, normalised by
    /// half the jaw width. Pitch is the nose's vertical position between the
    /// eye line and the chin, normalised so the halfway point reads as zero.
    /// Both ratios are mapped through `asin` to degrees. This is a relative
    /// signal: absolute values drift with face shape, ranges do not.
    pub fn estimate_pose(&self) -> HeadPose {
        let jaw_mid = self.jaw_left.midpoint(&self.jaw_right);
        let half_width = self.jaw_left.distance(&self.jaw_right) / 2.0;
        let yaw = if half_width < EPSILON {
            0.0
        } else {
            geometry::ratio_to_degrees((self.nose_tip.x - jaw_mid.x) / half_width)
        };

        let eye_line = match (centroid(&self.left_eye), centroid(&self.right_eye)) {
            (Some(l), Some(r)) => l.midpoint(&r),
            _ => return HeadPose::new(yaw, 0.0),
        };
        let face_height = self.chin.y - eye_line.y;
        let pitch = if face_height.abs() < EPSILON {
            0.0
        } else {
            let ratio = (self.nose_tip.y - eye_line.y) / face_height;
            geometry::ratio_to_degrees(2.0 * ratio - 1.0)
        };

        HeadPose::new(yaw, pitch)
    }
}

/// Capability: find at most one face in a frame.
///
/// Implementations may keep internal state (model sessions, scratch buffers),
/// hence `&mut self`. Returning `Ok(None)` means no face; callers treat `Err`
/// the same way for a single frame.
pub trait FaceLandmarkExtractor {
    fn kind(&self) -> ExtractorKind;

    fn extract(&mut self, frame: &Frame) -> Result<Option<FaceLandmarks>, DetectorError>;
}

impl<T: FaceLandmarkExtractor + ?Sized> FaceLandmarkExtractor for Box<T> {
    fn kind(&self) -> ExtractorKind {
        (**self).kind()
    }

    fn extract(&mut self, frame: &Frame) -> Result<Option<FaceLandmarks>, DetectorError> {
        (**self).extract(frame)
    }
}
