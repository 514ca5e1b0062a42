//! livecheck-core — liveness evaluation for a webcam identity check.
//!
//! Defines the frame and landmark capabilities the evaluator consumes and the
//! evaluator itself. No I/O, no async: the orchestrator in `livecheck-engine`
//! drives this crate one frame at a time.

pub mod frame;
pub mod geometry;
pub mod history;
pub mod landmarks;
pub mod liveness;

pub use frame::{CaptureError, Frame, FrameSample, FrameSource};
pub use geometry::Point2;
pub use history::BoundedHistory;
pub use landmarks::{DetectorError, ExtractorKind, FaceLandmarkExtractor, FaceLandmarks, HeadPose};
pub use liveness::{
    evaluate, EyeAspectRatioHistory, HeadPositionHistory, HeadTurnMode, LivenessConfig,
    LivenessEvaluator, LivenessState,
};
