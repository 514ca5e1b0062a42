use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::landmarks::FaceLandmarks;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("camera permission denied")]
    PermissionDenied,
    #[error("no camera found")]
    NotFound,
    #[error("camera is in use by another application")]
    Busy,
    #[error("frame source is not running")]
    NotRunning,
    #[error("capture failed: {0}")]
    Device(String),
}

/// One captured video frame, packed RGB8, row-major.
#[derive(Debug, Clone)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Monotonic per-source frame counter.
    pub sequence: u64,
    pub captured_at: DateTime<Utc>,
}

impl Frame {
    /// Expected byte length of `data` for the frame's dimensions.
    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }
}

/// A camera-like producer of frames.
///
/// Only the orchestrator starts and stops a source. `stop` must be
/// idempotent: stopping a stopped source is a no-op.
pub trait FrameSource {
    /// Acquire the device. Permission, presence and busy errors surface here.
    fn start(&mut self) -> Result<(), CaptureError>;

    /// Grab the current frame.
    fn capture_frame(&mut self) -> Result<Frame, CaptureError>;

    /// Release the device.
    fn stop(&mut self);
}

impl<T: FrameSource + ?Sized> FrameSource for Box<T> {
    fn start(&mut self) -> Result<(), CaptureError> {
        (**self).start()
    }

    fn capture_frame(&mut self) -> Result<Frame, CaptureError> {
        (**self).capture_frame()
    }

    fn stop(&mut self) {
        (**self).stop()
    }
}

/// One analysed frame: when it was taken and the face found in it, if any.
///
/// Ephemeral; folded into [`crate::LivenessState`] and dropped.
#[derive(Debug, Clone)]
pub struct FrameSample {
    pub timestamp: DateTime<Utc>,
    pub face: Option<FaceLandmarks>,
}

impl FrameSample {
    pub fn new(timestamp: DateTime<Utc>, face: Option<FaceLandmarks>) -> Self {
        Self { timestamp, face }
    }

    /// A sample with no face in it.
    pub fn empty(timestamp: DateTime<Utc>) -> Self {
        Self::new(timestamp, None)
    }
}
