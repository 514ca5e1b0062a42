use base64::Engine as _;
use chrono::{DateTime, Utc};
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use livecheck_core::{CaptureError, Frame, FrameSource};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("frame buffer is {actual} bytes, expected {expected} for {width}x{height} RGB8")]
    BufferSize {
        actual: usize,
        expected: usize,
        width: u32,
        height: u32,
    },
    #[error("jpeg encoding failed: {0}")]
    Jpeg(#[from] image::ImageError),
}

/// The final frame of a run, JPEG-encoded.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedImage {
    pub jpeg: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub captured_at: DateTime<Utc>,
}

impl CapturedImage {
    pub fn encode(frame: &Frame, quality: u8) -> Result<Self, EncodeError> {
        let expected = frame.expected_len();
        let rgb = RgbImage::from_raw(frame.width, frame.height, frame.data.clone()).ok_or(
            EncodeError::BufferSize {
                actual: frame.data.len(),
                expected,
                width: frame.width,
                height: frame.height,
            },
        )?;

        let mut jpeg = Vec::new();
        JpegEncoder::new_with_quality(&mut jpeg, quality.clamp(1, 100)).encode_image(&rgb)?;

        Ok(Self {
            jpeg,
            width: frame.width,
            height: frame.height,
            captured_at: frame.captured_at,
        })
    }

    /// `data:image/jpeg;base64,...` as produced by a browser canvas export.
    pub fn to_data_url(&self) -> String {
        format!(
            "data:image/jpeg;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(&self.jpeg)
        )
    }
}

/// A started frame source that is stopped exactly once: explicitly via
/// [`ActiveCapture::stop`], or on drop if the run is torn down early.
pub(crate) struct ActiveCapture<'a, S: FrameSource> {
    source: &'a mut S,
    stopped: bool,
}

impl<'a, S: FrameSource> ActiveCapture<'a, S> {
    /// Wrap a source whose `start` already succeeded.
    pub(crate) fn new(source: &'a mut S) -> Self {
        Self {
            source,
            stopped: false,
        }
    }

    pub(crate) fn capture_frame(&mut self) -> Result<Frame, CaptureError> {
        if self.stopped {
            return Err(CaptureError::NotRunning);
        }
        self.source.capture_frame()
    }

    pub(crate) fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        self.source.stop();
        tracing::debug!("frame source stopped");
    }
}

impl<S: FrameSource> Drop for ActiveCapture<'_, S> {
    fn drop(&mut self) {
        self.stop();
    }
}
