//! Recorded landmark traces.
//!
//! A trace is JSON lines, one record per poll tick, holding what a landmark
//! detector reported for that frame. Blank lines and lines starting with `#`
//! are ignored. A record may carry:
//!
//! - `landmarks`: 68 `[x, y]` pairs in iBUG order,
//! - `face`: an already-reduced landmark set,
//! - `pose`: `{ "yaw": .., "pitch": .. }` regressed by the detector,
//! - `error`: a detector failure message for that frame.
//!
//! A record with none of these is a frame without a face.
//!
//! Replay drives both capabilities: [`ReplaySource`] hands out frames whose
//! sequence number indexes the trace, [`ReplayExtractor`] answers with the
//! recorded landmarks for that index. Past the end of the trace no face is
//! reported.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use image::RgbImage;
use livecheck_core::{
    CaptureError, DetectorError, ExtractorKind, FaceLandmarkExtractor, FaceLandmarks, Frame,
    FrameSource, HeadPose, Point2,
};
use serde::Deserialize;

/// Frame size used when no still image is supplied.
const BLANK_WIDTH: u32 = 320;
const BLANK_HEIGHT: u32 = 240;
const BLANK_LEVEL: u8 = 96;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TraceRecord {
    #[serde(default)]
    pub landmarks: Option<Vec<[f32; 2]>>,
    #[serde(default)]
    pub face: Option<FaceLandmarks>,
    #[serde(default)]
    pub pose: Option<HeadPose>,
    #[serde(default)]
    pub error: Option<String>,
}

impl TraceRecord {
    /// What the detector reported for this frame.
    pub fn resolve(&self) -> Result<Option<FaceLandmarks>, DetectorError> {
        if let Some(message) = &self.error {
            return Err(DetectorError::Inference(message.clone()));
        }

        let face = match (&self.face, &self.landmarks) {
            (Some(face), _) => face.clone(),
            (None, Some(points)) => {
                let points: Vec<Point2> = points.iter().map(|[x, y]| Point2::new(*x, *y)).collect();
                FaceLandmarks::from_ibug68(&points).ok_or_else(|| {
                    DetectorError::Inference(format!(
                        "expected {} landmarks, got {}",
                        livecheck_core::landmarks::IBUG68_POINTS,
                        points.len()
                    ))
                })?
            }
            (None, None) => return Ok(None),
        };

        Ok(Some(match self.pose {
            Some(pose) => face.with_pose(pose),
            None => face,
        }))
    }
}

/// A loaded trace, cheap to clone.
#[derive(Debug, Clone)]
pub struct Trace {
    records: Arc<Vec<TraceRecord>>,
}

impl Trace {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read trace {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("invalid trace {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        let mut records = Vec::new();
        for (i, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let record: TraceRecord =
                serde_json::from_str(line).with_context(|| format!("line {}", i + 1))?;
            records.push(record);
        }
        Ok(Self {
            records: Arc::new(records),
        })
    }

    pub fn records(&self) -> &[TraceRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Model-based if any record carries a regressed pose.
    pub fn extractor_kind(&self) -> ExtractorKind {
        if self.records.iter().any(|r| r.pose.is_some()) {
            ExtractorKind::ModelBased
        } else {
            ExtractorKind::HeuristicLandmarks
        }
    }
}

/// Frame source that replays a trace, one frame per capture.
pub struct ReplaySource {
    trace: Trace,
    still: Option<RgbImage>,
    sequence: u64,
    running: bool,
}

impl ReplaySource {
    /// `still` is used as the pixel content of every frame; without it frames
    /// are a flat grey.
    pub fn new(trace: Trace, still: Option<RgbImage>) -> Self {
        Self {
            trace,
            still,
            sequence: 0,
            running: false,
        }
    }

    fn pixels(&self) -> (Vec<u8>, u32, u32) {
        match &self.still {
            Some(img) => (img.as_raw().clone(), img.width(), img.height()),
            None => (
                vec![BLANK_LEVEL; (BLANK_WIDTH * BLANK_HEIGHT * 3) as usize],
                BLANK_WIDTH,
                BLANK_HEIGHT,
            ),
        }
    }
}

impl FrameSource for ReplaySource {
    fn start(&mut self) -> Result<(), CaptureError> {
        if !self.running {
            self.running = true;
            tracing::info!(frames = self.trace.len(), "trace replay started");
        }
        Ok(())
    }

    fn capture_frame(&mut self) -> Result<Frame, CaptureError> {
        if !self.running {
            return Err(CaptureError::NotRunning);
        }
        let (data, width, height) = self.pixels();
        let frame = Frame {
            data,
            width,
            height,
            sequence: self.sequence,
            captured_at: Utc::now(),
        };
        self.sequence += 1;
        Ok(frame)
    }

    fn stop(&mut self) {
        if self.running {
            self.running = false;
            tracing::info!(frames_played = self.sequence, "trace replay stopped");
        }
    }
}

/// Answers with the recorded landmarks for each frame's sequence number.
pub struct ReplayExtractor {
    trace: Trace,
    kind: ExtractorKind,
}

impl ReplayExtractor {
    pub fn new(trace: Trace) -> Self {
        let kind = trace.extractor_kind();
        Self { trace, kind }
    }
}

impl FaceLandmarkExtractor for ReplayExtractor {
    fn kind(&self) -> ExtractorKind {
        self.kind
    }

    fn extract(&mut self, frame: &Frame) -> Result<Option<FaceLandmarks>, DetectorError> {
        match self.trace.records().get(frame.sequence as usize) {
            Some(record) => record.resolve(),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ibug_line(nose_x: f32) -> String {
        let mut points: Vec<[f32; 2]> = (0..68).map(|i| [i as f32, 10.0]).collect();
        points[0] = [0.0, 50.0];
        points[16] = [100.0, 50.0];
        points[30] = [nose_x, 70.0];
        serde_json::json!({ "landmarks": points }).to_string()
    }

    #[test]
    fn test_parse_skips_comments_and_blanks() {
        let text = format!("# recorded at 10 fps\n\n{{}}\n{}\n", ibug_line(50.0));
        let trace = Trace::parse(&text).unwrap();
        assert_eq!(trace.len(), 2);
        assert!(trace.records()[0].resolve().unwrap().is_none());
        assert!(trace.records()[1].resolve().unwrap().is_some());
        assert_eq!(trace.extractor_kind(), ExtractorKind::HeuristicLandmarks);
    }

    #[test]
    fn test_parse_reports_line_number() {
        let err = Trace::parse("{}\n{not json}\n").unwrap_err();
        assert!(format!("{err:#}").contains("line 2"));
    }

    #[test]
    fn test_unknown_fields_rejected() {
        assert!(Trace::parse(r#"{"landmark": []}"#).is_err());
    }

    #[test]
    fn test_resolve_short_landmarks_is_error() {
        let trace = Trace::parse(r#"{"landmarks": [[0, 0], [1, 1]]}"#).unwrap();
        let err = trace.records()[0].resolve().unwrap_err();
        assert!(err.to_string().contains("expected 68 landmarks, got 2"));
    }

    #[test]
    fn test_resolve_error_record() {
        let trace = Trace::parse(r#"{"error": "gpu lost"}"#).unwrap();
        assert!(matches!(
            trace.records()[0].resolve(),
            Err(DetectorError::Inference(m)) if m == "gpu lost"
        ));
    }

    #[test]
    fn test_pose_makes_trace_model_based() {
        let line = format!(
            "{}\n",
            ibug_line(50.0).replacen('{', r#"{"pose": {"yaw": -25.0, "pitch": 3.0}, "#, 1)
        );
        let trace = Trace::parse(&line).unwrap();
        assert_eq!(trace.extractor_kind(), ExtractorKind::ModelBased);
        let face = trace.records()[0].resolve().unwrap().unwrap();
        assert_eq!(face.head_pose(), HeadPose::new(-25.0, 3.0));
    }

    #[test]
    fn test_replay_source_lifecycle() {
        let trace = Trace::parse("{}\n").unwrap();
        let mut source = ReplaySource::new(trace, None);
        assert_eq!(source.capture_frame().unwrap_err(), CaptureError::NotRunning);

        source.start().unwrap();
        let f0 = source.capture_frame().unwrap();
        let f1 = source.capture_frame().unwrap();
        assert_eq!((f0.sequence, f1.sequence), (0, 1));
        assert_eq!(f0.data.len(), f0.expected_len());

        source.stop();
        source.stop();
        assert_eq!(source.capture_frame().unwrap_err(), CaptureError::NotRunning);
    }

    #[test]
    fn test_replay_source_uses_still() {
        let still = RgbImage::from_pixel(4, 2, image::Rgb([1, 2, 3]));
        let mut source = ReplaySource::new(Trace::parse("").unwrap(), Some(still));
        source.start().unwrap();
        let frame = source.capture_frame().unwrap();
        assert_eq!((frame.width, frame.height), (4, 2));
        assert_eq!(&frame.data[..3], &[1, 2, 3]);
    }

    #[test]
    fn test_extractor_past_end_reports_no_face() {
        let trace = Trace::parse(&ibug_line(75.0)).unwrap();
        let mut source = ReplaySource::new(trace.clone(), None);
        let mut extractor = ReplayExtractor::new(trace);
        source.start().unwrap();

        let first = source.capture_frame().unwrap();
        let face = extractor.extract(&first).unwrap().unwrap();
        // nose 25px right of a 100px jaw's midpoint
        assert!((face.head_pose().yaw - 30.0).abs() < 1e-3);

        let second = source.capture_frame().unwrap();
        assert!(extractor.extract(&second).unwrap().is_none());
    }

    #[test]
    fn test_demo_trace_is_live() {
        let trace = Trace::parse(include_str!("../../../demos/blink_and_turn.jsonl")).unwrap();
        assert_eq!(trace.extractor_kind(), ExtractorKind::HeuristicLandmarks);

        let mut evaluator = livecheck_core::LivenessEvaluator::default();
        for record in trace.records() {
            let face = record.resolve().unwrap();
            evaluator.process(&livecheck_core::FrameSample::new(Utc::now(), face));
        }
        let state = evaluator.state();
        assert_eq!(state.blink_count, 2);
        assert!(state.is_live());
    }
}
