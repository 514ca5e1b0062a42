//! Active liveness evaluation via blink and head-turn cues.
//!
//! Each analysed frame is folded into a [`LivenessState`] that tracks recent
//! eye aspect ratios and head poses. Two gestures are recognised:
//!
//! - **Blink:** the averaged eye aspect ratio (EAR) falls below a closed-eye
//!   threshold. Only the falling edge counts, so a long closure is one blink.
//! - **Head turn:** yaw goes past the angular threshold on both sides (or, in
//!   [`HeadTurnMode::Range`], yaw or pitch varies by more than the threshold
//!   across the recent history).
//!
//! A frame without a face changes nothing but `face_present`: one dropped
//! detection must not cost the user their progress.
//!
//! # Threat Coverage
//!
//! - **Blocks:** Printed photographs and static images held in front of the camera.
//! - **Does not block:** Video replay, masks, or anything else that can blink
//!   and turn. These are heuristics, not anti-spoofing.

use serde::Serialize;

use crate::frame::FrameSample;
use crate::history::{span_of, BoundedHistory};
use crate::landmarks::HeadPose;

/// Averaged EAR below which eyes count as closed. Open eyes sit around
/// 0.28–0.35 on typical webcams; a full closure drops well under 0.2.
pub const DEFAULT_EAR_THRESHOLD: f32 = 0.22;

/// Blinks needed before the blink gesture is satisfied.
pub const DEFAULT_REQUIRED_BLINKS: u32 = 2;

/// Yaw (or range) in degrees that counts as a deliberate head turn.
pub const DEFAULT_HEAD_TURN_DEGREES: f32 = 20.0;

/// Capacity of the eye aspect ratio history.
pub const DEFAULT_EAR_HISTORY: usize = 10;

/// Capacity of the head pose history.
pub const DEFAULT_HEAD_HISTORY: usize = 30;

pub type EyeAspectRatioHistory = BoundedHistory<f32>;
pub type HeadPositionHistory = BoundedHistory<HeadPose>;

/// What counts as a completed head turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HeadTurnMode {
    /// Yaw must pass `-threshold` and `+threshold`, at different times.
    #[default]
    BothDirections,
    /// `max - min` of yaw or pitch across the history must exceed the threshold.
    Range,
}

impl std::str::FromStr for HeadTurnMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "both" | "both_directions" => Ok(Self::BothDirections),
            "range" => Ok(Self::Range),
            other => Err(format!("unknown head turn mode '{other}' (expected 'both' or 'range')")),
        }
    }
}

/// Evaluator thresholds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LivenessConfig {
    pub ear_threshold: f32,
    pub required_blinks: u32,
    pub head_turn_degrees: f32,
    pub head_turn_mode: HeadTurnMode,
    pub ear_history: usize,
    pub head_history: usize,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            ear_threshold: DEFAULT_EAR_THRESHOLD,
            required_blinks: DEFAULT_REQUIRED_BLINKS,
            head_turn_degrees: DEFAULT_HEAD_TURN_DEGREES,
            head_turn_mode: HeadTurnMode::default(),
            ear_history: DEFAULT_EAR_HISTORY,
            head_history: DEFAULT_HEAD_HISTORY,
        }
    }
}

/// Rolling liveness state for one run.
///
/// `blink_detected`, `head_movement` and the two yaw flags only ever go from
/// false to true; [`LivenessEvaluator::reset`] is the only way back.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LivenessState {
    pub ear_history: EyeAspectRatioHistory,
    pub head_history: HeadPositionHistory,
    pub blink_count: u32,
    pub blink_detected: bool,
    pub head_movement: bool,
    pub face_present: bool,
    /// A yaw below `-head_turn_degrees` has been seen.
    pub yaw_left_seen: bool,
    /// A yaw above `+head_turn_degrees` has been seen.
    pub yaw_right_seen: bool,
    /// Frames folded in, with or without a face.
    pub frames_seen: u64,
}

impl LivenessState {
    pub fn new(config: &LivenessConfig) -> Self {
        Self {
            ear_history: BoundedHistory::new(config.ear_history),
            head_history: BoundedHistory::new(config.head_history),
            blink_count: 0,
            blink_detected: false,
            head_movement: false,
            face_present: false,
            yaw_left_seen: false,
            yaw_right_seen: false,
            frames_seen: 0,
        }
    }

    /// Both gestures completed.
    pub fn is_live(&self) -> bool {
        self.blink_detected && self.head_movement
    }

    pub fn yaw_range(&self) -> Option<f32> {
        span_of(self.head_history.iter().map(|p| p.yaw))
    }

    pub fn pitch_range(&self) -> Option<f32> {
        span_of(self.head_history.iter().map(|p| p.pitch))
    }
}

/// Fold one frame sample into `state`.
///
/// Pure: the result depends only on the arguments.
pub fn evaluate(config: &LivenessConfig, sample: &FrameSample, mut state: LivenessState) -> LivenessState {
    state.frames_seen += 1;

    let Some(face) = sample.face.as_ref() else {
        state.face_present = false;
        return state;
    };
    state.face_present = true;

    // Blink: edge-triggered on the transition into "closed".
    if let Some(ear) = face.eye_aspect_ratio() {
        let was_closed = state
            .ear_history
            .latest()
            .is_some_and(|prev| *prev < config.ear_threshold);
        state.ear_history.push(ear);

        if ear < config.ear_threshold && !was_closed {
            state.blink_count += 1;
            tracing::debug!(ear, blink_count = state.blink_count, "blink");
        }
        if !state.blink_detected && state.blink_count >= config.required_blinks {
            state.blink_detected = true;
            tracing::debug!(blink_count = state.blink_count, "blink gesture complete");
        }
    }

    // Head turn
    let pose = face.head_pose();
    state.head_history.push(pose);
    if pose.yaw < -config.head_turn_degrees {
        state.yaw_left_seen = true;
    }
    if pose.yaw > config.head_turn_degrees {
        state.yaw_right_seen = true;
    }

    if !state.head_movement {
        let turned = match config.head_turn_mode {
            HeadTurnMode::BothDirections => state.yaw_left_seen && state.yaw_right_seen,
            HeadTurnMode::Range => {
                let exceeds = |r: Option<f32>| r.is_some_and(|r| r > config.head_turn_degrees);
                exceeds(state.yaw_range()) || exceeds(state.pitch_range())
            }
        };
        if turned {
            state.head_movement = true;
            tracing::debug!(yaw = pose.yaw, pitch = pose.pitch, "head turn gesture complete");
        }
    }

    state
}

/// Owns the configuration and the running state for one orchestration run.
#[derive(Debug, Clone)]
pub struct LivenessEvaluator {
    config: LivenessConfig,
    state: LivenessState,
}

impl LivenessEvaluator {
    pub fn new(config: LivenessConfig) -> Self {
        let state = LivenessState::new(&config);
        Self { config, state }
    }

    pub fn config(&self) -> &LivenessConfig {
        &self.config
    }

    pub fn state(&self) -> &LivenessState {
        &self.state
    }

    /// Fold `sample` into the running state and return the result.
    pub fn process(&mut self, sample: &FrameSample) -> &LivenessState {
        let previous = std::mem::replace(&mut self.state, LivenessState::new(&self.config));
        self.state = evaluate(&self.config, sample, previous);
        &self.state
    }

    /// Clear histories, counters and flags. Called between runs, never mid-run.
    pub fn reset(&mut self) {
        self.state = LivenessState::new(&self.config);
    }
}

impl Default for LivenessEvaluator {
    fn default() -> Self {
        Self::new(LivenessConfig::default())
    }
}
