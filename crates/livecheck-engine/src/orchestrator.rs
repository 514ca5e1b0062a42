//! Verification orchestrator: drives the evaluator through the instruction
//! sequence and produces a [`VerificationOutcome`] or a [`FailureReason`].
//!
//! ```text
//! Idle -> Presence -> Blinking -> HeadTurning -> Captured
//!            \____________\____________\______-> Failed(reason)
//! ```
//!
//! Each step polls the frame source at a fixed cadence until its predicate
//! holds on the running [`LivenessState`] or its deadline passes. Everything
//! happens on the calling task: capture, extraction, evaluation and the
//! decision are one synchronous step per tick.

use std::fmt;
use std::time::Duration;

use chrono::Utc;
use livecheck_core::{
    CaptureError, FaceLandmarkExtractor, FrameSample, FrameSource, LivenessConfig,
    LivenessEvaluator, LivenessState,
};
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::Instrument;
use uuid::Uuid;

use crate::cancel::{CancelHandle, CancelToken};
use crate::capture::{ActiveCapture, CapturedImage};
use crate::outcome::VerificationOutcome;

/// Interval between frame polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);
/// Pause after a face first appears, before asking for gestures.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_PRESENCE_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_BLINK_TIMEOUT: Duration = Duration::from_secs(8);
pub const DEFAULT_HEAD_TURN_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_JPEG_QUALITY: u8 = 85;
/// Poll intervals below this are raised to it.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);
/// Deadline used when a step timeout is too large to add to the clock.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Why a run ended without an outcome.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    #[error("camera permission denied")]
    PermissionDenied,
    #[error("no camera found")]
    CameraNotFound,
    #[error("camera is busy")]
    DeviceBusy,
    #[error("detection error: {0}")]
    DetectionError(String),
    #[error("face not detected")]
    FaceNotDetected,
    #[error("blink not detected")]
    BlinkNotDetected,
    #[error("head turn not detected")]
    HeadTurnNotDetected,
    #[error("capture failed: {0}")]
    CaptureFailed(String),
    #[error("verification cancelled")]
    Cancelled,
}

impl From<CaptureError> for FailureReason {
    fn from(err: CaptureError) -> Self {
        match err {
            CaptureError::PermissionDenied => Self::PermissionDenied,
            CaptureError::NotFound => Self::CameraNotFound,
            CaptureError::Busy => Self::DeviceBusy,
            other => Self::DetectionError(other.to_string()),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RunError {
    #[error("orchestrator is {0}; reset before starting another run")]
    NotIdle(RunPhase),
    #[error(transparent)]
    Failed(#[from] FailureReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    Presence,
    Blinking,
    HeadTurning,
    Captured,
    Failed(FailureReason),
}

impl RunPhase {
    /// Text shown to the user while in this phase.
    pub fn instruction(&self) -> &'static str {
        match self {
            RunPhase::Idle => "Press start when you are ready",
            RunPhase::Presence => "Position your face in the frame and look at the camera",
            RunPhase::Blinking => "Blink a few times",
            RunPhase::HeadTurning => "Slowly turn your head left, then right",
            RunPhase::Captured => "Liveness check complete",
            RunPhase::Failed(_) => "Liveness check failed",
        }
    }

    /// `Captured` and `Failed` end a run; only [`Orchestrator::reset`] leaves them.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunPhase::Captured | RunPhase::Failed(_))
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunPhase::Idle => f.write_str("idle"),
            RunPhase::Presence => f.write_str("presence"),
            RunPhase::Blinking => f.write_str("blinking"),
            RunPhase::HeadTurning => f.write_str("head-turning"),
            RunPhase::Captured => f.write_str("captured"),
            RunPhase::Failed(reason) => write!(f, "failed ({reason})"),
        }
    }
}

/// Timing of the step sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub poll_interval: Duration,
    pub settle_delay: Duration,
    pub presence_timeout: Duration,
    pub blink_timeout: Duration,
    pub head_turn_timeout: Duration,
    pub jpeg_quality: u8,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            settle_delay: DEFAULT_SETTLE_DELAY,
            presence_timeout: DEFAULT_PRESENCE_TIMEOUT,
            blink_timeout: DEFAULT_BLINK_TIMEOUT,
            head_turn_timeout: DEFAULT_HEAD_TURN_TIMEOUT,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Step {
    Presence,
    Blink,
    HeadTurn,
}

impl Step {
    const SEQUENCE: [Step; 3] = [Step::Presence, Step::Blink, Step::HeadTurn];

    fn name(self) -> &'static str {
        match self {
            Step::Presence => "presence",
            Step::Blink => "blink",
            Step::HeadTurn => "head_turn",
        }
    }

    fn phase(self) -> RunPhase {
        match self {
            Step::Presence => RunPhase::Presence,
            Step::Blink => RunPhase::Blinking,
            Step::HeadTurn => RunPhase::HeadTurning,
        }
    }

    fn timeout(self, config: &RunConfig) -> Duration {
        match self {
            Step::Presence => config.presence_timeout,
            Step::Blink => config.blink_timeout,
            Step::HeadTurn => config.head_turn_timeout,
        }
    }

    fn satisfied(self, state: &LivenessState) -> bool {
        match self {
            Step::Presence => state.face_present,
            Step::Blink => state.blink_detected,
            Step::HeadTurn => state.head_movement,
        }
    }

    fn timeout_reason(self) -> FailureReason {
        match self {
            Step::Presence => FailureReason::FaceNotDetected,
            Step::Blink => FailureReason::BlinkNotDetected,
            Step::HeadTurn => FailureReason::HeadTurnNotDetected,
        }
    }
}

/// Owns the frame source, the extractor and the evaluator for successive runs.
pub struct Orchestrator<S, E> {
    source: S,
    extractor: E,
    evaluator: LivenessEvaluator,
    config: RunConfig,
    cancel: CancelToken,
    phase: watch::Sender<RunPhase>,
}

impl<S: FrameSource, E: FaceLandmarkExtractor> Orchestrator<S, E> {
    pub fn new(source: S, extractor: E, liveness: LivenessConfig, config: RunConfig) -> Self {
        let (phase, _) = watch::channel(RunPhase::Idle);
        Self {
            source,
            extractor,
            evaluator: LivenessEvaluator::new(liveness),
            config,
            cancel: CancelToken::new(),
            phase,
        }
    }

    /// Handle that cancels the active run from another task.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.handle()
    }

    /// Receiver that observes every phase change.
    pub fn subscribe(&self) -> watch::Receiver<RunPhase> {
        self.phase.subscribe()
    }

    pub fn phase(&self) -> RunPhase {
        self.phase.borrow().clone()
    }

    pub fn state(&self) -> &LivenessState {
        self.evaluator.state()
    }

    /// Back to `Idle` with a cleared evaluator and a re-armed cancel token.
    pub fn reset(&mut self) {
        self.evaluator.reset();
        self.cancel.clear();
        self.set_phase(RunPhase::Idle);
        tracing::debug!("orchestrator reset");
    }

    /// Run the full step sequence once.
    ///
    /// The frame source is started at the beginning and stopped exactly once
    /// before this returns, whatever the outcome. If the returned future is
    /// dropped mid-run the source is stopped as well, and the orchestrator
    /// must be [`reset`](Self::reset) before the next run.
    pub async fn run(&mut self) -> Result<VerificationOutcome, RunError> {
        let phase = self.phase();
        if phase != RunPhase::Idle {
            return Err(RunError::NotIdle(phase));
        }

        self.evaluator.reset();
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("liveness_run", %run_id, extractor = ?self.extractor.kind());

        match self.drive(run_id).instrument(span).await {
            Ok(outcome) => {
                self.set_phase(RunPhase::Captured);
                tracing::info!(
                    %run_id,
                    blink_count = outcome.liveness.blink_count,
                    frames = outcome.liveness.frames_seen,
                    "liveness run captured"
                );
                Ok(outcome)
            }
            Err(reason) => {
                self.set_phase(RunPhase::Failed(reason.clone()));
                tracing::warn!(%run_id, %reason, "liveness run failed");
                Err(reason.into())
            }
        }
    }

    async fn drive(&mut self, run_id: Uuid) -> Result<VerificationOutcome, FailureReason> {
        self.source.start().map_err(|e| {
            tracing::error!(error = %e, "failed to start frame source");
            FailureReason::from(e)
        })?;
        tracing::info!("frame source started");

        let mut session = Session {
            capture: ActiveCapture::new(&mut self.source),
            extractor: &mut self.extractor,
            evaluator: &mut self.evaluator,
            cancel: &mut self.cancel,
            config: &self.config,
            phase: &self.phase,
        };
        let result = session.run_steps(run_id).await;
        session.capture.stop();
        result
    }

    fn set_phase(&self, phase: RunPhase) {
        self.phase.send_replace(phase);
    }
}

/// Borrowed view of the orchestrator for the duration of one run.
struct Session<'a, S: FrameSource, E> {
    capture: ActiveCapture<'a, S>,
    extractor: &'a mut E,
    evaluator: &'a mut LivenessEvaluator,
    cancel: &'a mut CancelToken,
    config: &'a RunConfig,
    phase: &'a watch::Sender<RunPhase>,
}

impl<S: FrameSource, E: FaceLandmarkExtractor> Session<'_, S, E> {
    async fn run_steps(&mut self, run_id: Uuid) -> Result<VerificationOutcome, FailureReason> {
        for step in Step::SEQUENCE {
            self.phase.send_replace(step.phase());
            self.wait_for(step).await?;
            if let Step::Presence = step {
                self.settle().await?;
            }
        }
        self.capture_outcome(run_id)
    }

    async fn wait_for(&mut self, step: Step) -> Result<(), FailureReason> {
        let timeout = step.timeout(self.config);
        let now = Instant::now();
        let deadline = now.checked_add(timeout).unwrap_or(now + FAR_FUTURE);
        let mut ticker = time::interval(self.config.poll_interval.max(MIN_POLL_INTERVAL));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(step = step.name(), ?timeout, "waiting for step");

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(FailureReason::Cancelled),
                _ = time::sleep_until(deadline) => {
                    tracing::warn!(step = step.name(), "step timed out");
                    return Err(step.timeout_reason());
                }
                _ = ticker.tick() => {}
            }

            let state = self.poll_frame()?;
            if step.satisfied(state) {
                tracing::info!(
                    step = step.name(),
                    frames = state.frames_seen,
                    blink_count = state.blink_count,
                    "step complete"
                );
                return Ok(());
            }
        }
    }

    async fn settle(&mut self) -> Result<(), FailureReason> {
        if self.config.settle_delay.is_zero() {
            return Ok(());
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(FailureReason::Cancelled),
            _ = time::sleep(self.config.settle_delay) => Ok(()),
        }
    }

    /// Capture, extract and fold one frame. Extraction errors count as "no face".
    fn poll_frame(&mut self) -> Result<&LivenessState, FailureReason> {
        let frame = self.capture.capture_frame().map_err(|e| {
            tracing::error!(error = %e, "frame capture failed");
            FailureReason::from(e)
        })?;

        let face = match self.extractor.extract(&frame) {
            Ok(face) => face,
            Err(e) => {
                tracing::debug!(
                    error = %e,
                    sequence = frame.sequence,
                    "landmark extraction failed; treating frame as empty"
                );
                None
            }
        };

        let sample = FrameSample::new(frame.captured_at, face);
        Ok(self.evaluator.process(&sample))
    }

    fn capture_outcome(&mut self, run_id: Uuid) -> Result<VerificationOutcome, FailureReason> {
        let frame = self
            .capture
            .capture_frame()
            .map_err(|e| FailureReason::CaptureFailed(e.to_string()))?;
        let image = CapturedImage::encode(&frame, self.config.jpeg_quality)
            .map_err(|e| FailureReason::CaptureFailed(e.to_string()))?;
        tracing::debug!(bytes = image.jpeg.len(), sequence = frame.sequence, "final frame encoded");

        Ok(VerificationOutcome {
            run_id,
            image,
            liveness: self.evaluator.state().clone(),
            completed_at: Utc::now(),
        })
    }
}
