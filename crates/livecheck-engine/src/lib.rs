//! livecheck-engine — runs a liveness check end to end.
//!
//! Starts the frame source, walks the presence / blink / head-turn steps with
//! per-step timeouts, captures the final frame and packages the outcome for
//! submission.

pub mod cancel;
pub mod capture;
pub mod config;
pub mod orchestrator;
pub mod outcome;
pub mod submit;

pub use cancel::CancelHandle;
pub use capture::{CapturedImage, EncodeError};
pub use config::Config;
pub use orchestrator::{FailureReason, Orchestrator, RunConfig, RunError, RunPhase};
pub use outcome::{LivenessData, SubmissionPayload, VerificationOutcome};
pub use submit::{submit_blocking, HttpSubmitter, OutcomeSubmitter, SubmitError};
