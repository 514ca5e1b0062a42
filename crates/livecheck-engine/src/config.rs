use std::time::Duration;

use livecheck_core::liveness::{
    DEFAULT_EAR_HISTORY, DEFAULT_EAR_THRESHOLD, DEFAULT_HEAD_HISTORY, DEFAULT_HEAD_TURN_DEGREES,
    DEFAULT_REQUIRED_BLINKS,
};
use livecheck_core::{HeadTurnMode, LivenessConfig};

use crate::orchestrator::{
    RunConfig, DEFAULT_BLINK_TIMEOUT, DEFAULT_HEAD_TURN_TIMEOUT, DEFAULT_JPEG_QUALITY,
    DEFAULT_POLL_INTERVAL, DEFAULT_PRESENCE_TIMEOUT, DEFAULT_SETTLE_DELAY, MIN_POLL_INTERVAL,
};

/// Default timeout for the submission POST.
pub const DEFAULT_SUBMIT_TIMEOUT: Duration = Duration::from_secs(15);

/// Verification configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Evaluator thresholds and history sizes.
    pub liveness: LivenessConfig,
    /// Step timeouts, poll cadence and capture quality.
    pub run: RunConfig,
    /// Endpoint that receives the outcome payload. `None` disables submission.
    pub submit_url: Option<String>,
    pub submit_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            liveness: LivenessConfig::default(),
            run: RunConfig::default(),
            submit_url: None,
            submit_timeout: DEFAULT_SUBMIT_TIMEOUT,
        }
    }
}

impl Config {
    /// Load configuration from `LIVECHECK_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let head_turn_mode = match std::env::var("LIVECHECK_HEAD_TURN_MODE") {
            Ok(v) => v.parse().unwrap_or_else(|e: String| {
                tracing::warn!(error = %e, "ignoring LIVECHECK_HEAD_TURN_MODE");
                HeadTurnMode::default()
            }),
            Err(_) => HeadTurnMode::default(),
        };

        Self {
            liveness: LivenessConfig {
                ear_threshold: env_f32("LIVECHECK_EAR_THRESHOLD", DEFAULT_EAR_THRESHOLD),
                required_blinks: env_u32("LIVECHECK_REQUIRED_BLINKS", DEFAULT_REQUIRED_BLINKS),
                head_turn_degrees: env_f32("LIVECHECK_HEAD_TURN_DEGREES", DEFAULT_HEAD_TURN_DEGREES),
                head_turn_mode,
                ear_history: env_usize("LIVECHECK_EAR_HISTORY", DEFAULT_EAR_HISTORY),
                head_history: env_usize("LIVECHECK_HEAD_HISTORY", DEFAULT_HEAD_HISTORY),
            },
            run: RunConfig {
                poll_interval: env_millis("LIVECHECK_POLL_INTERVAL_MS", DEFAULT_POLL_INTERVAL)
                    .max(MIN_POLL_INTERVAL),
                settle_delay: env_millis("LIVECHECK_SETTLE_MS", DEFAULT_SETTLE_DELAY),
                presence_timeout: env_secs("LIVECHECK_PRESENCE_TIMEOUT_SECS", DEFAULT_PRESENCE_TIMEOUT),
                blink_timeout: env_secs("LIVECHECK_BLINK_TIMEOUT_SECS", DEFAULT_BLINK_TIMEOUT),
                head_turn_timeout: env_secs("LIVECHECK_HEAD_TURN_TIMEOUT_SECS", DEFAULT_HEAD_TURN_TIMEOUT),
                jpeg_quality: env_u8("LIVECHECK_JPEG_QUALITY", DEFAULT_JPEG_QUALITY),
            },
            submit_url: std::env::var("LIVECHECK_SUBMIT_URL")
                .ok()
                .filter(|v| !v.trim().is_empty()),
            submit_timeout: env_secs("LIVECHECK_SUBMIT_TIMEOUT_SECS", DEFAULT_SUBMIT_TIMEOUT),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

fn env_f32(key: &str, default: f32) -> f32 {
    env_parse(key).unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    env_parse(key).unwrap_or(default)
}

fn env_u8(key: &str, default: u8) -> u8 {
    env_parse(key).unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    env_parse(key).unwrap_or(default)
}

fn env_millis(key: &str, default: Duration) -> Duration {
    env_parse(key).map(Duration::from_millis).unwrap_or(default)
}

fn env_secs(key: &str, default: Duration) -> Duration {
    env_parse(key).map(Duration::from_secs).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Each test owns its variable names so parallel tests never race.

    #[test]
    fn test_unset_falls_back() {
        assert_eq!(env_f32("LIVECHECK_TEST_UNSET_F32", 0.5), 0.5);
        assert_eq!(
            env_secs("LIVECHECK_TEST_UNSET_SECS", Duration::from_secs(3)),
            Duration::from_secs(3)
        );
    }

    #[test]
    fn test_parses_set_values() {
        std::env::set_var("LIVECHECK_TEST_PARSE_MS", " 250 ");
        std::env::set_var("LIVECHECK_TEST_PARSE_U32", "3");
        assert_eq!(
            env_millis("LIVECHECK_TEST_PARSE_MS", Duration::ZERO),
            Duration::from_millis(250)
        );
        assert_eq!(env_u32("LIVECHECK_TEST_PARSE_U32", 2), 3);
    }

    #[test]
    fn test_garbage_falls_back() {
        std::env::set_var("LIVECHECK_TEST_GARBAGE", "lots");
        assert_eq!(env_usize("LIVECHECK_TEST_GARBAGE", 10), 10);
        assert_eq!(env_u8("LIVECHECK_TEST_GARBAGE", 85), 85);
    }

    // The only test that calls `from_env`, so it alone sets these variables.
    #[test]
    fn test_from_env_mode_and_poll_floor() {
        std::env::set_var("LIVECHECK_HEAD_TURN_MODE", "range");
        std::env::set_var("LIVECHECK_POLL_INTERVAL_MS", "0");
        std::env::set_var("LIVECHECK_PRESENCE_TIMEOUT_SECS", u64::MAX.to_string());
        let config = Config::from_env();
        assert_eq!(config.liveness.head_turn_mode, HeadTurnMode::Range);
        assert_eq!(config.run.poll_interval, MIN_POLL_INTERVAL);
        assert_eq!(config.run.presence_timeout, Duration::from_secs(u64::MAX));

        std::env::set_var("LIVECHECK_HEAD_TURN_MODE", "sideways");
        assert_eq!(Config::from_env().liveness.head_turn_mode, HeadTurnMode::BothDirections);

        for key in [
            "LIVECHECK_HEAD_TURN_MODE",
            "LIVECHECK_POLL_INTERVAL_MS",
            "LIVECHECK_PRESENCE_TIMEOUT_SECS",
        ] {
            std::env::remove_var(key);
        }
    }

    #[test]
    fn test_default_matches_constants() {
        let config = Config::default();
        assert_eq!(config.liveness.required_blinks, DEFAULT_REQUIRED_BLINKS);
        assert_eq!(config.run.blink_timeout, DEFAULT_BLINK_TIMEOUT);
        assert!(config.submit_url.is_none());
    }
}
