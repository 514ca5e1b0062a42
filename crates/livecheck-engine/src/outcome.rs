use chrono::{DateTime, Utc};
use livecheck_core::LivenessState;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::capture::CapturedImage;

/// Result of a successful run. Immutable once built.
#[derive(Debug, Clone)]
pub struct VerificationOutcome {
    pub run_id: Uuid,
    pub image: CapturedImage,
    pub liveness: LivenessState,
    pub completed_at: DateTime<Utc>,
}

impl VerificationOutcome {
    /// Wire shape expected by the submission endpoint.
    pub fn submission_payload(&self) -> SubmissionPayload {
        SubmissionPayload {
            face_image_data: self.image.to_data_url(),
            liveness_data: LivenessData {
                blink_detected: self.liveness.blink_detected,
                head_movement: self.liveness.head_movement,
                timestamp: self.completed_at.timestamp_millis(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionPayload {
    pub face_image_data: String,
    pub liveness_data: LivenessData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LivenessData {
    pub blink_detected: bool,
    pub head_movement: bool,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use livecheck_core::LivenessConfig;

    fn outcome() -> VerificationOutcome {
        let mut liveness = LivenessState::new(&LivenessConfig::default());
        liveness.blink_detected = true;
        liveness.head_movement = false;
        let completed_at = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        VerificationOutcome {
            run_id: Uuid::nil(),
            image: CapturedImage {
                jpeg: vec![0xFF, 0xD8, 0xFF],
                width: 1,
                height: 1,
                captured_at: completed_at,
            },
            liveness,
            completed_at,
        }
    }

    #[test]
    fn test_payload_wire_shape() {
        let value = serde_json::to_value(outcome().submission_payload()).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "faceImageData": "data:image/jpeg;base64,/9j/",
                "livenessData": {
                    "blinkDetected": true,
                    "headMovement": false,
                    "timestamp": 1_700_000_000_123i64,
                }
            })
        );
    }

    #[test]
    fn test_payload_parses_back() {
        let payload = outcome().submission_payload();
        let json = serde_json::to_string(&payload).unwrap();
        let parsed: SubmissionPayload = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, payload);
    }
}
