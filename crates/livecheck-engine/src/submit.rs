use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::outcome::SubmissionPayload;

#[derive(Error, Debug)]
pub enum SubmitError {
    #[error("failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("submission rejected with HTTP {0}")]
    Status(u16),
    #[error("submission request failed: {0}")]
    Transport(String),
}

/// Hands a finished outcome to whatever consumes it. Blocking.
pub trait OutcomeSubmitter {
    fn submit(&self, payload: &SubmissionPayload) -> Result<(), SubmitError>;
}

/// POSTs the payload as JSON.
pub struct HttpSubmitter {
    url: String,
    agent: ureq::Agent,
}

impl HttpSubmitter {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();
        Self {
            url: url.into(),
            agent,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl OutcomeSubmitter for HttpSubmitter {
    fn submit(&self, payload: &SubmissionPayload) -> Result<(), SubmitError> {
        let body = serde_json::to_string(payload)?;
        tracing::debug!(url = %self.url, bytes = body.len(), "submitting outcome");

        match self
            .agent
            .post(self.url.as_str())
            .header("Content-Type", "application/json")
            .send(body.as_bytes())
        {
            Ok(resp) => {
                tracing::info!(url = %self.url, status = resp.status().as_u16(), "outcome submitted");
                Ok(())
            }
            Err(ureq::Error::StatusCode(code)) => {
                tracing::warn!(url = %self.url, status = code, "submission rejected");
                Err(SubmitError::Status(code))
            }
            Err(e) => Err(SubmitError::Transport(e.to_string())),
        }
    }
}

/// Run a blocking submitter off the async runtime's worker threads.
pub async fn submit_blocking<T>(submitter: Arc<T>, payload: SubmissionPayload) -> Result<(), SubmitError>
where
    T: OutcomeSubmitter + Send + Sync + 'static,
{
    tokio::task::spawn_blocking(move || submitter.submit(&payload))
        .await
        .map_err(|e| SubmitError::Transport(format!("submission task failed: {e}")))?
}
