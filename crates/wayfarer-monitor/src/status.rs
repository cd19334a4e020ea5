//! Backend status polling.

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

/// One poll response from the status collaborator. Every field is optional;
/// a missing field leaves the previously known value in place rather than
/// clobbering it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatusPoll {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub progress_percent: Option<f32>,
    #[serde(default)]
    pub current_step: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
}

/// Polling failures. Treated as transient: the monitor logs and retries on
/// the next tick, up to the attempt ceiling.
#[derive(Debug, Error)]
pub enum PollError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("could not decode status response: {0}")]
    Decode(String),
}

/// Source of task status snapshots.
#[async_trait]
pub trait StatusClient: Send + Sync {
    async fn fetch(&self, task_id: &str) -> Result<StatusPoll, PollError>;
}

/// Polls a status endpoint over HTTP: `GET {base_url}/{task_id}`.
pub struct HttpStatusClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpStatusClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    fn status_url(&self, task_id: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), task_id)
    }
}

#[async_trait]
impl StatusClient for HttpStatusClient {
    async fn fetch(&self, task_id: &str) -> Result<StatusPoll, PollError> {
        let response = self
            .client
            .get(self.status_url(task_id))
            .send()
            .await
            .map_err(|e| PollError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(PollError::Transport(format!(
                "{} from status endpoint",
                response.status()
            )));
        }

        response
            .json::<StatusPoll>()
            .await
            .map_err(|e| PollError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_deserialize_to_none() {
        let poll: StatusPoll = serde_yaml::from_str("progress_percent: 40.0").unwrap();
        assert!(poll.status.is_none());
        assert_eq!(poll.progress_percent, Some(40.0));
        assert!(poll.error_message.is_none());
    }

    #[test]
    fn test_status_url_normalizes_trailing_slash() {
        let client = HttpStatusClient::new("http://localhost:8000/api/v1/agent/status/");
        assert_eq!(
            client.status_url("t1"),
            "http://localhost:8000/api/v1/agent/status/t1"
        );
    }
}
