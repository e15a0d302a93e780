use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::metrics::{
    AgentMetrics, ConversationType, EmotionTraits, SentimentScores, ToneSeries,
};

#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("analysis request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("analysis endpoint returned status {0}")]
    Status(u16),
    #[error("analysis response did not decode: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("analysis response rejected: {0}")]
    Invalid(&'static str),
    #[error("analysis request cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeResponse {
    pub sentiment: SentimentScores,
    #[serde(default)]
    pub tone_analysis: ToneSeries,
    pub agent_metrics: AgentMetrics,
    pub transcript: Vec<String>,
    pub summary: String,
    pub conversation_type: Option<ConversationType>,
    #[serde(default)]
    pub emotion_traits: Option<EmotionTraits>,
    #[serde(default)]
    pub duration: Option<f64>,
}

impl AnalyzeResponse {
    // Shape checks beyond serde: mismatched tone arrays or non-finite scores
    // mean the payload cannot be trusted, so the caller falls back.
    pub fn validate(&self) -> Result<(), RemoteError> {
        if !self.tone_analysis.is_consistent() {
            return Err(RemoteError::Invalid("tone series is inconsistent"));
        }
        let sentiment = [
            self.sentiment.positive,
            self.sentiment.neutral,
            self.sentiment.negative,
        ];
        if sentiment.iter().any(|value| !value.is_finite()) {
            return Err(RemoteError::Invalid("sentiment score is not finite"));
        }
        let agent = [
            self.agent_metrics.response_time,
            self.agent_metrics.talking_ratio,
            self.agent_metrics.escalation_rate,
            self.agent_metrics.resolution_rate,
        ];
        if agent.iter().any(|value| !value.is_finite()) {
            return Err(RemoteError::Invalid("agent metric is not finite"));
        }
        if let Some(duration) = self.duration {
            if !duration.is_finite() || duration < 0.0 {
                return Err(RemoteError::Invalid("duration is not a valid length"));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct RemoteAnalyzer {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl RemoteAnalyzer {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, RemoteError> {
        let http = reqwest::Client::builder().build()?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self {
            http,
            base_url,
            timeout,
        })
    }

    pub fn endpoint(&self) -> String {
        format!("{}/analyze", self.base_url)
    }

    pub async fn analyze(
        &self,
        file_name: &str,
        mime: &str,
        bytes: Vec<u8>,
        cancel: &CancellationToken,
    ) -> Result<AnalyzeResponse, RemoteError> {
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str(mime)?;
        let form = reqwest::multipart::Form::new().part("file", part);
        let endpoint = self.endpoint();
        debug!(endpoint = %endpoint, file_name, "submitting clip for analysis");

        let request = self
            .http
            .post(&endpoint)
            .multipart(form)
            .timeout(self.timeout);
        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(RemoteError::Cancelled),
            sent = request.send() => sent?,
        };

        let status = response.status();
        if !status.is_success() {
            return Err(RemoteError::Status(status.as_u16()));
        }

        let body = tokio::select! {
            _ = cancel.cancelled() => return Err(RemoteError::Cancelled),
            read = response.bytes() => read?,
        };
        let decoded: AnalyzeResponse = serde_json::from_slice(&body)?;
        decoded.validate()?;
        Ok(decoded)
    }
}
