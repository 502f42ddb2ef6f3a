use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

use crate::session::TranscriptEntry;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationRequest {
    pub interview_id: String,
    pub user_id: String,
    pub transcript: Vec<TranscriptEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationResult {
    pub success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Scores a finished interview. How it scores is its own business.
#[async_trait::async_trait]
pub trait Evaluator: Send + Sync {
    async fn evaluate(&self, request: EvaluationRequest) -> Result<EvaluationResult>;
}

/// Posts the transcript to an HTTP feedback endpoint
pub struct HttpEvaluator {
    url: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpEvaluator {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: reqwest::Client::new(),
            timeout: Duration::from_secs(120),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait::async_trait]
impl Evaluator for HttpEvaluator {
    async fn evaluate(&self, request: EvaluationRequest) -> Result<EvaluationResult> {
        info!(
            "Requesting evaluation of interview {} ({} entries)",
            request.interview_id,
            request.transcript.len()
        );

        let response = self
            .client
            .post(&self.url)
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await
            .context("Failed to reach evaluation service")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Evaluation service error ({}): {}", status, body);
        }

        response
            .json::<EvaluationResult>()
            .await
            .context("Evaluation service returned an unexpected body")
    }
}
