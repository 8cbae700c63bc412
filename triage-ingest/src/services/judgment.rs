//! External judgment service client
//!
//! The judgment service is an LLM endpoint (OpenAI-style chat completions)
//! that turns raw communication content into the structured analysis
//! contract. The client classifies every failure so the orchestrator's
//! retry driver can distinguish transient from permanent errors.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use thiserror::Error;
use triage_common::db::models::Channel;

use super::IngestMetadata;

/// Judgment service errors, split by retryability
#[derive(Debug, Error)]
pub enum JudgmentError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error {0}: {1}")]
    Api(u16, String),

    #[error("Rate limited by judgment service")]
    RateLimited,

    #[error("Invalid judgment service credentials")]
    BadCredentials,

    #[error("Unparsable response: {0}")]
    Parse(String),

    #[error("Schema violation: {0}")]
    SchemaViolation(String),
}

impl JudgmentError {
    /// Transient errors are retried with backoff; permanent ones route
    /// straight to the deterministic fallback.
    pub fn is_retryable(&self) -> bool {
        match self {
            JudgmentError::Network(_) | JudgmentError::RateLimited => true,
            JudgmentError::Api(status, _) => *status >= 500,
            JudgmentError::BadCredentials
            | JudgmentError::Parse(_)
            | JudgmentError::SchemaViolation(_) => false,
        }
    }
}

/// Boundary trait for the judgment service
///
/// Returns the raw structured payload; validation and normalization into
/// the typed analysis result happen in the orchestrator.
#[async_trait]
pub trait JudgmentService: Send + Sync {
    async fn judge(
        &self,
        channel: Channel,
        content: &str,
        metadata: &IngestMetadata,
    ) -> Result<Value, JudgmentError>;
}

/// Structured-output contract the service is instructed to produce
const SYSTEM_PROMPT: &str = "\
You analyze one inbound customer communication for a support triage product. \
Respond with a single JSON object and nothing else, with fields: \
customer {name, companyName, email?, phone?}, summary, \
sentiment (positive|neutral|negative), intent, insights (string array), \
keyStats (object), topic, shortTopic, longTopic, \
riskScore (0-100)?, opportunityScore (0-100)?, and optionally actionPlan \
{badge, recommendation, whatToDo, whyStrategy, actionItems [{kind, description}]}. \
Badge selection: 'at-risk' on churn or cancellation signals, 'opportunity' on \
upgrade or buying signals, 'lead' on new-contact interest, 'follow-up' on routine \
informational asks, 'no-action' on confirmed resolution. Always pick the badge \
from the content; never default silently to 'follow-up'. \
Action item kinds are email|call|task|text.";

/// HTTP-backed judgment client
pub struct HttpJudgmentClient {
    http_client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl HttpJudgmentClient {
    /// Build a client with a bounded per-attempt timeout so a hung call
    /// cannot stall the retry budget.
    pub fn new(
        endpoint: String,
        api_key: String,
        model: String,
        request_timeout: Duration,
    ) -> Result<Self, JudgmentError> {
        let http_client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| JudgmentError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            endpoint,
            api_key,
            model,
        })
    }
}

#[async_trait]
impl JudgmentService for HttpJudgmentClient {
    async fn judge(
        &self,
        channel: Channel,
        content: &str,
        metadata: &IngestMetadata,
    ) -> Result<Value, JudgmentError> {
        let mut user_message = format!("Channel: {}\n", channel.as_str());
        if let Some(subject) = &metadata.subject {
            user_message.push_str(&format!("Subject: {}\n", subject));
        }
        user_message.push_str("Content:\n");
        user_message.push_str(content);

        let body = json!({
            "model": self.model,
            "response_format": { "type": "json_object" },
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": user_message },
            ],
        });

        tracing::debug!(channel = channel.as_str(), "Querying judgment service");

        let response = self
            .http_client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| JudgmentError::Network(e.to_string()))?;

        let status = response.status();

        if status == 401 || status == 403 {
            return Err(JudgmentError::BadCredentials);
        }
        if status == 429 {
            return Err(JudgmentError::RateLimited);
        }
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(JudgmentError::Api(status.as_u16(), error_text));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| JudgmentError::Parse(e.to_string()))?;

        let text = payload["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| JudgmentError::Parse("Missing message content".to_string()))?;

        serde_json::from_str(strip_code_fence(text))
            .map_err(|e| JudgmentError::Parse(format!("Invalid JSON in response: {}", e)))
    }
}

/// Tolerate models that wrap the JSON object in a markdown code fence
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|s| s.strip_suffix("```"))
        .map(str::trim)
        .unwrap_or(trimmed)
}
