//! Triage pipeline services

pub mod action_plans;
pub mod analyzer;
pub mod identity_matcher;
pub mod judgment;
pub mod rate_limiter;
pub mod reconciler;

use serde::Deserialize;

/// Caller-supplied metadata accompanying an ingested communication
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IngestMetadata {
    pub subject: Option<String>,
    pub date: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(rename = "duration")]
    pub duration_seconds: Option<i64>,
    pub message_count: Option<i64>,
}
