//! Analysis orchestrator
//!
//! Drives the judgment service with bounded retries and exponential
//! backoff, validates and normalizes the structured payload, and falls
//! back to a deterministic local analysis when the service cannot
//! produce a usable result. Analysis never fails: every path terminates
//! in an `AnalysisResult`.

use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use triage_common::db::models::{ActionItemKind, Badge, Channel, Sentiment};
use uuid::Uuid;

use super::identity_matcher::ContactCandidate;
use super::judgment::{JudgmentError, JudgmentService};
use super::rate_limiter::SlidingWindowLimiter;
use super::IngestMetadata;

const TOPIC_MAX_CHARS: usize = 30;
const SHORT_TOPIC_MAX_CHARS: usize = 20;
const LONG_TOPIC_MAX_CHARS: usize = 200;
const RECOMMENDATION_MAX_CHARS: usize = 100;
const FALLBACK_SUMMARY_MAX_CHARS: usize = 200;
const FALLBACK_SCORE: i64 = 50;

/// Normalized output of a single communication analysis
#[derive(Debug, Clone)]
pub struct AnalysisResult {
    pub customer: ContactCandidate,
    pub summary: String,
    pub sentiment: Sentiment,
    pub intent: Option<String>,
    pub insights: Vec<String>,
    pub key_stats: Value,
    pub topic: String,
    pub short_topic: String,
    pub long_topic: String,
    pub action_plan: Option<PlanSuggestion>,
    /// True when the deterministic fallback produced this result
    pub fallback: bool,
}

/// Suggested action plan attached to an analysis
#[derive(Debug, Clone)]
pub struct PlanSuggestion {
    pub badge: Badge,
    pub recommendation: String,
    pub what_to_do: Option<String>,
    pub why_strategy: Option<String>,
    pub action_items: Vec<SuggestedItem>,
}

#[derive(Debug, Clone)]
pub struct SuggestedItem {
    pub kind: ActionItemKind,
    pub description: String,
}

/// One judgment attempt, classified for the retry driver
enum AnalysisOutcome {
    Ok(AnalysisResult),
    Retryable(JudgmentError),
    Fatal(JudgmentError),
}

/// Retry and backoff policy, taken from `JudgmentConfig`
#[derive(Debug, Clone)]
pub struct AnalyzerPolicy {
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
}

pub struct Analyzer {
    client: Arc<dyn JudgmentService>,
    limiter: SlidingWindowLimiter,
    policy: AnalyzerPolicy,
}

impl Analyzer {
    pub fn new(
        client: Arc<dyn JudgmentService>,
        limiter: SlidingWindowLimiter,
        policy: AnalyzerPolicy,
    ) -> Self {
        Self {
            client,
            limiter,
            policy,
        }
    }

    /// Analyze one communication for an organization.
    ///
    /// The per-org limiter guards outbound judgment call volume. A denied
    /// admission skips the service entirely and uses the fallback, so the
    /// ingest pipeline stays available under load.
    pub async fn analyze(
        &self,
        org_id: Uuid,
        channel: Channel,
        content: &str,
        metadata: &IngestMetadata,
    ) -> AnalysisResult {
        let decision = self.limiter.check(&org_id.to_string());
        if !decision.allowed {
            tracing::warn!(
                org_id = %org_id,
                reset_at = %decision.reset_at,
                "Analysis call budget exhausted, using fallback analysis"
            );
            return fallback_analysis(channel, content);
        }

        let mut attempt = 0u32;
        loop {
            match self.attempt(channel, content, metadata).await {
                AnalysisOutcome::Ok(result) => return result,
                AnalysisOutcome::Fatal(err) => {
                    tracing::warn!(
                        org_id = %org_id,
                        error = %err,
                        "Judgment failed permanently, using fallback analysis"
                    );
                    return fallback_analysis(channel, content);
                }
                AnalysisOutcome::Retryable(err) => {
                    attempt += 1;
                    if attempt >= self.policy.max_attempts {
                        tracing::warn!(
                            org_id = %org_id,
                            attempts = attempt,
                            error = %err,
                            "Judgment retries exhausted, using fallback analysis"
                        );
                        return fallback_analysis(channel, content);
                    }
                    let delay =
                        Duration::from_millis(self.policy.backoff_base_ms * (1 << (attempt - 1)));
                    tracing::debug!(
                        org_id = %org_id,
                        attempt = attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Transient judgment failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn attempt(
        &self,
        channel: Channel,
        content: &str,
        metadata: &IngestMetadata,
    ) -> AnalysisOutcome {
        match self.client.judge(channel, content, metadata).await {
            Ok(payload) => match normalize_payload(payload) {
                Ok(result) => AnalysisOutcome::Ok(result),
                Err(err) => AnalysisOutcome::Fatal(err),
            },
            Err(err) if err.is_retryable() => AnalysisOutcome::Retryable(err),
            Err(err) => AnalysisOutcome::Fatal(err),
        }
    }
}

#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct WirePayload {
    customer: Option<WireCustomer>,
    summary: Option<String>,
    sentiment: Option<String>,
    intent: Option<String>,
    insights: Vec<String>,
    key_stats: Option<Value>,
    topic: Option<String>,
    short_topic: Option<String>,
    long_topic: Option<String>,
    risk_score: Option<i64>,
    opportunity_score: Option<i64>,
    action_plan: Option<WirePlan>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireCustomer {
    name: Option<String>,
    company_name: Option<String>,
    email: Option<String>,
    phone: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WirePlan {
    badge: Option<String>,
    recommendation: Option<String>,
    what_to_do: Option<String>,
    why_strategy: Option<String>,
    #[serde(default)]
    action_items: Vec<WireItem>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireItem {
    kind: Option<String>,
    description: Option<String>,
}

/// Validate required fields and normalize the payload into the typed
/// result. Failures here are schema violations: the service answered,
/// but not with the contract, so retrying the same prompt is pointless.
fn normalize_payload(payload: Value) -> Result<AnalysisResult, JudgmentError> {
    let wire: WirePayload = serde_json::from_value(payload)
        .map_err(|e| JudgmentError::SchemaViolation(e.to_string()))?;

    let customer = wire
        .customer
        .ok_or_else(|| JudgmentError::SchemaViolation("Missing customer".to_string()))?;
    let name = non_empty(customer.name)
        .ok_or_else(|| JudgmentError::SchemaViolation("Missing customer name".to_string()))?;
    let company_name = non_empty(customer.company_name).ok_or_else(|| {
        JudgmentError::SchemaViolation("Missing customer company name".to_string())
    })?;
    let summary = non_empty(wire.summary)
        .ok_or_else(|| JudgmentError::SchemaViolation("Missing summary".to_string()))?;
    let sentiment_raw = non_empty(wire.sentiment)
        .ok_or_else(|| JudgmentError::SchemaViolation("Missing sentiment".to_string()))?;
    let sentiment = Sentiment::parse(&sentiment_raw).ok_or_else(|| {
        JudgmentError::SchemaViolation(format!("Unknown sentiment: {}", sentiment_raw))
    })?;

    let topic = non_empty(wire.topic)
        .map(|t| truncate_chars(&t, TOPIC_MAX_CHARS))
        .unwrap_or_else(|| summarize_to(&summary, TOPIC_MAX_CHARS));
    let short_topic = non_empty(wire.short_topic)
        .map(|t| truncate_chars(&t, SHORT_TOPIC_MAX_CHARS))
        .unwrap_or_else(|| truncate_chars(&topic, SHORT_TOPIC_MAX_CHARS));
    let long_topic = non_empty(wire.long_topic)
        .map(|t| truncate_chars(&t, LONG_TOPIC_MAX_CHARS))
        .unwrap_or_else(|| truncate_chars(&summary, LONG_TOPIC_MAX_CHARS));

    let intent = non_empty(wire.intent);
    let action_plan = wire
        .action_plan
        .map(|plan| normalize_plan(plan, intent.as_deref(), &summary))
        .transpose()?;

    Ok(AnalysisResult {
        customer: ContactCandidate {
            name,
            company_name: Some(company_name),
            email: non_empty(customer.email),
            phone: non_empty(customer.phone),
            risk_score: wire.risk_score.map(clamp_score),
            opportunity_score: wire.opportunity_score.map(clamp_score),
        },
        summary,
        sentiment,
        intent,
        insights: wire.insights,
        key_stats: wire.key_stats.unwrap_or_else(|| Value::Object(Default::default())),
        topic,
        short_topic,
        long_topic,
        action_plan,
        fallback: false,
    })
}

fn normalize_plan(
    plan: WirePlan,
    intent: Option<&str>,
    summary: &str,
) -> Result<PlanSuggestion, JudgmentError> {
    let badge_raw = non_empty(plan.badge)
        .ok_or_else(|| JudgmentError::SchemaViolation("Action plan missing badge".to_string()))?;
    let badge = Badge::parse(&badge_raw)
        .ok_or_else(|| JudgmentError::SchemaViolation(format!("Unknown badge: {}", badge_raw)))?;

    // A plan without a recommendation gets one synthesized from the
    // richest text available rather than being rejected.
    let recommendation = non_empty(plan.recommendation)
        .map(|r| summarize_to(&r, RECOMMENDATION_MAX_CHARS))
        .or_else(|| {
            plan.what_to_do
                .as_deref()
                .filter(|s| !s.trim().is_empty())
                .map(|s| summarize_to(s, RECOMMENDATION_MAX_CHARS))
        })
        .or_else(|| intent.map(|s| summarize_to(s, RECOMMENDATION_MAX_CHARS)))
        .unwrap_or_else(|| summarize_to(summary, RECOMMENDATION_MAX_CHARS));

    let mut action_items = Vec::new();
    for item in plan.action_items {
        let description = match non_empty(item.description) {
            Some(d) => d,
            None => continue,
        };
        let kind = item
            .kind
            .as_deref()
            .and_then(ActionItemKind::parse)
            .unwrap_or(ActionItemKind::Task);
        action_items.push(SuggestedItem { kind, description });
    }

    Ok(PlanSuggestion {
        badge,
        recommendation,
        what_to_do: non_empty(plan.what_to_do),
        why_strategy: non_empty(plan.why_strategy),
        action_items,
    })
}

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}").unwrap()
});
static PHONE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\+?[0-9][0-9 ().\-]{8,}[0-9]").unwrap()
});
static NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:my name is|this is|i am|i'm)\s+([A-Z][a-z]+(?:\s+[A-Z][a-z]+)?)")
        .unwrap()
});

/// Deterministic local analysis used when the judgment service is
/// unavailable or returns garbage. Extracts what it can from the raw
/// content so ingestion still produces a customer and a follow-up.
fn fallback_analysis(channel: Channel, content: &str) -> AnalysisResult {
    let email = EMAIL_RE.find(content).map(|m| m.as_str().to_string());
    let phone = PHONE_RE
        .find(content)
        .map(|m| m.as_str().to_string())
        .filter(|p| p.chars().filter(char::is_ascii_digit).count() >= 10);

    let name = NAME_RE
        .captures(content)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .or_else(|| email.as_deref().map(name_from_email))
        .unwrap_or_else(|| "Unknown Contact".to_string());

    let summary = truncate_chars(content.trim(), FALLBACK_SUMMARY_MAX_CHARS);
    let topic = summarize_to(&summary, TOPIC_MAX_CHARS);

    AnalysisResult {
        customer: ContactCandidate {
            name,
            company_name: None,
            email,
            phone,
            risk_score: Some(FALLBACK_SCORE),
            opportunity_score: Some(FALLBACK_SCORE),
        },
        sentiment: Sentiment::Neutral,
        intent: None,
        insights: Vec::new(),
        key_stats: Value::Object(Default::default()),
        short_topic: truncate_chars(&topic, SHORT_TOPIC_MAX_CHARS),
        long_topic: truncate_chars(&summary, LONG_TOPIC_MAX_CHARS),
        topic,
        action_plan: Some(PlanSuggestion {
            badge: Badge::FollowUp,
            recommendation: format!("Follow up on {} from customer", channel.as_str()),
            what_to_do: None,
            why_strategy: None,
            action_items: vec![SuggestedItem {
                kind: ActionItemKind::Call,
                description: "Reach out to confirm the request and gather details".to_string(),
            }],
        }),
        summary,
        fallback: true,
    }
}

fn name_from_email(email: &str) -> String {
    let local = email.split('@').next().unwrap_or(email);
    let words: Vec<String> = local
        .split(['.', '_', '-', '+'])
        .filter(|w| !w.is_empty() && w.chars().any(|c| c.is_ascii_alphabetic()))
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect();
    if words.is_empty() {
        "Unknown Contact".to_string()
    } else {
        words.join(" ")
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn clamp_score(score: i64) -> i64 {
    score.clamp(0, 100)
}

/// Prefer the first full sentence when it fits the budget, otherwise
/// hard-truncate on a character boundary.
fn summarize_to(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    if let Some(idx) = trimmed.find(['.', '!', '?']) {
        let sentence = trimmed[..=idx].trim();
        if !sentence.is_empty() && sentence.chars().count() <= max_chars {
            return sentence.to_string();
        }
    }
    truncate_chars(trimmed, max_chars)
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    cut.trim_end().to_string()
}
