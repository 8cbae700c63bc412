//! Persisted row models and their string-typed enums
//!
//! Enum variants carry their exact persisted/wire string form via
//! `as_str`/`parse`; the serde forms match so API projections and database
//! TEXT columns round-trip identically.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Inbound communication channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Channel {
    Phone,
    Email,
    Sms,
    VoiceMessage,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Phone => "phone",
            Channel::Email => "email",
            Channel::Sms => "sms",
            Channel::VoiceMessage => "voice-message",
        }
    }

    pub fn parse(s: &str) -> Option<Channel> {
        match s {
            "phone" => Some(Channel::Phone),
            "email" => Some(Channel::Email),
            "sms" => Some(Channel::Sms),
            "voice-message" => Some(Channel::VoiceMessage),
            _ => None,
        }
    }
}

/// Conversation sentiment as judged by the analysis service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

impl Sentiment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Positive => "positive",
            Sentiment::Neutral => "neutral",
            Sentiment::Negative => "negative",
        }
    }

    pub fn parse(s: &str) -> Option<Sentiment> {
        match s {
            "positive" => Some(Sentiment::Positive),
            "neutral" => Some(Sentiment::Neutral),
            "negative" => Some(Sentiment::Negative),
            _ => None,
        }
    }
}

/// Categorical priority label on an action plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Badge {
    AtRisk,
    Opportunity,
    Lead,
    FollowUp,
    NoAction,
}

impl Badge {
    pub fn as_str(&self) -> &'static str {
        match self {
            Badge::AtRisk => "at-risk",
            Badge::Opportunity => "opportunity",
            Badge::Lead => "lead",
            Badge::FollowUp => "follow-up",
            Badge::NoAction => "no-action",
        }
    }

    pub fn parse(s: &str) -> Option<Badge> {
        match s {
            "at-risk" => Some(Badge::AtRisk),
            "opportunity" => Some(Badge::Opportunity),
            "lead" => Some(Badge::Lead),
            "follow-up" => Some(Badge::FollowUp),
            "no-action" => Some(Badge::NoAction),
            _ => None,
        }
    }
}

/// Action plan lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanStatus {
    Active,
    Completed,
    Canceled,
}

impl PlanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanStatus::Active => "active",
            PlanStatus::Completed => "completed",
            PlanStatus::Canceled => "canceled",
        }
    }

    pub fn parse(s: &str) -> Option<PlanStatus> {
        match s {
            "active" => Some(PlanStatus::Active),
            "completed" => Some(PlanStatus::Completed),
            "canceled" => Some(PlanStatus::Canceled),
            _ => None,
        }
    }

    /// Deterministic projection onto the mirrored board card
    pub fn card_status(&self) -> CardStatus {
        match self {
            PlanStatus::Active => CardStatus::Active,
            PlanStatus::Completed => CardStatus::Done,
            PlanStatus::Canceled => CardStatus::Archived,
        }
    }
}

/// Board card status (projection of [`PlanStatus`])
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardStatus {
    Active,
    Done,
    Archived,
}

impl CardStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CardStatus::Active => "active",
            CardStatus::Done => "done",
            CardStatus::Archived => "archived",
        }
    }

    pub fn parse(s: &str) -> Option<CardStatus> {
        match s {
            "active" => Some(CardStatus::Active),
            "done" => Some(CardStatus::Done),
            "archived" => Some(CardStatus::Archived),
            _ => None,
        }
    }
}

/// Kind of follow-up step inside an action plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionItemKind {
    Email,
    Call,
    Task,
    Text,
}

impl ActionItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionItemKind::Email => "email",
            ActionItemKind::Call => "call",
            ActionItemKind::Task => "task",
            ActionItemKind::Text => "text",
        }
    }

    pub fn parse(s: &str) -> Option<ActionItemKind> {
        match s {
            "email" => Some(ActionItemKind::Email),
            "call" => Some(ActionItemKind::Call),
            "task" => Some(ActionItemKind::Task),
            "text" => Some(ActionItemKind::Text),
            _ => None,
        }
    }
}

/// Action item completion status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionItemStatus {
    Pending,
    Completed,
}

impl ActionItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionItemStatus::Pending => "pending",
            ActionItemStatus::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<ActionItemStatus> {
        match s {
            "pending" => Some(ActionItemStatus::Pending),
            "completed" => Some(ActionItemStatus::Completed),
            _ => None,
        }
    }
}

/// Tenant organization
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Organization {
    pub guid: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Org-scoped customer identity record
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub guid: Uuid,
    pub org_id: Uuid,
    pub name: String,
    pub company_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub avatar_url: Option<String>,
    /// 0-100 when scored
    pub risk_score: Option<i64>,
    /// 0-100 when scored
    pub opportunity_score: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Immutable record of one inbound communication
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub guid: Uuid,
    pub customer_id: Uuid,
    pub channel: Channel,
    pub occurred_at: DateTime<Utc>,
    pub transcript: String,
    pub summary: String,
    pub sentiment: Sentiment,
    pub intent: Option<String>,
    pub insights: Vec<String>,
    pub key_stats: serde_json::Value,
    pub duration_seconds: Option<i64>,
    pub message_count: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// Per (customer, channel) rolling aggregate
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Communication {
    pub guid: Uuid,
    pub customer_id: Uuid,
    pub channel: Channel,
    pub count: i64,
    pub last_at: DateTime<Utc>,
}

/// Most recent contact summary, one row per customer
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LastCommunication {
    pub customer_id: Uuid,
    pub channel: Channel,
    pub occurred_at: DateTime<Utc>,
    pub topic: String,
    pub short_topic: String,
    pub long_topic: String,
    pub updated_at: DateTime<Utc>,
}

/// Customer-scoped recommendation with a lifecycle status
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionPlan {
    pub guid: Uuid,
    pub customer_id: Uuid,
    pub badge: Badge,
    pub recommendation: String,
    pub what_to_do: Option<String>,
    pub why_strategy: Option<String>,
    pub status: PlanStatus,
    pub completed_at: Option<DateTime<Utc>>,
    pub canceled_at: Option<DateTime<Utc>>,
    pub assigned_user_id: Option<Uuid>,
    pub assigned_team_id: Option<Uuid>,
    pub board_card_id: Option<Uuid>,
    pub last_promoted_at: Option<DateTime<Utc>>,
    pub last_promoted_by: Option<Uuid>,
    pub last_promoted_board_id: Option<Uuid>,
    pub last_promoted_column_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Ordered child step of an action plan
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionItem {
    pub guid: Uuid,
    pub plan_id: Uuid,
    pub kind: ActionItemKind,
    pub description: String,
    pub position: i64,
    pub status: ActionItemStatus,
}

/// Kanban projection of an action plan
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardCard {
    pub guid: Uuid,
    pub plan_id: Uuid,
    pub board_id: Uuid,
    pub column_id: Uuid,
    pub status: CardStatus,
    pub position: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One audit-trail row per lifecycle transition
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub guid: Uuid,
    pub plan_id: Uuid,
    pub previous_status: PlanStatus,
    pub new_status: PlanStatus,
    pub actor_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}
