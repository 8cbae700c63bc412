//! Shared fixtures for integration tests
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use sqlx::SqlitePool;
use triage_common::config::TriageConfig;
use triage_common::db::models::Channel;
use triage_common::events::ChangeBus;
use uuid::Uuid;

use triage_ingest::services::judgment::{JudgmentError, JudgmentService};
use triage_ingest::services::IngestMetadata;
use triage_ingest::AppState;

/// Judgment service double returning canned responses in order.
/// Once the script runs out it fails with a network error.
pub struct ScriptedJudgment {
    responses: Mutex<VecDeque<Result<Value, JudgmentError>>>,
    calls: AtomicU32,
}

impl ScriptedJudgment {
    pub fn new(responses: Vec<Result<Value, JudgmentError>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            calls: AtomicU32::new(0),
        })
    }

    /// Always answers with the same payload
    pub fn repeating(payload: Value, times: usize) -> Arc<Self> {
        Self::new((0..times).map(|_| Ok(payload.clone())).collect())
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JudgmentService for ScriptedJudgment {
    async fn judge(
        &self,
        _channel: Channel,
        _content: &str,
        _metadata: &IngestMetadata,
    ) -> Result<Value, JudgmentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(JudgmentError::Network("script exhausted".to_string())))
    }
}

/// At-risk cancellation analysis with one plan and two items
pub fn at_risk_payload() -> Value {
    json!({
        "customer": {
            "name": "Dana Alvarez",
            "companyName": "Northwind Traders",
            "email": "dana@northwind.example",
        },
        "summary": "Customer wants to cancel because onboarding stalled.",
        "sentiment": "negative",
        "intent": "cancel subscription",
        "insights": ["Onboarding incomplete"],
        "keyStats": {"seats": 40},
        "riskScore": 85,
        "actionPlan": {
            "badge": "at-risk",
            "recommendation": "Call Dana today to rescue the account.",
            "whatToDo": "Schedule an onboarding rescue session",
            "actionItems": [
                {"kind": "call", "description": "Call Dana about onboarding"},
                {"kind": "task", "description": "Audit onboarding checklist"}
            ]
        }
    })
}

/// Positive analysis without a plan suggestion
pub fn no_plan_payload() -> Value {
    json!({
        "customer": {
            "name": "Riley Chen",
            "companyName": "Fabrikam",
        },
        "summary": "Thanks for the quick fix, all working now.",
        "sentiment": "positive",
        "intent": "confirm resolution",
        "insights": [],
        "keyStats": {},
    })
}

pub async fn seed_org(pool: &SqlitePool, api_key: &str) -> Uuid {
    let org_id = Uuid::new_v4();
    sqlx::query("INSERT INTO organizations (guid, name, created_at) VALUES (?, ?, ?)")
        .bind(org_id.to_string())
        .bind("Test Org")
        .bind(Utc::now())
        .execute(pool)
        .await
        .unwrap();
    sqlx::query("INSERT INTO api_keys (key, org_id, created_at) VALUES (?, ?, ?)")
        .bind(api_key)
        .bind(org_id.to_string())
        .bind(Utc::now())
        .execute(pool)
        .await
        .unwrap();
    org_id
}

/// Config tuned for tests: single-attempt-friendly backoff, generous limits
pub fn test_config() -> TriageConfig {
    let mut config = TriageConfig::default();
    config.judgment.backoff_base_ms = 1;
    config
}

pub struct TestApp {
    pub router: axum::Router,
    pub pool: SqlitePool,
    pub bus: ChangeBus,
    pub state: AppState,
}

pub async fn test_app(config: TriageConfig, judgment: Arc<ScriptedJudgment>) -> TestApp {
    let pool = SqlitePool::connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory database");
    triage_common::db::init_tables(&pool)
        .await
        .expect("Failed to initialize schema");

    let bus = ChangeBus::new();
    let state = AppState::new(pool.clone(), bus.clone(), judgment, &config);
    let router = triage_ingest::build_router(state.clone());

    TestApp {
        router,
        pool,
        bus,
        state,
    }
}
