//! End-to-end pipeline scenarios: analysis, reconciliation, and the
//! change-notification stream observed together.

mod helpers;

use std::sync::{Arc, Mutex};

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::util::ServiceExt;
use triage_ingest::services::judgment::JudgmentError;

use helpers::{at_risk_payload, no_plan_payload, seed_org, test_app, test_config, ScriptedJudgment};

async fn ingest(app: &helpers::TestApp, api_key: &str, body: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri("/api/communications/ingest")
        .header("content-type", "application/json")
        .header("x-api-key", api_key)
        .body(Body::from(body.to_string()))
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

#[tokio::test]
async fn test_cancellation_email_produces_at_risk_plan_and_events() {
    let app = test_app(test_config(), ScriptedJudgment::repeating(at_risk_payload(), 1)).await;
    let org_id = seed_org(&app.pool, "key").await;

    let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let _sub = app.bus.subscribe_to_org(
        org_id,
        Arc::new(move |change| sink.lock().unwrap().push(change.key())),
    );

    let (status, payload) = ingest(
        &app,
        "key",
        json!({"channel": "email", "content": "I want to cancel my subscription."}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let plan_id = payload["actionPlanId"].as_str().unwrap();
    let (badge, plan_status): (String, String) =
        sqlx::query_as("SELECT badge, status FROM action_plans WHERE guid = ?")
            .bind(plan_id)
            .fetch_one(&app.pool)
            .await
            .unwrap();
    assert_eq!(badge, "at-risk");
    assert_eq!(plan_status, "active");

    assert_eq!(
        seen.lock().unwrap().as_slice(),
        [
            "customer:created",
            "conversation:created",
            "communication:created",
            "lastCommunication:created",
            "actionPlan:created",
            "actionItem:created",
            "actionItem:created",
        ]
    );
}

#[tokio::test]
async fn test_repeat_sender_matches_same_customer() {
    let app = test_app(test_config(), ScriptedJudgment::repeating(at_risk_payload(), 2)).await;
    seed_org(&app.pool, "key").await;

    let (_, first) = ingest(
        &app,
        "key",
        json!({"channel": "email", "content": "I want to cancel."}),
    )
    .await;
    let (_, second) = ingest(
        &app,
        "key",
        json!({"channel": "phone", "content": "Calling about my cancellation."}),
    )
    .await;

    assert_eq!(first["customerId"], second["customerId"]);

    let customer_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM customers")
        .fetch_one(&app.pool)
        .await
        .unwrap();
    assert_eq!(customer_count, 1);

    // One aggregate per channel, both attributed to the same customer.
    let channel_count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM communications WHERE customer_id = ?",
    )
    .bind(first["customerId"].as_str().unwrap())
    .fetch_one(&app.pool)
    .await
    .unwrap();
    assert_eq!(channel_count, 2);

    // The newer recommendation superseded the first plan.
    let active: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM action_plans WHERE status = 'active'")
            .fetch_one(&app.pool)
            .await
            .unwrap();
    assert_eq!(active, 1);
    let canceled: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM action_plans WHERE status = 'canceled'")
            .fetch_one(&app.pool)
            .await
            .unwrap();
    assert_eq!(canceled, 1);
}

#[tokio::test]
async fn test_judgment_outage_still_ingests_via_fallback() {
    let judgment = ScriptedJudgment::new(vec![
        Err(JudgmentError::Network("refused".to_string())),
        Err(JudgmentError::Network("refused".to_string())),
        Err(JudgmentError::Network("refused".to_string())),
    ]);
    let app = test_app(test_config(), judgment.clone()).await;
    seed_org(&app.pool, "key").await;

    let (status, payload) = ingest(
        &app,
        "key",
        json!({
            "channel": "voice-message",
            "content": "Hi, my name is Riley Chen, call me back at (555) 010-4477."
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(payload["success"], true);
    assert_eq!(judgment.calls(), 3, "retried to the attempt budget");

    let name: String = sqlx::query_scalar("SELECT name FROM customers")
        .fetch_one(&app.pool)
        .await
        .unwrap();
    assert_eq!(name, "Riley Chen");

    // Fallback always leaves a follow-up plan behind.
    let badge: String = sqlx::query_scalar("SELECT badge FROM action_plans")
        .fetch_one(&app.pool)
        .await
        .unwrap();
    assert_eq!(badge, "follow-up");
}

#[tokio::test]
async fn test_resolved_thread_creates_no_plan() {
    let app = test_app(test_config(), ScriptedJudgment::repeating(no_plan_payload(), 1)).await;
    seed_org(&app.pool, "key").await;

    let (status, payload) = ingest(
        &app,
        "key",
        json!({"channel": "email", "content": "Thanks, all sorted now."}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(payload["actionPlanId"].is_null());

    let plans: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM action_plans")
        .fetch_one(&app.pool)
        .await
        .unwrap();
    assert_eq!(plans, 0);
}

#[tokio::test]
async fn test_changes_are_not_delivered_across_orgs() {
    let app = test_app(test_config(), ScriptedJudgment::repeating(at_risk_payload(), 1)).await;
    seed_org(&app.pool, "key-a").await;
    let other_org = seed_org(&app.pool, "key-b").await;

    let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let _sub = app.bus.subscribe_to_org(
        other_org,
        Arc::new(move |change| sink.lock().unwrap().push(change.key())),
    );

    let (status, _) = ingest(
        &app,
        "key-a",
        json!({"channel": "email", "content": "I want to cancel."}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    assert!(seen.lock().unwrap().is_empty());
}
