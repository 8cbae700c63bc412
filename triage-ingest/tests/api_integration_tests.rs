//! Integration tests for the triage-ingest HTTP surface

mod helpers;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::util::ServiceExt;

use helpers::{at_risk_payload, seed_org, test_app, test_config, ScriptedJudgment};

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

fn ingest_request(api_key: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/api/communications/ingest")
        .header("content-type", "application/json");
    if let Some(key) = api_key {
        builder = builder.header("x-api-key", key);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn plan_request(api_key: &str, plan_id: &str, op: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(format!("/api/action-plans/{}/{}", plan_id, op))
        .header("content-type", "application/json")
        .header("x-api-key", api_key)
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_health_no_auth() {
    let app = test_app(test_config(), ScriptedJudgment::new(vec![])).await;

    let request = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app.router, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "triage-ingest");
    assert!(body["uptime_seconds"].is_number());
}

#[tokio::test]
async fn test_ingest_missing_api_key() {
    let app = test_app(test_config(), ScriptedJudgment::new(vec![])).await;

    let body = json!({"channel": "email", "content": "hello"});
    let (status, payload) = send(&app.router, ingest_request(None, body)).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(payload["error"]["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn test_ingest_unknown_api_key() {
    let app = test_app(test_config(), ScriptedJudgment::new(vec![])).await;
    seed_org(&app.pool, "real-key").await;

    let body = json!({"channel": "email", "content": "hello"});
    let (status, _) = send(&app.router, ingest_request(Some("wrong-key"), body)).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_ingest_orphaned_key_is_not_found() {
    let app = test_app(test_config(), ScriptedJudgment::new(vec![])).await;
    // Key row without a backing organization; FK enforcement is suspended on
    // this one connection so the orphaned fixture row can exist at all.
    let mut conn = app.pool.acquire().await.unwrap();
    sqlx::query("PRAGMA foreign_keys = OFF")
        .execute(&mut *conn)
        .await
        .unwrap();
    sqlx::query("INSERT INTO api_keys (key, org_id, created_at) VALUES (?, ?, ?)")
        .bind("orphan-key")
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(chrono::Utc::now())
        .execute(&mut *conn)
        .await
        .unwrap();
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&mut *conn)
        .await
        .unwrap();
    drop(conn);

    let body = json!({"channel": "email", "content": "hello"});
    let (status, payload) = send(&app.router, ingest_request(Some("orphan-key"), body)).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(payload["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_ingest_rejects_blank_content_and_bad_channel() {
    let app = test_app(test_config(), ScriptedJudgment::new(vec![])).await;
    seed_org(&app.pool, "key").await;

    let blank = json!({"channel": "email", "content": "   "});
    let (status, payload) = send(&app.router, ingest_request(Some("key"), blank)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(payload["error"]["code"], "BAD_REQUEST");

    let bad_channel = json!({"channel": "fax", "content": "hello"});
    let (status, _) = send(&app.router, ingest_request(Some("key"), bad_channel)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_ingest_success_returns_created_ids() {
    let app = test_app(test_config(), ScriptedJudgment::repeating(at_risk_payload(), 1)).await;
    seed_org(&app.pool, "key").await;

    let body = json!({
        "channel": "email",
        "content": "I want to cancel my subscription.",
        "metadata": {"subject": "Cancellation"}
    });
    let (status, payload) = send(&app.router, ingest_request(Some("key"), body)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(payload["success"], true);
    assert!(payload["customerId"].is_string());
    assert!(payload["conversationId"].is_string());
    assert!(payload["actionPlanId"].is_string());

    let customer_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM customers")
        .fetch_one(&app.pool)
        .await
        .unwrap();
    assert_eq!(customer_count, 1);
    let item_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM action_items")
        .fetch_one(&app.pool)
        .await
        .unwrap();
    assert_eq!(item_count, 2);
}

#[tokio::test]
async fn test_ingest_rate_limit_headers() {
    let mut config = test_config();
    config.limits.ingest_max_requests = 1;
    let app = test_app(config, ScriptedJudgment::repeating(at_risk_payload(), 2)).await;
    seed_org(&app.pool, "key").await;

    let body = json!({"channel": "email", "content": "first"});
    let (status, _) = send(&app.router, ingest_request(Some("key"), body)).await;
    assert_eq!(status, StatusCode::OK);

    let body = json!({"channel": "email", "content": "second"});
    let response = app
        .router
        .clone()
        .oneshot(ingest_request(Some("key"), body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let headers = response.headers();
    assert!(headers.contains_key("retry-after"));
    assert_eq!(headers.get("x-ratelimit-limit").unwrap(), "1");
    assert_eq!(headers.get("x-ratelimit-remaining").unwrap(), "0");
    assert!(headers.contains_key("x-ratelimit-reset"));
}

#[tokio::test]
async fn test_rate_limit_is_per_api_key() {
    let mut config = test_config();
    config.limits.ingest_max_requests = 1;
    let app = test_app(config, ScriptedJudgment::repeating(at_risk_payload(), 3)).await;
    seed_org(&app.pool, "key-a").await;
    seed_org(&app.pool, "key-b").await;

    let body = json!({"channel": "email", "content": "from a"});
    let (status, _) = send(&app.router, ingest_request(Some("key-a"), body)).await;
    assert_eq!(status, StatusCode::OK);

    let body = json!({"channel": "email", "content": "from a again"});
    let (status, _) = send(&app.router, ingest_request(Some("key-a"), body)).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);

    // A different tenant's key has its own window.
    let body = json!({"channel": "email", "content": "from b"});
    let (status, _) = send(&app.router, ingest_request(Some("key-b"), body)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_ingest_missing_field_is_bad_request() {
    let app = test_app(test_config(), ScriptedJudgment::new(vec![])).await;
    seed_org(&app.pool, "key").await;

    // `channel` omitted entirely
    let body = json!({"content": "hello"});
    let (status, payload) = send(&app.router, ingest_request(Some("key"), body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(payload["error"]["code"], "BAD_REQUEST");
    assert!(payload["error"]["message"].is_string());

    // Mistyped field
    let body = json!({"channel": "email", "content": 42});
    let (status, payload) = send(&app.router, ingest_request(Some("key"), body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(payload["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_transition_records_actor() {
    let app = test_app(test_config(), ScriptedJudgment::repeating(at_risk_payload(), 1)).await;
    seed_org(&app.pool, "key").await;

    let body = json!({"channel": "email", "content": "I want to cancel."});
    let (_, payload) = send(&app.router, ingest_request(Some("key"), body)).await;
    let plan_id = payload["actionPlanId"].as_str().unwrap().to_string();

    let actor_id = uuid::Uuid::new_v4();
    let (status, _) = send(
        &app.router,
        plan_request("key", &plan_id, "complete", json!({"actor_id": actor_id})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let actor: Option<String> =
        sqlx::query_scalar("SELECT actor_id FROM action_plan_audit WHERE plan_id = ?")
            .bind(&plan_id)
            .fetch_one(&app.pool)
            .await
            .unwrap();
    assert_eq!(actor, Some(actor_id.to_string()));
}

#[tokio::test]
async fn test_plan_lifecycle_over_http() {
    let app = test_app(test_config(), ScriptedJudgment::repeating(at_risk_payload(), 1)).await;
    seed_org(&app.pool, "key").await;

    let body = json!({"channel": "email", "content": "I want to cancel."});
    let (_, payload) = send(&app.router, ingest_request(Some("key"), body)).await;
    let plan_id = payload["actionPlanId"].as_str().unwrap().to_string();

    let (status, completed) = send(
        &app.router,
        plan_request("key", &plan_id, "complete", json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(completed["status"], "completed");
    assert!(completed["completedAt"].is_string());

    let (status, reopened) = send(
        &app.router,
        plan_request("key", &plan_id, "incomplete", json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reopened["status"], "active");
    assert!(reopened["completedAt"].is_null());

    let (status, canceled) = send(
        &app.router,
        plan_request("key", &plan_id, "cancel", json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(canceled["status"], "canceled");

    // Canceled is terminal.
    let (status, payload) = send(
        &app.router,
        plan_request("key", &plan_id, "complete", json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(payload["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_plan_endpoints_are_org_scoped() {
    let app = test_app(test_config(), ScriptedJudgment::repeating(at_risk_payload(), 1)).await;
    seed_org(&app.pool, "key-a").await;
    seed_org(&app.pool, "key-b").await;

    let body = json!({"channel": "email", "content": "I want to cancel."});
    let (_, payload) = send(&app.router, ingest_request(Some("key-a"), body)).await;
    let plan_id = payload["actionPlanId"].as_str().unwrap().to_string();

    // Another org cannot see the plan.
    let (status, _) = send(
        &app.router,
        plan_request("key-b", &plan_id, "complete", json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Unknown plan id within the right org is also 404.
    let (status, _) = send(
        &app.router,
        plan_request(
            "key-a",
            &uuid::Uuid::new_v4().to_string(),
            "cancel",
            json!({}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_assign_and_promote_over_http() {
    let app = test_app(test_config(), ScriptedJudgment::repeating(at_risk_payload(), 1)).await;
    seed_org(&app.pool, "key").await;

    let body = json!({"channel": "email", "content": "I want to cancel."});
    let (_, payload) = send(&app.router, ingest_request(Some("key"), body)).await;
    let plan_id = payload["actionPlanId"].as_str().unwrap().to_string();

    let user_id = uuid::Uuid::new_v4();
    let (status, assigned) = send(
        &app.router,
        plan_request("key", &plan_id, "assign", json!({"user_id": user_id})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(assigned["assignedUserId"], user_id.to_string());

    // Empty assignment is rejected.
    let (status, _) = send(
        &app.router,
        plan_request("key", &plan_id, "assign", json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let board_id = uuid::Uuid::new_v4();
    let column_id = uuid::Uuid::new_v4();
    let (status, promoted) = send(
        &app.router,
        plan_request(
            "key",
            &plan_id,
            "promote",
            json!({"board_id": board_id, "column_id": column_id}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(promoted["boardCard"]["position"], 0);
    assert_eq!(promoted["boardCard"]["columnId"], column_id.to_string());
    assert_eq!(promoted["lastPromotedBoardId"], board_id.to_string());
}
