//! Communication ingestion endpoint

use axum::{
    extract::{rejection::JsonRejection, State},
    http::HeaderMap,
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use triage_common::db::models::Channel;
use uuid::Uuid;

use crate::services::IngestMetadata;
use crate::{ApiError, ApiResult, AppState};

#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    pub channel: String,
    pub content: String,
    #[serde(default)]
    pub user_id: Option<Uuid>,
    #[serde(default)]
    pub metadata: IngestMetadata,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestResponse {
    pub success: bool,
    pub customer_id: Uuid,
    pub conversation_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_plan_id: Option<Uuid>,
}

/// POST /api/communications/ingest
///
/// Runs the full pipeline for one inbound communication: admission
/// control, analysis, then reconciliation into the caller's org.
pub async fn ingest_communication(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<IngestRequest>, JsonRejection>,
) -> ApiResult<Json<IngestResponse>> {
    let (org, api_key) = super::authenticate(&state, &headers).await?;

    let decision = state.ingest_limiter.check(&api_key);
    if !decision.allowed {
        return Err(ApiError::RateLimited {
            limit: state.ingest_limiter.limit(),
            remaining: decision.remaining,
            reset_at: decision.reset_at,
        });
    }

    // Malformed or incomplete bodies are client errors, same as field
    // validation below.
    let Json(request) = payload.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;

    if request.content.trim().is_empty() {
        return Err(ApiError::BadRequest("content must not be blank".to_string()));
    }
    let channel = Channel::parse(&request.channel).ok_or_else(|| {
        ApiError::BadRequest(format!("Unknown channel: {}", request.channel))
    })?;

    tracing::info!(
        org = %org.guid,
        channel = channel.as_str(),
        bytes = request.content.len(),
        "Ingesting communication"
    );

    let analysis = state
        .analyzer
        .analyze(org.guid, channel, &request.content, &request.metadata)
        .await;
    let outcome = state
        .reconciler
        .ingest(
            org.guid,
            request.user_id,
            channel,
            &request.content,
            &request.metadata,
            &analysis,
        )
        .await?;

    Ok(Json(IngestResponse {
        success: true,
        customer_id: outcome.customer_id,
        conversation_id: outcome.conversation_id,
        action_plan_id: outcome.action_plan_id,
    }))
}

/// Build ingestion routes
pub fn ingest_routes() -> Router<AppState> {
    Router::new().route("/api/communications/ingest", post(ingest_communication))
}
