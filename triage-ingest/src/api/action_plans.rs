//! Action plan lifecycle endpoints

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::HeaderMap,
    routing::post,
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::services::action_plans::PlanProjection;
use crate::{ApiError, ApiResult, AppState};

/// Optional transition body identifying who performed the change
#[derive(Debug, Default, Deserialize)]
pub struct TransitionRequest {
    pub actor_id: Option<Uuid>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AssignRequest {
    pub user_id: Option<Uuid>,
    pub team_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct PromoteRequest {
    pub board_id: Uuid,
    pub column_id: Uuid,
    pub actor_id: Option<Uuid>,
}

fn require_body<T>(payload: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    let Json(body) = payload.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
    Ok(body)
}

fn optional_actor(payload: Option<Json<TransitionRequest>>) -> Option<Uuid> {
    payload.and_then(|Json(body)| body.actor_id)
}

/// POST /api/action-plans/{id}/complete
pub async fn complete_plan(
    State(state): State<AppState>,
    Path(plan_id): Path<Uuid>,
    headers: HeaderMap,
    payload: Option<Json<TransitionRequest>>,
) -> ApiResult<Json<PlanProjection>> {
    let (org, _) = super::authenticate(&state, &headers).await?;
    let projection = state
        .plans
        .complete(org.guid, plan_id, optional_actor(payload))
        .await?;
    Ok(Json(projection))
}

/// POST /api/action-plans/{id}/incomplete
pub async fn reopen_plan(
    State(state): State<AppState>,
    Path(plan_id): Path<Uuid>,
    headers: HeaderMap,
    payload: Option<Json<TransitionRequest>>,
) -> ApiResult<Json<PlanProjection>> {
    let (org, _) = super::authenticate(&state, &headers).await?;
    let projection = state
        .plans
        .mark_incomplete(org.guid, plan_id, optional_actor(payload))
        .await?;
    Ok(Json(projection))
}

/// POST /api/action-plans/{id}/cancel
pub async fn cancel_plan(
    State(state): State<AppState>,
    Path(plan_id): Path<Uuid>,
    headers: HeaderMap,
    payload: Option<Json<TransitionRequest>>,
) -> ApiResult<Json<PlanProjection>> {
    let (org, _) = super::authenticate(&state, &headers).await?;
    let projection = state
        .plans
        .cancel(org.guid, plan_id, optional_actor(payload))
        .await?;
    Ok(Json(projection))
}

/// POST /api/action-plans/{id}/assign
pub async fn assign_plan(
    State(state): State<AppState>,
    Path(plan_id): Path<Uuid>,
    headers: HeaderMap,
    payload: Result<Json<AssignRequest>, JsonRejection>,
) -> ApiResult<Json<PlanProjection>> {
    let (org, _) = super::authenticate(&state, &headers).await?;
    let request = require_body(payload)?;
    if request.user_id.is_none() && request.team_id.is_none() {
        return Err(ApiError::BadRequest(
            "assign requires user_id or team_id".to_string(),
        ));
    }
    let projection = state
        .plans
        .assign(org.guid, plan_id, request.user_id, request.team_id)
        .await?;
    Ok(Json(projection))
}

/// POST /api/action-plans/{id}/promote
pub async fn promote_plan(
    State(state): State<AppState>,
    Path(plan_id): Path<Uuid>,
    headers: HeaderMap,
    payload: Result<Json<PromoteRequest>, JsonRejection>,
) -> ApiResult<Json<PlanProjection>> {
    let (org, _) = super::authenticate(&state, &headers).await?;
    let request = require_body(payload)?;
    let projection = state
        .plans
        .promote_to_board(
            org.guid,
            plan_id,
            request.board_id,
            request.column_id,
            request.actor_id,
        )
        .await?;
    Ok(Json(projection))
}

/// Build action plan routes
pub fn action_plan_routes() -> Router<AppState> {
    Router::new()
        .route("/api/action-plans/:id/complete", post(complete_plan))
        .route("/api/action-plans/:id/incomplete", post(reopen_plan))
        .route("/api/action-plans/:id/cancel", post(cancel_plan))
        .route("/api/action-plans/:id/assign", post(assign_plan))
        .route("/api/action-plans/:id/promote", post(promote_plan))
}
