//! HTTP API handlers

pub mod action_plans;
pub mod health;
pub mod ingest;
pub mod sse;

pub use action_plans::action_plan_routes;
pub use health::health_routes;
pub use ingest::ingest_routes;
pub use sse::event_routes;

use axum::http::HeaderMap;
use triage_common::db::models::Organization;

use crate::{ApiError, ApiResult, AppState};

const API_KEY_HEADER: &str = "x-api-key";

/// Resolve the caller's organization from the `X-API-Key` header
///
/// Returns the organization together with the raw key, which also serves
/// as the ingestion limiter key. An unknown key is 401; a key whose
/// organization row has been removed is 404.
pub async fn authenticate(
    state: &AppState,
    headers: &HeaderMap,
) -> ApiResult<(Organization, String)> {
    let key = headers
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .ok_or_else(|| ApiError::Unauthorized("Missing X-API-Key header".to_string()))?;

    let org_id = crate::db::find_org_id_for_api_key(&state.db, key)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Unknown API key".to_string()))?;

    let org = crate::db::get_organization(&state.db, org_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Organization not found".to_string()))?;

    Ok((org, key.to_string()))
}
