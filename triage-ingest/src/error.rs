//! Error types for triage-ingest

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde_json::json;
use thiserror::Error;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing or unknown API key (401)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Over the admission limit (429)
    #[error("Rate limit exceeded")]
    RateLimited {
        limit: u32,
        remaining: u32,
        reset_at: DateTime<Utc>,
    },

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    /// Generic error
    #[error(transparent)]
    Other(#[from] anyhow::Error),

    /// triage-common error
    #[error("{0}")]
    Common(#[from] triage_common::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::RateLimited {
            limit,
            remaining,
            reset_at,
        } = &self
        {
            return rate_limited_response(*limit, *remaining, *reset_at);
        }

        let (status, error_code, message) = match self {
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::RateLimited { .. } => unreachable!("handled above"),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg),
            ApiError::Other(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                err.to_string(),
            ),
            ApiError::Common(err) => return common_error_response(err),
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Map shared-crate errors onto API statuses so handlers can use `?`
/// directly on database and service calls.
fn common_error_response(err: triage_common::Error) -> Response {
    let (status, error_code, message) = match err {
        triage_common::Error::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
        triage_common::Error::InvalidInput(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
        other => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_ERROR",
            other.to_string(),
        ),
    };

    let body = Json(json!({
        "error": {
            "code": error_code,
            "message": message,
        }
    }));

    (status, body).into_response()
}

fn rate_limited_response(limit: u32, remaining: u32, reset_at: DateTime<Utc>) -> Response {
    let retry_after = (reset_at - Utc::now()).num_seconds().max(0);

    let body = Json(json!({
        "error": {
            "code": "RATE_LIMITED",
            "message": "Rate limit exceeded",
        }
    }));

    let mut response = (StatusCode::TOO_MANY_REQUESTS, body).into_response();
    let headers = response.headers_mut();
    insert_header(headers, header::RETRY_AFTER, retry_after.to_string());
    insert_header(headers, "x-ratelimit-limit", limit.to_string());
    insert_header(headers, "x-ratelimit-remaining", remaining.to_string());
    insert_header(headers, "x-ratelimit-reset", reset_at.timestamp().to_string());
    response
}

fn insert_header<K>(headers: &mut axum::http::HeaderMap, key: K, value: String)
where
    K: axum::http::header::IntoHeaderName,
{
    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(key, value);
    }
}

/// Result type for API handlers
pub type ApiResult<T> = std::result::Result<T, ApiError>;
