//! triage-ingest library interface
//!
//! Exposes the ingestion pipeline and HTTP surface for integration testing.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod services;

pub use crate::error::{ApiError, ApiResult};

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use triage_common::config::TriageConfig;
use triage_common::events::ChangeBus;

use crate::services::analyzer::{Analyzer, AnalyzerPolicy};
use crate::services::action_plans::PlanService;
use crate::services::judgment::JudgmentService;
use crate::services::rate_limiter::SlidingWindowLimiter;
use crate::services::reconciler::Reconciler;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Change notification bus backing the SSE stream
    pub bus: ChangeBus,
    /// Analysis orchestrator (judgment calls, retries, fallback)
    pub analyzer: Arc<Analyzer>,
    /// Reconciliation engine applying analyses to tenant records
    pub reconciler: Arc<Reconciler>,
    /// Action plan lifecycle operations
    pub plans: Arc<PlanService>,
    /// Per-API-key admission control at the ingestion boundary
    pub ingest_limiter: Arc<SlidingWindowLimiter>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        db: SqlitePool,
        bus: ChangeBus,
        judgment: Arc<dyn JudgmentService>,
        config: &TriageConfig,
    ) -> Self {
        let analysis_limiter = SlidingWindowLimiter::new(
            Duration::from_millis(config.limits.analysis_window_ms),
            config.limits.analysis_max_requests,
        );
        let analyzer = Arc::new(Analyzer::new(
            judgment,
            analysis_limiter,
            AnalyzerPolicy {
                max_attempts: config.judgment.max_attempts,
                backoff_base_ms: config.judgment.backoff_base_ms,
            },
        ));

        Self {
            reconciler: Arc::new(Reconciler::new(db.clone(), bus.clone())),
            plans: Arc::new(PlanService::new(db.clone(), bus.clone())),
            ingest_limiter: Arc::new(SlidingWindowLimiter::new(
                Duration::from_millis(config.limits.ingest_window_ms),
                config.limits.ingest_max_requests,
            )),
            analyzer,
            db,
            bus,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::ingest_routes())
        .merge(api::action_plan_routes())
        .merge(api::event_routes())
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
