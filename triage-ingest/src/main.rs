//! triage-ingest - Customer communication triage service
//!
//! Accepts inbound communications over HTTP, analyzes them through an
//! external judgment service, reconciles the results into per-tenant
//! customer records, and streams change notifications over SSE.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;
use triage_common::config::TriageConfig;
use triage_common::events::ChangeBus;

use triage_ingest::services::judgment::HttpJudgmentClient;
use triage_ingest::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting triage-ingest service");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = TriageConfig::load(None)?;

    info!("Database: {}", config.database.path.display());
    let db_pool = triage_common::db::init_database_pool(&config.database.path).await?;
    info!("Database connection established");

    let judgment_api_key =
        triage_ingest::config::resolve_judgment_api_key(&db_pool, &config.judgment).await?;
    let judgment = Arc::new(
        HttpJudgmentClient::new(
            config.judgment.endpoint.clone(),
            judgment_api_key,
            config.judgment.model.clone(),
            Duration::from_millis(config.judgment.request_timeout_ms),
        )
        .map_err(|e| anyhow::anyhow!("Failed to build judgment client: {}", e))?,
    );
    info!(
        endpoint = %config.judgment.endpoint,
        model = %config.judgment.model,
        "Judgment service configured"
    );

    // Change bus backing the SSE stream
    let bus = ChangeBus::new();

    let state = AppState::new(db_pool, bus, judgment, &config);
    let app = triage_ingest::build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    info!("Listening on http://{}", config.server.bind);
    info!("Health check: http://{}/health", config.server.bind);

    axum::serve(listener, app).await?;

    Ok(())
}
