//! Database access for the triage services
//!
//! SQLite-backed store, one database file per deployment. The schema is
//! created on startup; tests connect to `sqlite::memory:` and call
//! [`init_tables`] directly.

pub mod models;

use std::path::Path;

use sqlx::SqlitePool;

use crate::Result;

/// Initialize database connection pool
///
/// Connects to the database at `db_path` (created if missing) and ensures
/// all tables exist.
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // SQLite URI with mode=rwc (read, write, create)
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let pool = SqlitePool::connect(&db_url).await?;

    init_tables(&pool).await?;

    Ok(pool)
}

/// Create all triage tables if they don't exist
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS organizations (
            guid TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS api_keys (
            key TEXT PRIMARY KEY,
            org_id TEXT NOT NULL REFERENCES organizations(guid),
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS customers (
            guid TEXT PRIMARY KEY,
            org_id TEXT NOT NULL REFERENCES organizations(guid),
            name TEXT NOT NULL,
            company_name TEXT NOT NULL,
            email TEXT,
            phone TEXT,
            avatar_url TEXT,
            risk_score INTEGER,
            opportunity_score INTEGER,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // One row per (orgId, lowercased email) when email is present. Phone and
    // name+company are fuzzy matching keys only, never uniquely constrained.
    sqlx::query(
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS idx_customers_org_email
        ON customers(org_id, email) WHERE email IS NOT NULL
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS conversations (
            guid TEXT PRIMARY KEY,
            customer_id TEXT NOT NULL REFERENCES customers(guid) ON DELETE CASCADE,
            channel TEXT NOT NULL,
            occurred_at TEXT NOT NULL,
            transcript TEXT NOT NULL,
            summary TEXT NOT NULL,
            sentiment TEXT NOT NULL,
            intent TEXT,
            insights TEXT NOT NULL DEFAULT '[]',
            key_stats TEXT NOT NULL DEFAULT '{}',
            duration_seconds INTEGER,
            message_count INTEGER,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS communications (
            guid TEXT PRIMARY KEY,
            customer_id TEXT NOT NULL REFERENCES customers(guid) ON DELETE CASCADE,
            channel TEXT NOT NULL,
            count INTEGER NOT NULL DEFAULT 0,
            last_at TEXT NOT NULL,
            UNIQUE(customer_id, channel)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS last_communications (
            customer_id TEXT PRIMARY KEY REFERENCES customers(guid) ON DELETE CASCADE,
            channel TEXT NOT NULL,
            occurred_at TEXT NOT NULL,
            topic TEXT NOT NULL,
            short_topic TEXT NOT NULL,
            long_topic TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS action_plans (
            guid TEXT PRIMARY KEY,
            customer_id TEXT NOT NULL REFERENCES customers(guid) ON DELETE CASCADE,
            badge TEXT NOT NULL,
            recommendation TEXT NOT NULL,
            what_to_do TEXT,
            why_strategy TEXT,
            status TEXT NOT NULL DEFAULT 'active',
            completed_at TEXT,
            canceled_at TEXT,
            assigned_user_id TEXT,
            assigned_team_id TEXT,
            board_card_id TEXT,
            last_promoted_at TEXT,
            last_promoted_by TEXT,
            last_promoted_board_id TEXT,
            last_promoted_column_id TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS action_items (
            guid TEXT PRIMARY KEY,
            plan_id TEXT NOT NULL REFERENCES action_plans(guid) ON DELETE CASCADE,
            kind TEXT NOT NULL,
            description TEXT NOT NULL,
            position INTEGER NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending'
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS board_cards (
            guid TEXT PRIMARY KEY,
            plan_id TEXT NOT NULL REFERENCES action_plans(guid) ON DELETE CASCADE,
            board_id TEXT NOT NULL,
            column_id TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'active',
            position INTEGER NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS action_plan_audit (
            guid TEXT PRIMARY KEY,
            plan_id TEXT NOT NULL REFERENCES action_plans(guid) ON DELETE CASCADE,
            previous_status TEXT NOT NULL,
            new_status TEXT NOT NULL,
            actor_id TEXT,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    tracing::info!("Database tables initialized");

    Ok(())
}
