//! Database access for triage-ingest
//!
//! Per-table query modules over the shared SQLite pool. Guids are stored as
//! hyphenated TEXT; timestamps as RFC 3339 TEXT (sqlx's chrono encoding).

pub mod action_plans;
pub mod communications;
pub mod conversations;
pub mod customers;

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use triage_common::{db::models::Organization, Error, Result};
use uuid::Uuid;

/// Parse a TEXT guid column
pub(crate) fn parse_guid(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| Error::Internal(format!("Invalid UUID in database: {}", e)))
}

/// Parse an optional TEXT guid column
pub(crate) fn parse_opt_guid(s: Option<&str>) -> Result<Option<Uuid>> {
    s.map(parse_guid).transpose()
}

/// Look up the organization id an API key belongs to
///
/// Returns `Ok(None)` when the key is unknown; the caller maps that to 401.
pub async fn find_org_id_for_api_key(pool: &SqlitePool, api_key: &str) -> Result<Option<Uuid>> {
    let row: Option<(String,)> = sqlx::query_as("SELECT org_id FROM api_keys WHERE key = ?")
        .bind(api_key)
        .fetch_optional(pool)
        .await?;
    row.map(|(org_id,)| parse_guid(&org_id)).transpose()
}

/// Fetch one organization row
pub async fn get_organization(pool: &SqlitePool, org_id: Uuid) -> Result<Option<Organization>> {
    let row: Option<(String, String, DateTime<Utc>)> =
        sqlx::query_as("SELECT guid, name, created_at FROM organizations WHERE guid = ?")
            .bind(org_id.to_string())
            .fetch_optional(pool)
            .await?;

    match row {
        None => Ok(None),
        Some((guid, name, created_at)) => Ok(Some(Organization {
            guid: parse_guid(&guid)?,
            name,
            created_at,
        })),
    }
}

/// Read a value from the settings table
pub async fn get_setting(pool: &SqlitePool, key: &str) -> Result<Option<String>> {
    let row: Option<(String,)> = sqlx::query_as("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|(v,)| v))
}


#[cfg(test)]
mod tests {
    use super::{test_util::*, *};

    #[tokio::test]
    async fn test_api_key_resolution() {
        let pool = setup_pool().await;
        let org_id = seed_org(&pool, "key-123").await;

        let resolved = find_org_id_for_api_key(&pool, "key-123").await.unwrap();
        assert_eq!(resolved, Some(org_id));
        assert!(find_org_id_for_api_key(&pool, "bogus").await.unwrap().is_none());

        let org = get_organization(&pool, org_id).await.unwrap().unwrap();
        assert_eq!(org.guid, org_id);
        assert!(get_organization(&pool, Uuid::new_v4()).await.unwrap().is_none());
    }
}
