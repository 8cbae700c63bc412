//! Configuration resolution for triage-ingest
//!
//! Multi-tier resolution of the judgment service API key with
//! Database → ENV → TOML priority.

use sqlx::{Pool, Sqlite};
use tracing::{info, warn};
use triage_common::config::JudgmentConfig;
use triage_common::{Error, Result};

/// Environment variable consulted at tier 2
pub const JUDGMENT_API_KEY_ENV: &str = "TRIAGE_JUDGMENT_API_KEY";

/// Settings-table key consulted at tier 1
pub const JUDGMENT_API_KEY_SETTING: &str = "judgment_api_key";

/// Resolve the judgment service API key from 3-tier configuration
///
/// **Priority:** Database → ENV → TOML
pub async fn resolve_judgment_api_key(
    db: &Pool<Sqlite>,
    judgment_config: &JudgmentConfig,
) -> Result<String> {
    let mut sources = Vec::new();

    // Tier 1: Database (authoritative)
    let db_key = crate::db::get_setting(db, JUDGMENT_API_KEY_SETTING).await?;
    if let Some(key) = &db_key {
        if is_valid_key(key) {
            sources.push("database");
        }
    }

    // Tier 2: Environment variable
    let env_key = std::env::var(JUDGMENT_API_KEY_ENV).ok();
    if let Some(key) = &env_key {
        if is_valid_key(key) {
            sources.push("environment");
        }
    }

    // Tier 3: TOML config
    let toml_key = judgment_config.api_key.as_ref();
    if let Some(key) = toml_key {
        if is_valid_key(key) {
            sources.push("TOML");
        }
    }

    // Warn if multiple sources (potential misconfiguration)
    if sources.len() > 1 {
        warn!(
            "Judgment API key found in multiple sources: {}. Using database (highest priority).",
            sources.join(", ")
        );
    }

    // Resolution priority
    if let Some(key) = db_key {
        if is_valid_key(&key) {
            info!("Judgment API key loaded from database");
            return Ok(key);
        }
    }

    if let Some(key) = env_key {
        if is_valid_key(&key) {
            info!("Judgment API key loaded from environment variable");
            return Ok(key);
        }
    }

    if let Some(key) = toml_key {
        if is_valid_key(key) {
            info!("Judgment API key loaded from TOML config");
            return Ok(key.clone());
        }
    }

    Err(Error::Config(format!(
        "Judgment API key not configured. Configure using one of:\n\
         1. Settings table: key '{}'\n\
         2. Environment: {}=your-key-here\n\
         3. TOML config: [judgment] api_key = \"your-key\"",
        JUDGMENT_API_KEY_SETTING, JUDGMENT_API_KEY_ENV
    )))
}

/// Validate API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_util::setup_pool;

    #[test]
    fn test_key_validation() {
        assert!(is_valid_key("sk-abc123"));
        assert!(!is_valid_key(""));
        assert!(!is_valid_key("   "));
    }

    #[tokio::test]
    async fn test_database_key_wins_over_toml() {
        let pool = setup_pool().await;
        sqlx::query("INSERT INTO settings (key, value) VALUES (?, ?)")
            .bind(JUDGMENT_API_KEY_SETTING)
            .bind("db-key")
            .execute(&pool)
            .await
            .unwrap();

        let judgment = JudgmentConfig {
            api_key: Some("toml-key".to_string()),
            ..Default::default()
        };
        let key = resolve_judgment_api_key(&pool, &judgment).await.unwrap();
        assert_eq!(key, "db-key");
    }

    #[tokio::test]
    async fn test_toml_key_used_when_database_empty() {
        let pool = setup_pool().await;
        let judgment = JudgmentConfig {
            api_key: Some("toml-key".to_string()),
            ..Default::default()
        };
        let key = resolve_judgment_api_key(&pool, &judgment).await.unwrap();
        assert_eq!(key, "toml-key");
    }

    #[tokio::test]
    async fn test_missing_key_is_a_config_error() {
        let pool = setup_pool().await;
        let err = resolve_judgment_api_key(&pool, &JudgmentConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
