//! Configuration loading for the triage services
//!
//! Configuration comes from a TOML file whose path resolves in priority
//! order: explicit argument, `TRIAGE_CONFIG` environment variable, then
//! `./triage.toml`. A missing file is not an error; every field has a
//! compiled default so the service starts with zero configuration.
//! Secrets (the judgment-service API key) additionally resolve through the
//! database settings table and environment, see the ingest service's
//! credential resolution.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::{Error, Result};

/// Top-level configuration for the ingestion service
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TriageConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub judgment: JudgmentConfig,
    pub limits: LimitsConfig,
}

/// HTTP server binding
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:5810".to_string(),
        }
    }
}

/// Database location
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("triage.db"),
        }
    }
}

/// External judgment service (LLM) settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct JudgmentConfig {
    /// Chat-completions style endpoint URL
    pub endpoint: String,
    /// Model identifier sent with each request
    pub model: String,
    /// API key; lowest-priority tier of the credential resolution
    pub api_key: Option<String>,
    /// Per-attempt request timeout so a hung call cannot stall the retry budget
    pub request_timeout_ms: u64,
    /// Maximum judgment attempts before the deterministic fallback
    pub max_attempts: u32,
    /// Exponential backoff base between attempts
    pub backoff_base_ms: u64,
}

impl Default for JudgmentConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key: None,
            request_timeout_ms: 30_000,
            max_attempts: 3,
            backoff_base_ms: 1000,
        }
    }
}

/// Admission control windows
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Ingestion boundary: window per API key
    pub ingest_window_ms: u64,
    pub ingest_max_requests: u32,
    /// Judgment-service calls: window per organization
    pub analysis_window_ms: u64,
    pub analysis_max_requests: u32,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            ingest_window_ms: 60_000,
            ingest_max_requests: 100,
            analysis_window_ms: 60_000,
            analysis_max_requests: 20,
        }
    }
}

impl TriageConfig {
    /// Load configuration, falling back to defaults when no file exists
    ///
    /// Priority: explicit `path` argument, `TRIAGE_CONFIG` env var,
    /// `./triage.toml`.
    pub fn load(path: Option<&Path>) -> Result<TriageConfig> {
        let resolved = match path {
            Some(p) => p.to_path_buf(),
            None => match std::env::var("TRIAGE_CONFIG") {
                Ok(p) => PathBuf::from(p),
                Err(_) => PathBuf::from("triage.toml"),
            },
        };

        if !resolved.exists() {
            tracing::info!(path = %resolved.display(), "No config file found, using defaults");
            return Ok(TriageConfig::default());
        }

        let content = std::fs::read_to_string(&resolved)?;
        let config: TriageConfig = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse {}: {}", resolved.display(), e)))?;

        tracing::info!(path = %resolved.display(), "Configuration loaded");
        Ok(config)
    }
}
