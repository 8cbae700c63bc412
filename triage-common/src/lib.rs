//! Shared types for the triage pipeline services
//!
//! Provides error types, configuration loading, the change-notification bus,
//! and database access (pool init, schema, row models) used by the ingestion
//! service and its tests.

pub mod config;
pub mod db;
pub mod error;
pub mod events;

pub use error::{Error, Result};
