//! TOML-based configuration system for Slate.

use crate::error::{Result, SlateError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level Slate configuration, deserialized from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlateConfig {
    pub slate: SlateSection,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

/// Core Slate instance settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlateSection {
    pub instance_name: String,
    pub data_dir: String,
    #[serde(default)]
    pub database: DatabaseConfig,
}

/// Database backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "DatabaseDriver::default_driver")]
    pub driver: DatabaseDriver,
    /// SQLite file path (used when driver = "sqlite").
    #[serde(default)]
    pub path: Option<String>,
    /// PostgreSQL connection URL (used when driver = "postgres").
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: DatabaseDriver::Sqlite,
            path: Some("/var/lib/slate/slate.db".into()),
            url: None,
        }
    }
}

/// Supported database drivers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DatabaseDriver {
    Sqlite,
    Postgres,
}

impl DatabaseDriver {
    fn default_driver() -> Self {
        Self::Sqlite
    }
}

/// Remote Data API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: String::new(),
            api_key: String::new(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_request_timeout_secs() -> u64 {
    30
}

/// Sync engine tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
    /// Cap on records fetched per entity type in one run; guards against
    /// unbounded paging on large tenants.
    #[serde(default = "default_max_items_per_type")]
    pub max_items_per_type: u64,
    #[serde(default = "default_retry_limit")]
    pub retry_limit: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    /// Wall-clock ceiling for a whole sync session, in seconds.
    #[serde(default = "default_session_budget_secs")]
    pub session_budget_secs: u64,
    /// How long finished sessions stay available for progress polling.
    #[serde(default = "default_session_retention_secs")]
    pub session_retention_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_items_per_type: default_max_items_per_type(),
            retry_limit: default_retry_limit(),
            retry_backoff_ms: default_retry_backoff_ms(),
            session_budget_secs: default_session_budget_secs(),
            session_retention_secs: default_session_retention_secs(),
        }
    }
}

fn default_batch_size() -> u32 {
    200
}

fn default_max_items_per_type() -> u64 {
    10_000
}

fn default_retry_limit() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    500
}

fn default_session_budget_secs() -> u64 {
    600
}

fn default_session_retention_secs() -> u64 {
    3600
}

/// Background sync scheduler settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_minutes: default_interval_minutes(),
        }
    }
}

fn default_interval_minutes() -> u64 {
    60
}

impl SlateConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        toml::from_str(&contents).map_err(|e| SlateError::Config(e.to_string()))
    }

    /// Validate semantic constraints the deserializer cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.slate.instance_name.is_empty() {
            return Err(SlateError::Config("instance_name must not be empty".into()));
        }
        match self.slate.database.driver {
            DatabaseDriver::Sqlite if self.slate.database.path.is_none() => {
                return Err(SlateError::Config(
                    "database.path is required for the sqlite driver".into(),
                ));
            }
            DatabaseDriver::Postgres if self.slate.database.url.is_none() => {
                return Err(SlateError::Config(
                    "database.url is required for the postgres driver".into(),
                ));
            }
            _ => {}
        }
        if self.source.enabled {
            if self.source.base_url.is_empty() {
                return Err(SlateError::Config(
                    "source.base_url is required when the source is enabled".into(),
                ));
            }
            if self.source.api_key.is_empty() {
                return Err(SlateError::Config(
                    "source.api_key is required when the source is enabled".into(),
                ));
            }
        }
        if self.sync.batch_size == 0 || self.sync.batch_size > 500 {
            return Err(SlateError::Config(
                "sync.batch_size must be between 1 and 500".into(),
            ));
        }
        Ok(())
    }

    /// Default configuration used by `slate init` and in tests.
    pub fn generate_default() -> Self {
        Self {
            slate: SlateSection {
                instance_name: "slate".into(),
                data_dir: "/var/lib/slate".into(),
                database: DatabaseConfig::default(),
            },
            source: SourceConfig::default(),
            sync: SyncConfig::default(),
            scheduler: SchedulerConfig::default(),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.source.request_timeout_secs)
    }
}
