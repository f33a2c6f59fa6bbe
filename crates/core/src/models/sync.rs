use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::common::EntityType;

/// Persisted outcome of the most recent sync attempt for one entity type.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EntityStatus {
    Idle,
    Running,
    Completed,
    Failed,
}

impl EntityStatus {
    pub fn parse(s: &str) -> EntityStatus {
        match s {
            "running" => EntityStatus::Running,
            "completed" => EntityStatus::Completed,
            "failed" => EntityStatus::Failed,
            _ => EntityStatus::Idle,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityStatus::Idle => "idle",
            EntityStatus::Running => "running",
            EntityStatus::Completed => "completed",
            EntityStatus::Failed => "failed",
        }
    }
}

/// Whether a sync run starts from scratch or continues from stored cursors.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    Full,
    #[default]
    Incremental,
}

/// Per-entity-type sync cursor and last-run outcome. One row per type in
/// the `sync_status` table, mutated in place after every batch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SyncState {
    pub entity_type: EntityType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_synced_at: Option<DateTime<Utc>>,
    /// Newest source-side modification timestamp observed for this type.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified_seen: Option<DateTime<Utc>>,
    pub last_offset: i64,
    pub total_records: i64,
    pub status: EntityStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl SyncState {
    /// Fresh state for a type that has never been synced.
    pub fn new(entity_type: EntityType) -> Self {
        Self {
            entity_type,
            last_synced_at: None,
            last_modified_seen: None,
            last_offset: 0,
            total_records: 0,
            status: EntityStatus::Idle,
            last_error: None,
            updated_at: Utc::now(),
        }
    }
}

/// Outcome of one batch upsert. Records fail individually; a non-zero
/// `failed` count never aborts the batch it belongs to.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UpsertResult {
    pub inserted: u64,
    pub updated: u64,
    pub failed: u64,
}

impl UpsertResult {
    pub fn merge(&mut self, other: UpsertResult) {
        self.inserted += other.inserted;
        self.updated += other.updated;
        self.failed += other.failed;
    }

    pub fn applied(&self) -> u64 {
        self.inserted + self.updated
    }
}
