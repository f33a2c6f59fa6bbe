use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A platform user as stored locally.
///
/// `id` is the stable external identifier assigned by the source platform
/// and doubles as the upsert key. `raw` keeps the complete source payload
/// so columns can be backfilled without a re-fetch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub signed_up: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    pub opted_out: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<serde_json::Value>,
    pub last_synced_at: DateTime<Utc>,
}
