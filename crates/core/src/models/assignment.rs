use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::course::truncate_id;

/// An assignment as stored locally.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignment_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignment_name_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub course_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<serde_json::Value>,
    pub last_synced_at: DateTime<Utc>,
}

impl Assignment {
    /// Best human-readable name. The `*_text` variants hold the resolved
    /// display string on the platform, so they take priority over the raw
    /// reference fields.
    pub fn display_name(&self) -> String {
        self.assignment_name_text
            .as_deref()
            .or(self.name_text.as_deref())
            .or(self.assignment_name.as_deref())
            .or(self.name.as_deref())
            .or(self.title.as_deref())
            .map(str::to_string)
            .unwrap_or_else(|| format!("Assignment {}", truncate_id(&self.id)))
    }
}
