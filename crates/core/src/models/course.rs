use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A course as stored locally.
///
/// The source platform populates course names inconsistently across three
/// fields, so [`Course::display_name`] applies the fallback chain instead
/// of any single column being authoritative.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<serde_json::Value>,
    pub last_synced_at: DateTime<Utc>,
}

impl Course {
    /// Best human-readable name: name, then name_text, then title, then a
    /// truncated id.
    pub fn display_name(&self) -> String {
        self.name
            .as_deref()
            .or(self.name_text.as_deref())
            .or(self.title.as_deref())
            .map(str::to_string)
            .unwrap_or_else(|| format!("Course {}", truncate_id(&self.id)))
    }
}

pub(crate) fn truncate_id(id: &str) -> &str {
    if id.len() > 8 {
        &id[..8]
    } else {
        id
    }
}
