use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::common::ActivityKind;

/// A conversation starter (canned tutoring prompt) as stored locally.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConversationStarter {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_text: Option<String>,
    pub activity: ActivityKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<serde_json::Value>,
    pub last_synced_at: DateTime<Utc>,
}

impl ConversationStarter {
    pub fn display_name(&self) -> Option<&str> {
        self.name.as_deref().or(self.name_text.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_starter() -> ConversationStarter {
        ConversationStarter {
            id: "s1".to_string(),
            name: Some("Quiz Me".to_string()),
            name_text: Some("Quiz Me (text)".to_string()),
            activity: ActivityKind::Quiz,
            created_at: None,
            modified_at: None,
            raw: None,
            last_synced_at: Utc.with_ymd_and_hms(2025, 3, 3, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn display_name_prefers_name() {
        let starter = sample_starter();
        assert_eq!(starter.display_name(), Some("Quiz Me"));
    }

    #[test]
    fn display_name_falls_back_to_name_text() {
        let mut starter = sample_starter();
        starter.name = None;
        assert_eq!(starter.display_name(), Some("Quiz Me (text)"));
    }

    #[test]
    fn starter_round_trip() {
        let starter = sample_starter();
        let json = serde_json::to_string(&starter).unwrap();
        assert!(json.contains("\"activity\":\"quiz\""));
        let back: ConversationStarter = serde_json::from_str(&json).unwrap();
        assert_eq!(back, starter);
    }
}
