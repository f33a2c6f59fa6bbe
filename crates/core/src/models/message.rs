use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::common::MessageRole;

/// A single chat message as stored locally.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    pub role: MessageRole,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<serde_json::Value>,
    pub last_synced_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_message() -> Message {
        Message {
            id: "msg-001".to_string(),
            conversation_id: Some("conv-001".to_string()),
            role: MessageRole::User,
            text: Some("What is subrogation?".to_string()),
            created_at: Some(Utc.with_ymd_and_hms(2025, 3, 1, 9, 1, 0).unwrap()),
            modified_at: None,
            raw: None,
            last_synced_at: Utc.with_ymd_and_hms(2025, 3, 3, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn message_round_trip() {
        let msg = sample_message();
        let json = serde_json::to_string(&msg).unwrap();
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn message_role_serializes_lowercase() {
        let json = serde_json::to_string(&sample_message()).unwrap();
        assert!(json.contains("\"role\":\"user\""));
        assert!(json.contains("\"conversationId\""));
    }
}
