use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A tutoring conversation as stored locally.
///
/// Foreign keys reference other records by their external ids. The
/// `user_email`, `course_name`, `assignment_name`, and `starter_name`
/// columns are denormalized from already-synced local rows at sync time
/// and stay NULL when the referenced row has not been synced yet; a later
/// pass fills them in.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub course_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub course_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignment_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignment_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub starter_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub starter_name: Option<String>,
    pub message_count: i64,
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

    fn sample_conversation() -> Conversation {
        Conversation {
            id: "conv-001".to_string(),
            user_id: Some("u1".to_string()),
            user_email: Some("learner@example.com".to_string()),
            course_id: Some("c1".to_string()),
            course_name: Some("Risk Management 101".to_string()),
            assignment_id: Some("a1".to_string()),
            assignment_name: Some("Chapter 3 Quiz".to_string()),
            starter_id: Some("s1".to_string()),
            starter_name: Some("Quiz Me".to_string()),
            message_count: 12,
            created_at: Some(Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap()),
            modified_at: None,
            raw: None,
            last_synced_at: Utc.with_ymd_and_hms(2025, 3, 3, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn conversation_round_trip() {
        let conv = sample_conversation();
        let json = serde_json::to_string(&conv).unwrap();
        let back: Conversation = serde_json::from_str(&json).unwrap();
        assert_eq!(back, conv);
    }

    #[test]
    fn conversation_camel_case_fields() {
        let json = serde_json::to_string(&sample_conversation()).unwrap();
        assert!(json.contains("\"userId\""));
        assert!(json.contains("\"courseName\""));
        assert!(json.contains("\"assignmentName\""));
        assert!(json.contains("\"starterName\""));
        assert!(json.contains("\"messageCount\""));
    }

    #[test]
    fn unresolved_references_serialize_sparse() {
        let mut conv = sample_conversation();
        conv.user_email = None;
        conv.course_name = None;
        conv.assignment_name = None;
        conv.starter_name = None;
        let json = serde_json::to_string(&conv).unwrap();
        assert!(!json.contains("\"userEmail\""));
        assert!(!json.contains("\"courseName\""));
    }
}
