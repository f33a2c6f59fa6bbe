use serde::{Deserialize, Serialize};
use std::fmt;

/// The six record kinds synced from the source platform.
///
/// [`EntityType::SYNC_ORDER`] lists them in foreign-key dependency order:
/// conversations reference users, courses, assignments, and starters, and
/// messages reference conversations, so those two kinds must come last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    User,
    Course,
    Assignment,
    ConversationStarter,
    Conversation,
    Message,
}

impl EntityType {
    pub const SYNC_ORDER: [EntityType; 6] = [
        EntityType::User,
        EntityType::Course,
        EntityType::Assignment,
        EntityType::ConversationStarter,
        EntityType::Conversation,
        EntityType::Message,
    ];

    /// Stable snake_case key used in the database and in API payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::User => "user",
            EntityType::Course => "course",
            EntityType::Assignment => "assignment",
            EntityType::ConversationStarter => "conversation_starter",
            EntityType::Conversation => "conversation",
            EntityType::Message => "message",
        }
    }

    /// Object path on the source Data API.
    pub fn api_path(&self) -> &'static str {
        // The platform exposes singular object names.
        self.as_str()
    }

    pub fn parse(s: &str) -> Option<EntityType> {
        match s {
            "user" => Some(EntityType::User),
            "course" => Some(EntityType::Course),
            "assignment" => Some(EntityType::Assignment),
            "conversation_starter" => Some(EntityType::ConversationStarter),
            "conversation" => Some(EntityType::Conversation),
            "message" => Some(EntityType::Message),
            _ => None,
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who authored a message in a tutoring conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    Other,
}

impl MessageRole {
    pub fn parse(s: &str) -> MessageRole {
        match s {
            "user" => MessageRole::User,
            "assistant" => MessageRole::Assistant,
            _ => MessageRole::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::Other => "other",
        }
    }
}

/// Activity category of a conversation starter, classified from its title.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityKind {
    Quiz,
    Review,
    Takeaway,
    Simplify,
    Study,
    Motivate,
    Other,
}

impl ActivityKind {
    /// Classify a starter title. The platform uses a fixed set of starter
    /// prompts ("Quiz Me", "Review Terms", ...) so keyword matching on the
    /// lowercased title is sufficient.
    pub fn from_title(title: &str) -> ActivityKind {
        let title = title.to_lowercase();
        if title.contains("quiz") {
            ActivityKind::Quiz
        } else if title.contains("review") {
            ActivityKind::Review
        } else if title.contains("takeaway") {
            ActivityKind::Takeaway
        } else if title.contains("simplify") {
            ActivityKind::Simplify
        } else if title.contains("study") {
            ActivityKind::Study
        } else if title.contains("motivate") {
            ActivityKind::Motivate
        } else {
            ActivityKind::Other
        }
    }

    pub fn parse(s: &str) -> ActivityKind {
        match s {
            "quiz" => ActivityKind::Quiz,
            "review" => ActivityKind::Review,
            "takeaway" => ActivityKind::Takeaway,
            "simplify" => ActivityKind::Simplify,
            "study" => ActivityKind::Study,
            "motivate" => ActivityKind::Motivate,
            _ => ActivityKind::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityKind::Quiz => "quiz",
            ActivityKind::Review => "review",
            ActivityKind::Takeaway => "takeaway",
            ActivityKind::Simplify => "simplify",
            ActivityKind::Study => "study",
            ActivityKind::Motivate => "motivate",
            ActivityKind::Other => "other",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_order_puts_dependents_last() {
        let order = EntityType::SYNC_ORDER;
        let pos = |t: EntityType| order.iter().position(|&e| e == t).unwrap();
        assert!(pos(EntityType::User) < pos(EntityType::Conversation));
        assert!(pos(EntityType::Course) < pos(EntityType::Conversation));
        assert!(pos(EntityType::Assignment) < pos(EntityType::Conversation));
        assert!(pos(EntityType::ConversationStarter) < pos(EntityType::Conversation));
        assert!(pos(EntityType::Conversation) < pos(EntityType::Message));
    }

    #[test]
    fn entity_type_round_trip() {
        for t in EntityType::SYNC_ORDER {
            assert_eq!(EntityType::parse(t.as_str()), Some(t));
        }
        assert_eq!(EntityType::parse("bogus"), None);
    }

    #[test]
    fn entity_type_serde_snake_case() {
        let json = serde_json::to_string(&EntityType::ConversationStarter).unwrap();
        assert_eq!(json, "\"conversation_starter\"");
        let back: EntityType = serde_json::from_str(&json).unwrap();
        assert_eq!(back, EntityType::ConversationStarter);
    }

    #[test]
    fn message_role_parse() {
        assert_eq!(MessageRole::parse("user"), MessageRole::User);
        assert_eq!(MessageRole::parse("assistant"), MessageRole::Assistant);
        assert_eq!(MessageRole::parse("system"), MessageRole::Other);
        assert_eq!(MessageRole::parse(""), MessageRole::Other);
    }

    #[test]
    fn activity_from_title() {
        assert_eq!(ActivityKind::from_title("Quiz Me"), ActivityKind::Quiz);
        assert_eq!(ActivityKind::from_title("Review Terms"), ActivityKind::Review);
        assert_eq!(
            ActivityKind::from_title("Key Takeaways"),
            ActivityKind::Takeaway
        );
        assert_eq!(
            ActivityKind::from_title("Simplify a Concept"),
            ActivityKind::Simplify
        );
        assert_eq!(ActivityKind::from_title("Study Hacks"), ActivityKind::Study);
        assert_eq!(
            ActivityKind::from_title("Motivate Me"),
            ActivityKind::Motivate
        );
        assert_eq!(
            ActivityKind::from_title("Something Else"),
            ActivityKind::Other
        );
    }

    #[test]
    fn activity_round_trip() {
        for kind in [
            ActivityKind::Quiz,
            ActivityKind::Review,
            ActivityKind::Takeaway,
            ActivityKind::Simplify,
            ActivityKind::Study,
            ActivityKind::Motivate,
            ActivityKind::Other,
        ] {
            assert_eq!(ActivityKind::parse(kind.as_str()), kind);
        }
    }
}
