use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::debug;

use crate::db::repository::SlateRepository;
use crate::error::Result;
use crate::models::{
    assignment::Assignment,
    common::{ActivityKind, EntityType, MessageRole},
    conversation::Conversation,
    conversation_starter::ConversationStarter,
    course::Course,
    message::Message,
    user::User,
};

/// A batch of raw records mapped into the local shapes for one entity type.
#[derive(Debug, Clone)]
pub enum MappedBatch {
    Users(Vec<User>),
    Courses(Vec<Course>),
    Assignments(Vec<Assignment>),
    Starters(Vec<ConversationStarter>),
    Conversations(Vec<Conversation>),
    Messages(Vec<Message>),
}

impl MappedBatch {
    pub fn len(&self) -> usize {
        match self {
            MappedBatch::Users(v) => v.len(),
            MappedBatch::Courses(v) => v.len(),
            MappedBatch::Assignments(v) => v.len(),
            MappedBatch::Starters(v) => v.len(),
            MappedBatch::Conversations(v) => v.len(),
            MappedBatch::Messages(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Result of mapping one fetched page: the usable records plus how many raw
/// records were dropped for lacking an external id.
#[derive(Debug, Clone)]
pub struct MappedRecords {
    pub batch: MappedBatch,
    pub dropped: u64,
}

/// Normalizes raw platform records into local storage shapes.
///
/// Mapping is a pure function of the input record: missing optional fields
/// default, display names fall through documented priority chains, and a
/// record is dropped only when its `_id` is absent.
pub struct EntityMapper;

impl EntityMapper {
    pub fn map_batch(entity_type: EntityType, records: &[Value], now: DateTime<Utc>) -> MappedRecords {
        let total = records.len() as u64;
        let batch = match entity_type {
            EntityType::User => {
                MappedBatch::Users(records.iter().filter_map(|r| Self::map_user(r, now)).collect())
            }
            EntityType::Course => MappedBatch::Courses(
                records.iter().filter_map(|r| Self::map_course(r, now)).collect(),
            ),
            EntityType::Assignment => MappedBatch::Assignments(
                records.iter().filter_map(|r| Self::map_assignment(r, now)).collect(),
            ),
            EntityType::ConversationStarter => MappedBatch::Starters(
                records.iter().filter_map(|r| Self::map_starter(r, now)).collect(),
            ),
            EntityType::Conversation => MappedBatch::Conversations(
                records.iter().filter_map(|r| Self::map_conversation(r, now)).collect(),
            ),
            EntityType::Message => MappedBatch::Messages(
                records.iter().filter_map(|r| Self::map_message(r, now)).collect(),
            ),
        };
        MappedRecords {
            dropped: total - batch.len() as u64,
            batch,
        }
    }

    pub fn map_user(record: &Value, now: DateTime<Utc>) -> Option<User> {
        let id = record_id(record)?;
        Some(User {
            id,
            email: extract_email(record),
            signed_up: bool_field(record, "user_signed_up"),
            role: str_field(record, "role_option_roles"),
            opted_out: bool_field(record, "is_company_opted_out_boolean"),
            created_at: date_field(record, "Created Date"),
            modified_at: date_field(record, "Modified Date"),
            raw: Some(record.clone()),
            last_synced_at: now,
        })
    }

    pub fn map_course(record: &Value, now: DateTime<Utc>) -> Option<Course> {
        let id = record_id(record)?;
        Some(Course {
            id,
            name: str_field(record, "name"),
            name_text: str_field(record, "name_text"),
            title: str_field(record, "title"),
            created_at: date_field(record, "Created Date"),
            modified_at: date_field(record, "Modified Date"),
            raw: Some(record.clone()),
            last_synced_at: now,
        })
    }

    pub fn map_assignment(record: &Value, now: DateTime<Utc>) -> Option<Assignment> {
        let id = record_id(record)?;
        Some(Assignment {
            id,
            name: str_field(record, "name"),
            name_text: str_field(record, "name_text"),
            assignment_name: str_field(record, "assignment_name"),
            assignment_name_text: str_field(record, "assignment_name_text"),
            title: str_field(record, "title"),
            course_id: str_field(record, "course"),
            created_at: date_field(record, "Created Date"),
            modified_at: date_field(record, "Modified Date"),
            raw: Some(record.clone()),
            last_synced_at: now,
        })
    }

    pub fn map_starter(record: &Value, now: DateTime<Utc>) -> Option<ConversationStarter> {
        let id = record_id(record)?;
        let activity = str_field(record, "title_text")
            .map(|title| ActivityKind::from_title(&title))
            .unwrap_or(ActivityKind::Other);
        Some(ConversationStarter {
            id,
            name: str_field(record, "name").or_else(|| str_field(record, "name_text")),
            name_text: str_field(record, "name_text"),
            activity,
            created_at: date_field(record, "Created Date"),
            modified_at: date_field(record, "Modified Date"),
            raw: Some(record.clone()),
            last_synced_at: now,
        })
    }

    pub fn map_conversation(record: &Value, now: DateTime<Utc>) -> Option<Conversation> {
        let id = record_id(record)?;
        Some(Conversation {
            id,
            user_id: str_field(record, "user"),
            user_email: None,
            course_id: str_field(record, "course"),
            course_name: None,
            assignment_id: str_field(record, "assignment"),
            assignment_name: None,
            starter_id: str_field(record, "conversation_starter"),
            starter_name: None,
            message_count: record
                .get("message_count")
                .and_then(Value::as_i64)
                .unwrap_or(0),
            created_at: date_field(record, "Created Date"),
            modified_at: date_field(record, "Modified Date"),
            raw: Some(record.clone()),
            last_synced_at: now,
        })
    }

    pub fn map_message(record: &Value, now: DateTime<Utc>) -> Option<Message> {
        let id = record_id(record)?;
        let role = str_field(record, "role")
            .or_else(|| str_field(record, "role_option_message_role"))
            .map(|r| MessageRole::parse(&r))
            .unwrap_or(MessageRole::Other);
        Some(Message {
            id,
            conversation_id: str_field(record, "conversation"),
            role,
            text: str_field(record, "text"),
            created_at: date_field(record, "Created Date"),
            modified_at: date_field(record, "Modified Date"),
            raw: Some(record.clone()),
            last_synced_at: now,
        })
    }
}

/// Fill a conversation batch's denormalized columns from already-synced
/// rows. Lookups are read-only; a reference to a row that has not been
/// synced yet is left unresolved for a later pass.
pub async fn resolve_conversation_refs<R: SlateRepository>(
    repo: &R,
    conversations: &mut [Conversation],
) -> Result<()> {
    for conv in conversations.iter_mut() {
        if let Some(user_id) = conv.user_id.clone() {
            match repo.get_user(&user_id).await? {
                Some(user) => conv.user_email = user.email,
                None => debug!(conversation = %conv.id, user = %user_id, "user not yet synced"),
            }
        }
        if let Some(course_id) = conv.course_id.clone() {
            match repo.get_course(&course_id).await? {
                Some(course) => conv.course_name = Some(course.display_name()),
                None => debug!(conversation = %conv.id, course = %course_id, "course not yet synced"),
            }
        }
        if let Some(assignment_id) = conv.assignment_id.clone() {
            match repo.get_assignment(&assignment_id).await? {
                Some(assignment) => conv.assignment_name = Some(assignment.display_name()),
                None => {
                    debug!(conversation = %conv.id, assignment = %assignment_id, "assignment not yet synced")
                }
            }
        }
        if let Some(starter_id) = conv.starter_id.clone() {
            match repo.get_starter(&starter_id).await? {
                Some(starter) => conv.starter_name = starter.display_name().map(str::to_string),
                None => debug!(conversation = %conv.id, starter = %starter_id, "starter not yet synced"),
            }
        }
    }
    Ok(())
}

fn record_id(record: &Value) -> Option<String> {
    record
        .get("_id")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn str_field(record: &Value, key: &str) -> Option<String> {
    record.get(key).and_then(Value::as_str).map(str::to_string)
}

fn bool_field(record: &Value, key: &str) -> bool {
    record.get(key).and_then(Value::as_bool).unwrap_or(false)
}

fn date_field(record: &Value, key: &str) -> Option<DateTime<Utc>> {
    record.get(key).and_then(Value::as_str).and_then(|s| {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
    })
}

/// Pull the account email out of the platform's nested authentication
/// blob. Native accounts carry it under `authentication.email.email`,
/// SSO accounts under `authentication."API - AWS Cognito".email`, and a
/// few records expose a flat `email` field.
fn extract_email(record: &Value) -> Option<String> {
    let auth = record.get("authentication");
    if let Some(email) = auth
        .and_then(|a| a.get("email"))
        .and_then(|e| e.get("email"))
        .and_then(Value::as_str)
    {
        return Some(email.to_string());
    }
    if let Some(email) = auth
        .and_then(|a| a.get("API - AWS Cognito"))
        .and_then(|e| e.get("email"))
        .and_then(Value::as_str)
    {
        return Some(email.to_string());
    }
    str_field(record, "email")
}
