use async_trait::async_trait;

use crate::error::Result;
use crate::models::{
    assignment::Assignment,
    common::{ActivityKind, EntityType},
    conversation::Conversation,
    conversation_starter::ConversationStarter,
    course::Course,
    message::Message,
    sync::{SyncState, UpsertResult},
    user::User,
};

/// Upsert methods take a whole batch and apply each record independently:
/// a single bad record is logged and counted in [`UpsertResult::failed`]
/// without aborting the rest of the batch.
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn upsert_users(&self, users: &[User]) -> Result<UpsertResult>;
    async fn get_user(&self, id: &str) -> Result<Option<User>>;
    async fn count_users(&self) -> Result<i64>;
}

#[async_trait]
pub trait CourseRepository: Send + Sync {
    async fn upsert_courses(&self, courses: &[Course]) -> Result<UpsertResult>;
    async fn get_course(&self, id: &str) -> Result<Option<Course>>;
    async fn count_courses(&self) -> Result<i64>;
}

#[async_trait]
pub trait AssignmentRepository: Send + Sync {
    async fn upsert_assignments(&self, assignments: &[Assignment]) -> Result<UpsertResult>;
    async fn get_assignment(&self, id: &str) -> Result<Option<Assignment>>;
    async fn count_assignments(&self) -> Result<i64>;
}

#[async_trait]
pub trait StarterRepository: Send + Sync {
    async fn upsert_starters(&self, starters: &[ConversationStarter]) -> Result<UpsertResult>;
    async fn get_starter(&self, id: &str) -> Result<Option<ConversationStarter>>;
    async fn count_starters(&self) -> Result<i64>;
}

#[async_trait]
pub trait ConversationRepository: Send + Sync {
    async fn upsert_conversations(&self, conversations: &[Conversation]) -> Result<UpsertResult>;
    async fn get_conversation(&self, id: &str) -> Result<Option<Conversation>>;
    async fn count_conversations(&self) -> Result<i64>;
    async fn list_recent_conversations(&self, limit: i64) -> Result<Vec<Conversation>>;
    /// (course_id, course_name, conversation count) grouped by course.
    async fn conversations_by_course(&self) -> Result<Vec<(String, Option<String>, i64)>>;
    /// (day "YYYY-MM-DD", conversation count) for the last `days` days.
    async fn conversations_by_day(&self, days: i64) -> Result<Vec<(String, i64)>>;
    /// (starter activity, conversation count) grouped by activity kind.
    async fn conversations_by_activity(&self) -> Result<Vec<(ActivityKind, i64)>>;
}

#[async_trait]
pub trait MessageRepository: Send + Sync {
    async fn upsert_messages(&self, messages: &[Message]) -> Result<UpsertResult>;
    async fn get_message(&self, id: &str) -> Result<Option<Message>>;
    async fn count_messages(&self) -> Result<i64>;
    /// Messages authored by learners (not the assistant).
    async fn count_user_messages(&self) -> Result<i64>;
}

/// Cursor persistence for the sync engine. `set_sync_state` writes the whole
/// row (insert-or-replace) so a crash between batches loses at most one
/// batch of progress.
#[async_trait]
pub trait SyncStateRepository: Send + Sync {
    async fn get_sync_state(&self, entity_type: EntityType) -> Result<Option<SyncState>>;
    async fn set_sync_state(&self, state: &SyncState) -> Result<()>;
    async fn list_sync_states(&self) -> Result<Vec<SyncState>>;
}

/// Combined repository trait for all entity types.
pub trait SlateRepository:
    UserRepository
    + CourseRepository
    + AssignmentRepository
    + StarterRepository
    + ConversationRepository
    + MessageRepository
    + SyncStateRepository
{
}
