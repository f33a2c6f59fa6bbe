use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::{Row, SqlitePool};
use tracing::warn;

use crate::error::Result;
use crate::models::{
    assignment::Assignment,
    common::{ActivityKind, EntityType, MessageRole},
    conversation::Conversation,
    conversation_starter::ConversationStarter,
    course::Course,
    message::Message,
    sync::{EntityStatus, SyncState, UpsertResult},
    user::User,
};

use super::repository::{
    AssignmentRepository, ConversationRepository, CourseRepository, MessageRepository,
    SlateRepository, StarterRepository, SyncStateRepository, UserRepository,
};

#[derive(Clone)]
pub struct SqliteRepository {
    pool: SqlitePool,
}

impl SqliteRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Returns true when the row did not exist before (insert vs update).
    async fn row_exists(&self, table: &str, id: &str) -> Result<bool> {
        let query = format!("SELECT 1 FROM {table} WHERE id = ?1");
        let row = sqlx::query(&query).bind(id).fetch_optional(&self.pool).await?;
        Ok(row.is_some())
    }
}

impl SlateRepository for SqliteRepository {}

// -- Helper functions for column conversions --

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn parse_datetime_opt(s: Option<String>) -> Option<DateTime<Utc>> {
    s.and_then(|v| {
        DateTime::parse_from_rfc3339(&v)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
    })
}

fn datetime_to_str(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn datetime_opt_to_str(dt: &Option<DateTime<Utc>>) -> Option<String> {
    dt.as_ref().map(datetime_to_str)
}

fn parse_raw(s: Option<String>) -> Option<serde_json::Value> {
    s.and_then(|v| serde_json::from_str(&v).ok())
}

fn raw_to_str(v: &Option<serde_json::Value>) -> Option<String> {
    v.as_ref().map(|val| val.to_string())
}

// -- Row mapping --

fn row_to_user(r: &sqlx::sqlite::SqliteRow) -> User {
    User {
        id: r.get("id"),
        email: r.get("email"),
        signed_up: r.get("signed_up"),
        role: r.get("role"),
        opted_out: r.get("opted_out"),
        created_at: parse_datetime_opt(r.get("created_at")),
        modified_at: parse_datetime_opt(r.get("modified_at")),
        raw: parse_raw(r.get("raw_data")),
        last_synced_at: parse_datetime(r.get("last_synced_at")),
    }
}

fn row_to_course(r: &sqlx::sqlite::SqliteRow) -> Course {
    Course {
        id: r.get("id"),
        name: r.get("name"),
        name_text: r.get("name_text"),
        title: r.get("title"),
        created_at: parse_datetime_opt(r.get("created_at")),
        modified_at: parse_datetime_opt(r.get("modified_at")),
        raw: parse_raw(r.get("raw_data")),
        last_synced_at: parse_datetime(r.get("last_synced_at")),
    }
}

fn row_to_assignment(r: &sqlx::sqlite::SqliteRow) -> Assignment {
    Assignment {
        id: r.get("id"),
        name: r.get("name"),
        name_text: r.get("name_text"),
        assignment_name: r.get("assignment_name"),
        assignment_name_text: r.get("assignment_name_text"),
        title: r.get("title"),
        course_id: r.get("course_id"),
        created_at: parse_datetime_opt(r.get("created_at")),
        modified_at: parse_datetime_opt(r.get("modified_at")),
        raw: parse_raw(r.get("raw_data")),
        last_synced_at: parse_datetime(r.get("last_synced_at")),
    }
}

fn row_to_starter(r: &sqlx::sqlite::SqliteRow) -> ConversationStarter {
    ConversationStarter {
        id: r.get("id"),
        name: r.get("name"),
        name_text: r.get("name_text"),
        activity: ActivityKind::parse(r.get("activity")),
        created_at: parse_datetime_opt(r.get("created_at")),
        modified_at: parse_datetime_opt(r.get("modified_at")),
        raw: parse_raw(r.get("raw_data")),
        last_synced_at: parse_datetime(r.get("last_synced_at")),
    }
}

fn row_to_conversation(r: &sqlx::sqlite::SqliteRow) -> Conversation {
    Conversation {
        id: r.get("id"),
        user_id: r.get("user_id"),
        user_email: r.get("user_email"),
        course_id: r.get("course_id"),
        course_name: r.get("course_name"),
        assignment_id: r.get("assignment_id"),
        assignment_name: r.get("assignment_name"),
        starter_id: r.get("starter_id"),
        starter_name: r.get("starter_name"),
        message_count: r.get("message_count"),
        created_at: parse_datetime_opt(r.get("created_at")),
        modified_at: parse_datetime_opt(r.get("modified_at")),
        raw: parse_raw(r.get("raw_data")),
        last_synced_at: parse_datetime(r.get("last_synced_at")),
    }
}

fn row_to_message(r: &sqlx::sqlite::SqliteRow) -> Message {
    Message {
        id: r.get("id"),
        conversation_id: r.get("conversation_id"),
        role: MessageRole::parse(r.get("role")),
        text: r.get("text"),
        created_at: parse_datetime_opt(r.get("created_at")),
        modified_at: parse_datetime_opt(r.get("modified_at")),
        raw: parse_raw(r.get("raw_data")),
        last_synced_at: parse_datetime(r.get("last_synced_at")),
    }
}

// -- UserRepository --

impl SqliteRepository {
    async fn upsert_user_row(&self, user: &User) -> Result<bool> {
        let existed = self.row_exists("users", &user.id).await?;
        sqlx::query(
            "INSERT OR REPLACE INTO users (id, email, signed_up, role, opted_out, created_at, modified_at, raw_data, last_synced_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )
        .bind(&user.id)
        .bind(&user.email)
        .bind(user.signed_up)
        .bind(&user.role)
        .bind(user.opted_out)
        .bind(datetime_opt_to_str(&user.created_at))
        .bind(datetime_opt_to_str(&user.modified_at))
        .bind(raw_to_str(&user.raw))
        .bind(datetime_to_str(&user.last_synced_at))
        .execute(&self.pool)
        .await?;
        Ok(!existed)
    }
}

#[async_trait]
impl UserRepository for SqliteRepository {
    async fn upsert_users(&self, users: &[User]) -> Result<UpsertResult> {
        let mut result = UpsertResult::default();
        for user in users {
            match self.upsert_user_row(user).await {
                Ok(true) => result.inserted += 1,
                Ok(false) => result.updated += 1,
                Err(e) => {
                    warn!(id = %user.id, error = %e, "failed to upsert user");
                    result.failed += 1;
                }
            }
        }
        Ok(result)
    }

    async fn get_user(&self, id: &str) -> Result<Option<User>> {
        let row = sqlx::query("SELECT * FROM users WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(row_to_user))
    }

    async fn count_users(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM users")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("n"))
    }
}

// -- CourseRepository --

impl SqliteRepository {
    async fn upsert_course_row(&self, course: &Course) -> Result<bool> {
        let existed = self.row_exists("courses", &course.id).await?;
        sqlx::query(
            "INSERT OR REPLACE INTO courses (id, name, name_text, title, created_at, modified_at, raw_data, last_synced_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )
        .bind(&course.id)
        .bind(&course.name)
        .bind(&course.name_text)
        .bind(&course.title)
        .bind(datetime_opt_to_str(&course.created_at))
        .bind(datetime_opt_to_str(&course.modified_at))
        .bind(raw_to_str(&course.raw))
        .bind(datetime_to_str(&course.last_synced_at))
        .execute(&self.pool)
        .await?;
        Ok(!existed)
    }
}

#[async_trait]
impl CourseRepository for SqliteRepository {
    async fn upsert_courses(&self, courses: &[Course]) -> Result<UpsertResult> {
        let mut result = UpsertResult::default();
        for course in courses {
            match self.upsert_course_row(course).await {
                Ok(true) => result.inserted += 1,
                Ok(false) => result.updated += 1,
                Err(e) => {
                    warn!(id = %course.id, error = %e, "failed to upsert course");
                    result.failed += 1;
                }
            }
        }
        Ok(result)
    }

    async fn get_course(&self, id: &str) -> Result<Option<Course>> {
        let row = sqlx::query("SELECT * FROM courses WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(row_to_course))
    }

    async fn count_courses(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM courses")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("n"))
    }
}

// -- AssignmentRepository --

impl SqliteRepository {
    async fn upsert_assignment_row(&self, assignment: &Assignment) -> Result<bool> {
        let existed = self.row_exists("assignments", &assignment.id).await?;
        sqlx::query(
            "INSERT OR REPLACE INTO assignments (id, name, name_text, assignment_name, assignment_name_text, title, course_id, created_at, modified_at, raw_data, last_synced_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        )
        .bind(&assignment.id)
        .bind(&assignment.name)
        .bind(&assignment.name_text)
        .bind(&assignment.assignment_name)
        .bind(&assignment.assignment_name_text)
        .bind(&assignment.title)
        .bind(&assignment.course_id)
        .bind(datetime_opt_to_str(&assignment.created_at))
        .bind(datetime_opt_to_str(&assignment.modified_at))
        .bind(raw_to_str(&assignment.raw))
        .bind(datetime_to_str(&assignment.last_synced_at))
        .execute(&self.pool)
        .await?;
        Ok(!existed)
    }
}

#[async_trait]
impl AssignmentRepository for SqliteRepository {
    async fn upsert_assignments(&self, assignments: &[Assignment]) -> Result<UpsertResult> {
        let mut result = UpsertResult::default();
        for assignment in assignments {
            match self.upsert_assignment_row(assignment).await {
                Ok(true) => result.inserted += 1,
                Ok(false) => result.updated += 1,
                Err(e) => {
                    warn!(id = %assignment.id, error = %e, "failed to upsert assignment");
                    result.failed += 1;
                }
            }
        }
        Ok(result)
    }

    async fn get_assignment(&self, id: &str) -> Result<Option<Assignment>> {
        let row = sqlx::query("SELECT * FROM assignments WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(row_to_assignment))
    }

    async fn count_assignments(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM assignments")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("n"))
    }
}

// -- StarterRepository --

impl SqliteRepository {
    async fn upsert_starter_row(&self, starter: &ConversationStarter) -> Result<bool> {
        let existed = self.row_exists("conversation_starters", &starter.id).await?;
        sqlx::query(
            "INSERT OR REPLACE INTO conversation_starters (id, name, name_text, activity, created_at, modified_at, raw_data, last_synced_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )
        .bind(&starter.id)
        .bind(&starter.name)
        .bind(&starter.name_text)
        .bind(starter.activity.as_str())
        .bind(datetime_opt_to_str(&starter.created_at))
        .bind(datetime_opt_to_str(&starter.modified_at))
        .bind(raw_to_str(&starter.raw))
        .bind(datetime_to_str(&starter.last_synced_at))
        .execute(&self.pool)
        .await?;
        Ok(!existed)
    }
}

#[async_trait]
impl StarterRepository for SqliteRepository {
    async fn upsert_starters(&self, starters: &[ConversationStarter]) -> Result<UpsertResult> {
        let mut result = UpsertResult::default();
        for starter in starters {
            match self.upsert_starter_row(starter).await {
                Ok(true) => result.inserted += 1,
                Ok(false) => result.updated += 1,
                Err(e) => {
                    warn!(id = %starter.id, error = %e, "failed to upsert conversation starter");
                    result.failed += 1;
                }
            }
        }
        Ok(result)
    }

    async fn get_starter(&self, id: &str) -> Result<Option<ConversationStarter>> {
        let row = sqlx::query("SELECT * FROM conversation_starters WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(row_to_starter))
    }

    async fn count_starters(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM conversation_starters")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("n"))
    }
}

// -- ConversationRepository --

impl SqliteRepository {
    async fn upsert_conversation_row(&self, conv: &Conversation) -> Result<bool> {
        let existed = self.row_exists("conversations", &conv.id).await?;
        sqlx::query(
            "INSERT OR REPLACE INTO conversations (id, user_id, user_email, course_id, course_name, assignment_id, assignment_name, starter_id, starter_name, message_count, created_at, modified_at, raw_data, last_synced_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        )
        .bind(&conv.id)
        .bind(&conv.user_id)
        .bind(&conv.user_email)
        .bind(&conv.course_id)
        .bind(&conv.course_name)
        .bind(&conv.assignment_id)
        .bind(&conv.assignment_name)
        .bind(&conv.starter_id)
        .bind(&conv.starter_name)
        .bind(conv.message_count)
        .bind(datetime_opt_to_str(&conv.created_at))
        .bind(datetime_opt_to_str(&conv.modified_at))
        .bind(raw_to_str(&conv.raw))
        .bind(datetime_to_str(&conv.last_synced_at))
        .execute(&self.pool)
        .await?;
        Ok(!existed)
    }
}

#[async_trait]
impl ConversationRepository for SqliteRepository {
    async fn upsert_conversations(&self, conversations: &[Conversation]) -> Result<UpsertResult> {
        let mut result = UpsertResult::default();
        for conv in conversations {
            match self.upsert_conversation_row(conv).await {
                Ok(true) => result.inserted += 1,
                Ok(false) => result.updated += 1,
                Err(e) => {
                    warn!(id = %conv.id, error = %e, "failed to upsert conversation");
                    result.failed += 1;
                }
            }
        }
        Ok(result)
    }

    async fn get_conversation(&self, id: &str) -> Result<Option<Conversation>> {
        let row = sqlx::query("SELECT * FROM conversations WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(row_to_conversation))
    }

    async fn count_conversations(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM conversations")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("n"))
    }

    async fn list_recent_conversations(&self, limit: i64) -> Result<Vec<Conversation>> {
        let rows = sqlx::query(
            "SELECT * FROM conversations ORDER BY created_at DESC LIMIT ?1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_conversation).collect())
    }

    async fn conversations_by_course(&self) -> Result<Vec<(String, Option<String>, i64)>> {
        let rows = sqlx::query(
            "SELECT course_id, course_name, COUNT(*) AS n FROM conversations
             WHERE course_id IS NOT NULL
             GROUP BY course_id, course_name
             ORDER BY n DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|r| (r.get("course_id"), r.get("course_name"), r.get("n")))
            .collect())
    }

    async fn conversations_by_day(&self, days: i64) -> Result<Vec<(String, i64)>> {
        // RFC 3339 timestamps in UTC sort lexicographically, so a string
        // cutoff is enough.
        let cutoff = datetime_to_str(&(Utc::now() - Duration::days(days)));
        let rows = sqlx::query(
            "SELECT substr(created_at, 1, 10) AS day, COUNT(*) AS n FROM conversations
             WHERE created_at IS NOT NULL AND created_at >= ?1
             GROUP BY day
             ORDER BY day",
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(|r| (r.get("day"), r.get("n"))).collect())
    }

    async fn conversations_by_activity(&self) -> Result<Vec<(ActivityKind, i64)>> {
        let rows = sqlx::query(
            "SELECT s.activity AS activity, COUNT(*) AS n FROM conversations c
             JOIN conversation_starters s ON c.starter_id = s.id
             GROUP BY s.activity
             ORDER BY n DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|r| (ActivityKind::parse(r.get("activity")), r.get("n")))
            .collect())
    }
}

// -- MessageRepository --

impl SqliteRepository {
    async fn upsert_message_row(&self, msg: &Message) -> Result<bool> {
        let existed = self.row_exists("messages", &msg.id).await?;
        sqlx::query(
            "INSERT OR REPLACE INTO messages (id, conversation_id, role, text, created_at, modified_at, raw_data, last_synced_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )
        .bind(&msg.id)
        .bind(&msg.conversation_id)
        .bind(msg.role.as_str())
        .bind(&msg.text)
        .bind(datetime_opt_to_str(&msg.created_at))
        .bind(datetime_opt_to_str(&msg.modified_at))
        .bind(raw_to_str(&msg.raw))
        .bind(datetime_to_str(&msg.last_synced_at))
        .execute(&self.pool)
        .await?;
        Ok(!existed)
    }
}

#[async_trait]
impl MessageRepository for SqliteRepository {
    async fn upsert_messages(&self, messages: &[Message]) -> Result<UpsertResult> {
        let mut result = UpsertResult::default();
        for msg in messages {
            match self.upsert_message_row(msg).await {
                Ok(true) => result.inserted += 1,
                Ok(false) => result.updated += 1,
                Err(e) => {
                    warn!(id = %msg.id, error = %e, "failed to upsert message");
                    result.failed += 1;
                }
            }
        }
        Ok(result)
    }

    async fn get_message(&self, id: &str) -> Result<Option<Message>> {
        let row = sqlx::query("SELECT * FROM messages WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(row_to_message))
    }

    async fn count_messages(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM messages")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("n"))
    }

    async fn count_user_messages(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM messages WHERE role = 'user'")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("n"))
    }
}

// -- SyncStateRepository --

fn row_to_sync_state(r: &sqlx::sqlite::SqliteRow) -> Option<SyncState> {
    let entity_type = EntityType::parse(r.get("entity_type"))?;
    Some(SyncState {
        entity_type,
        last_synced_at: parse_datetime_opt(r.get("last_synced_at")),
        last_modified_seen: parse_datetime_opt(r.get("last_modified_seen")),
        last_offset: r.get("last_offset"),
        total_records: r.get("total_records"),
        status: EntityStatus::parse(r.get("status")),
        last_error: r.get("last_error"),
        updated_at: parse_datetime(r.get("updated_at")),
    })
}

#[async_trait]
impl SyncStateRepository for SqliteRepository {
    async fn get_sync_state(&self, entity_type: EntityType) -> Result<Option<SyncState>> {
        let row = sqlx::query("SELECT * FROM sync_status WHERE entity_type = ?1")
            .bind(entity_type.as_str())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().and_then(row_to_sync_state))
    }

    async fn set_sync_state(&self, state: &SyncState) -> Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO sync_status (entity_type, last_synced_at, last_modified_seen, last_offset, total_records, status, last_error, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )
        .bind(state.entity_type.as_str())
        .bind(datetime_opt_to_str(&state.last_synced_at))
        .bind(datetime_opt_to_str(&state.last_modified_seen))
        .bind(state.last_offset)
        .bind(state.total_records)
        .bind(state.status.as_str())
        .bind(&state.last_error)
        .bind(datetime_to_str(&state.updated_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_sync_states(&self) -> Result<Vec<SyncState>> {
        let rows = sqlx::query("SELECT * FROM sync_status ORDER BY entity_type")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().filter_map(row_to_sync_state).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DatabasePool;
    use chrono::TimeZone;

    async fn setup_repo() -> SqliteRepository {
        let pool = DatabasePool::new_sqlite_memory().await.unwrap();
        match pool {
            DatabasePool::Sqlite(p) => SqliteRepository::new(p),
        }
    }

    fn ts(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, h, 0, 0).unwrap()
    }

    fn sample_user(id: &str) -> User {
        User {
            id: id.to_string(),
            email: Some(format!("{id}@example.com")),
            signed_up: true,
            role: Some("student".to_string()),
            opted_out: false,
            created_at: Some(ts(8)),
            modified_at: Some(ts(9)),
            raw: Some(serde_json::json!({"_id": id})),
            last_synced_at: ts(10),
        }
    }

    fn sample_course(id: &str, name: &str) -> Course {
        Course {
            id: id.to_string(),
            name: Some(name.to_string()),
            name_text: None,
            title: None,
            created_at: Some(ts(8)),
            modified_at: None,
            raw: None,
            last_synced_at: ts(10),
        }
    }

    fn sample_starter(id: &str, activity: ActivityKind) -> ConversationStarter {
        ConversationStarter {
            id: id.to_string(),
            name: Some("Quiz Me".to_string()),
            name_text: None,
            activity,
            created_at: None,
            modified_at: None,
            raw: None,
            last_synced_at: ts(10),
        }
    }

    fn sample_conversation(id: &str, course: Option<&str>, hour: u32) -> Conversation {
        Conversation {
            id: id.to_string(),
            user_id: Some("u1".to_string()),
            user_email: None,
            course_id: course.map(str::to_string),
            course_name: course.map(|c| format!("Course {c}")),
            assignment_id: None,
            assignment_name: None,
            starter_id: Some("s1".to_string()),
            starter_name: None,
            message_count: 4,
            created_at: Some(ts(hour)),
            modified_at: None,
            raw: None,
            last_synced_at: ts(10),
        }
    }

    fn sample_message(id: &str, role: MessageRole) -> Message {
        Message {
            id: id.to_string(),
            conversation_id: Some("conv-1".to_string()),
            role,
            text: Some("hello".to_string()),
            created_at: Some(ts(9)),
            modified_at: None,
            raw: None,
            last_synced_at: ts(10),
        }
    }

    #[tokio::test]
    async fn upsert_user_is_idempotent() {
        let repo = setup_repo().await;
        let user = sample_user("u1");

        let first = repo.upsert_users(std::slice::from_ref(&user)).await.unwrap();
        assert_eq!(first.inserted, 1);
        assert_eq!(first.updated, 0);

        let mut changed = user.clone();
        changed.email = Some("new@example.com".to_string());
        let second = repo.upsert_users(std::slice::from_ref(&changed)).await.unwrap();
        assert_eq!(second.inserted, 0);
        assert_eq!(second.updated, 1);

        assert_eq!(repo.count_users().await.unwrap(), 1);
        let stored = repo.get_user("u1").await.unwrap().unwrap();
        assert_eq!(stored.email.as_deref(), Some("new@example.com"));
    }

    #[tokio::test]
    async fn upsert_batch_counts_each_record() {
        let repo = setup_repo().await;
        let batch = vec![sample_user("u1"), sample_user("u2"), sample_user("u3")];
        let result = repo.upsert_users(&batch).await.unwrap();
        assert_eq!(result.inserted, 3);
        assert_eq!(result.failed, 0);
        assert_eq!(repo.count_users().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn course_round_trips_through_storage() {
        let repo = setup_repo().await;
        let course = sample_course("c1", "Risk Management 101");
        repo.upsert_courses(std::slice::from_ref(&course)).await.unwrap();
        let stored = repo.get_course("c1").await.unwrap().unwrap();
        assert_eq!(stored, course);
    }

    #[tokio::test]
    async fn assignment_preserves_name_fields() {
        let repo = setup_repo().await;
        let assignment = Assignment {
            id: "a1".to_string(),
            name: Some("n".to_string()),
            name_text: Some("nt".to_string()),
            assignment_name: Some("an".to_string()),
            assignment_name_text: Some("ant".to_string()),
            title: Some("t".to_string()),
            course_id: Some("c1".to_string()),
            created_at: None,
            modified_at: None,
            raw: None,
            last_synced_at: ts(10),
        };
        repo.upsert_assignments(std::slice::from_ref(&assignment))
            .await
            .unwrap();
        let stored = repo.get_assignment("a1").await.unwrap().unwrap();
        assert_eq!(stored.display_name(), "ant");
        assert_eq!(stored.course_id.as_deref(), Some("c1"));
    }

    #[tokio::test]
    async fn starter_activity_round_trips() {
        let repo = setup_repo().await;
        let starter = sample_starter("s1", ActivityKind::Quiz);
        repo.upsert_starters(std::slice::from_ref(&starter)).await.unwrap();
        let stored = repo.get_starter("s1").await.unwrap().unwrap();
        assert_eq!(stored.activity, ActivityKind::Quiz);
    }

    #[tokio::test]
    async fn recent_conversations_ordered_newest_first() {
        let repo = setup_repo().await;
        let convs = vec![
            sample_conversation("conv-1", Some("c1"), 8),
            sample_conversation("conv-2", Some("c1"), 12),
            sample_conversation("conv-3", Some("c2"), 10),
        ];
        repo.upsert_conversations(&convs).await.unwrap();

        let recent = repo.list_recent_conversations(2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].id, "conv-2");
        assert_eq!(recent[1].id, "conv-3");
    }

    #[tokio::test]
    async fn conversations_grouped_by_course() {
        let repo = setup_repo().await;
        let convs = vec![
            sample_conversation("conv-1", Some("c1"), 8),
            sample_conversation("conv-2", Some("c1"), 9),
            sample_conversation("conv-3", Some("c2"), 10),
            sample_conversation("conv-4", None, 11),
        ];
        repo.upsert_conversations(&convs).await.unwrap();

        let groups = repo.conversations_by_course().await.unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, "c1");
        assert_eq!(groups[0].2, 2);
        assert_eq!(groups[1].0, "c2");
        assert_eq!(groups[1].2, 1);
    }

    #[tokio::test]
    async fn conversations_grouped_by_day_respects_cutoff() {
        let repo = setup_repo().await;
        let mut old = sample_conversation("conv-old", None, 8);
        old.created_at = Some(Utc.with_ymd_and_hms(2020, 1, 1, 8, 0, 0).unwrap());
        let mut recent = sample_conversation("conv-new", None, 8);
        recent.created_at = Some(Utc::now());
        repo.upsert_conversations(&[old, recent]).await.unwrap();

        let days = repo.conversations_by_day(30).await.unwrap();
        assert_eq!(days.len(), 1);
        assert_eq!(days[0].1, 1);
    }

    #[tokio::test]
    async fn conversations_grouped_by_activity() {
        let repo = setup_repo().await;
        repo.upsert_starters(&[
            sample_starter("s1", ActivityKind::Quiz),
            sample_starter("s2", ActivityKind::Review),
        ])
        .await
        .unwrap();

        let mut conv_review = sample_conversation("conv-3", None, 9);
        conv_review.starter_id = Some("s2".to_string());
        repo.upsert_conversations(&[
            sample_conversation("conv-1", None, 8),
            sample_conversation("conv-2", None, 8),
            conv_review,
        ])
        .await
        .unwrap();

        let groups = repo.conversations_by_activity().await.unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0], (ActivityKind::Quiz, 2));
        assert_eq!(groups[1], (ActivityKind::Review, 1));
    }

    #[tokio::test]
    async fn user_message_count_excludes_assistant() {
        let repo = setup_repo().await;
        repo.upsert_messages(&[
            sample_message("m1", MessageRole::User),
            sample_message("m2", MessageRole::Assistant),
            sample_message("m3", MessageRole::User),
        ])
        .await
        .unwrap();

        assert_eq!(repo.count_messages().await.unwrap(), 3);
        assert_eq!(repo.count_user_messages().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn sync_state_round_trip() {
        let repo = setup_repo().await;
        assert!(repo.get_sync_state(EntityType::User).await.unwrap().is_none());

        let mut state = SyncState::new(EntityType::User);
        state.last_offset = 400;
        state.total_records = 950;
        state.status = EntityStatus::Completed;
        state.last_synced_at = Some(ts(10));
        repo.set_sync_state(&state).await.unwrap();

        let stored = repo.get_sync_state(EntityType::User).await.unwrap().unwrap();
        assert_eq!(stored.last_offset, 400);
        assert_eq!(stored.total_records, 950);
        assert_eq!(stored.status, EntityStatus::Completed);
        assert_eq!(stored.last_synced_at, Some(ts(10)));
    }

    #[tokio::test]
    async fn sync_state_last_write_wins() {
        let repo = setup_repo().await;
        let mut state = SyncState::new(EntityType::Message);
        state.last_offset = 200;
        repo.set_sync_state(&state).await.unwrap();

        state.last_offset = 400;
        state.status = EntityStatus::Failed;
        state.last_error = Some("boom".to_string());
        repo.set_sync_state(&state).await.unwrap();

        let all = repo.list_sync_states().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].last_offset, 400);
        assert_eq!(all[0].last_error.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn list_sync_states_returns_one_row_per_type() {
        let repo = setup_repo().await;
        for entity_type in EntityType::SYNC_ORDER {
            repo.set_sync_state(&SyncState::new(entity_type)).await.unwrap();
        }
        let all = repo.list_sync_states().await.unwrap();
        assert_eq!(all.len(), 6);
    }
}
