//! The batch sync engine.
//!
//! One run walks every entity type in dependency order, paging records out
//! of the source, mapping them, and upserting them batch by batch. Cursors
//! are persisted after every batch so an interrupted run resumes instead of
//! restarting, and failures are isolated per entity type: a bad page fails
//! one type, not the session, while credential rejection or an exhausted
//! time budget stops the whole run.

use std::time::{Duration, Instant};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::SyncConfig;
use crate::db::repository::SlateRepository;
use crate::error::{FetchError, Result, SlateError};
use crate::models::common::EntityType;
use crate::models::sync::{EntityStatus, SyncMode, SyncState, UpsertResult};
use crate::session::{SessionHandle, SessionStatus};
use crate::source::mapper::{resolve_conversation_refs, EntityMapper, MappedBatch};
use crate::source::{RecordSource, MAX_PAGE_LIMIT};

/// Tuning for one engine instance.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Records per fetch, clamped to the source's page ceiling.
    pub batch_size: u32,
    /// Cap on records processed per entity type in one session.
    pub max_items_per_type: u64,
    /// Total attempts per page before a transient failure sticks.
    pub retry_limit: u32,
    /// Base backoff between attempts; scales linearly with the attempt number.
    pub retry_backoff: Duration,
    /// Wall-clock ceiling for the whole session.
    pub session_budget: Duration,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            batch_size: 200,
            max_items_per_type: 10_000,
            retry_limit: 3,
            retry_backoff: Duration::from_millis(500),
            session_budget: Duration::from_secs(600),
        }
    }
}

impl From<&SyncConfig> for SyncOptions {
    fn from(config: &SyncConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            max_items_per_type: config.max_items_per_type,
            retry_limit: config.retry_limit,
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
            session_budget: Duration::from_secs(config.session_budget_secs),
        }
    }
}

/// How one entity type's sync ended, short of a session-fatal error.
enum TypeOutcome {
    Completed,
    Failed,
    Cancelled,
}

/// Engine that drives a full sync session from a record source into the
/// local store.
pub struct SyncEngine<R: SlateRepository> {
    repo: Arc<R>,
    source: Arc<dyn RecordSource>,
    options: SyncOptions,
}

impl<R: SlateRepository> SyncEngine<R> {
    pub fn new(repo: Arc<R>, source: Arc<dyn RecordSource>, options: SyncOptions) -> Self {
        Self {
            repo,
            source,
            options,
        }
    }

    /// Run one sync session to a terminal state. The session handle is
    /// consumed; callers poll the registry for progress and the outcome.
    pub async fn run(&self, handle: SessionHandle) -> SessionStatus {
        let mode = handle.mode();
        info!(session = %handle.id(), ?mode, "starting sync session");
        handle.mark_running();

        let started = Instant::now();
        let mut fatal: Option<String> = None;
        let mut any_failed = false;
        let mut cancelled = false;

        for entity_type in EntityType::SYNC_ORDER {
            if handle.is_cancelled() {
                cancelled = true;
                break;
            }
            if started.elapsed() >= self.options.session_budget {
                fatal =
                    Some(SlateError::Timeout(self.options.session_budget.as_secs()).to_string());
                break;
            }

            match self.sync_entity(entity_type, mode, &handle, started).await {
                Ok(TypeOutcome::Completed) => {}
                Ok(TypeOutcome::Failed) => any_failed = true,
                Ok(TypeOutcome::Cancelled) => {
                    cancelled = true;
                    break;
                }
                Err(e) => {
                    error!(session = %handle.id(), entity = %entity_type, error = %e, "sync session aborted");
                    handle.entity_failed(entity_type);
                    fatal = Some(e.to_string());
                    break;
                }
            }
        }

        let status = if cancelled {
            SessionStatus::Cancelled
        } else if fatal.is_some() || any_failed {
            SessionStatus::Failed
        } else {
            SessionStatus::Completed
        };
        let error =
            fatal.or_else(|| any_failed.then(|| "one or more entity types failed".to_string()));

        match status {
            SessionStatus::Completed => info!(session = %handle.id(), "sync session completed"),
            SessionStatus::Cancelled => info!(session = %handle.id(), "sync session cancelled"),
            _ => warn!(session = %handle.id(), error = ?error, "sync session failed"),
        }
        handle.finish(status, error);
        status
    }

    async fn sync_entity(
        &self,
        entity_type: EntityType,
        mode: SyncMode,
        handle: &SessionHandle,
        started: Instant,
    ) -> Result<TypeOutcome> {
        let mut state = self
            .repo
            .get_sync_state(entity_type)
            .await?
            .unwrap_or_else(|| SyncState::new(entity_type));

        // Full mode restarts from scratch. Incremental mode prefers a
        // modification-time filter when the source supports one (with a
        // one-minute overlap against clock skew), and falls back to plain
        // offset resumption otherwise.
        let modified_since: Option<DateTime<Utc>> = match mode {
            SyncMode::Full => None,
            SyncMode::Incremental if self.source.supports_modified_filter() => state
                .last_synced_at
                .map(|last| last - ChronoDuration::minutes(1)),
            SyncMode::Incremental => None,
        };
        let mut offset: u64 = match mode {
            SyncMode::Full => 0,
            SyncMode::Incremental if modified_since.is_some() => 0,
            SyncMode::Incremental => state.last_offset.max(0) as u64,
        };

        state.status = EntityStatus::Running;
        state.last_error = None;
        state.last_offset = offset as i64;
        state.updated_at = Utc::now();
        self.repo.set_sync_state(&state).await?;
        handle.entity_running(entity_type);
        info!(entity = %entity_type, offset, filtered = modified_since.is_some(), "syncing entity type");

        let mut current: u64 = 0;
        let mut record_failures: u64 = 0;

        loop {
            if handle.is_cancelled() {
                // Leave the cursor where the last batch put it; the next
                // run resumes from here.
                state.status = EntityStatus::Idle;
                state.updated_at = Utc::now();
                self.repo.set_sync_state(&state).await?;
                info!(entity = %entity_type, offset, "entity sync cancelled");
                return Ok(TypeOutcome::Cancelled);
            }
            if started.elapsed() >= self.options.session_budget {
                let err = SlateError::Timeout(self.options.session_budget.as_secs());
                state.status = EntityStatus::Failed;
                state.last_error = Some(err.to_string());
                state.updated_at = Utc::now();
                self.repo.set_sync_state(&state).await?;
                handle.entity_failed(entity_type);
                return Err(err);
            }
            if current >= self.options.max_items_per_type {
                info!(entity = %entity_type, cap = self.options.max_items_per_type, "item cap reached");
                break;
            }

            let allowance = self.options.max_items_per_type - current;
            let limit = self
                .options
                .batch_size
                .clamp(1, MAX_PAGE_LIMIT)
                .min(allowance.min(u64::from(MAX_PAGE_LIMIT)) as u32);

            let page = match self
                .fetch_with_retry(entity_type, offset, limit, modified_since)
                .await
            {
                Ok(page) => page,
                Err(FetchError::Auth(msg)) => {
                    state.status = EntityStatus::Failed;
                    state.last_error = Some(format!("source rejected credentials: {msg}"));
                    state.updated_at = Utc::now();
                    self.repo.set_sync_state(&state).await?;
                    handle.entity_failed(entity_type);
                    return Err(SlateError::Fetch(FetchError::Auth(msg)));
                }
                Err(FetchError::Malformed(msg)) => {
                    // Skip past the unparseable page so a future run does
                    // not stall on the same offset forever.
                    warn!(entity = %entity_type, offset, error = %msg, "skipping malformed page");
                    state.last_offset = (offset + u64::from(limit)) as i64;
                    state.status = EntityStatus::Failed;
                    state.last_error = Some(msg);
                    state.updated_at = Utc::now();
                    self.repo.set_sync_state(&state).await?;
                    handle.entity_failed(entity_type);
                    return Ok(TypeOutcome::Failed);
                }
                Err(FetchError::Transient(msg)) => {
                    warn!(entity = %entity_type, offset, error = %msg, "giving up after transient failures");
                    state.status = EntityStatus::Failed;
                    state.last_error = Some(msg);
                    state.updated_at = Utc::now();
                    self.repo.set_sync_state(&state).await?;
                    handle.entity_failed(entity_type);
                    return Ok(TypeOutcome::Failed);
                }
            };

            if let Some(total) = page.total_count {
                state.total_records = total as i64;
            }
            let fetched = page.records.len() as u64;
            if fetched == 0 {
                break;
            }

            let mapped = EntityMapper::map_batch(entity_type, &page.records, Utc::now());
            if mapped.dropped > 0 {
                warn!(entity = %entity_type, dropped = mapped.dropped, "records without external ids dropped");
            }

            let mut result = UpsertResult::default();
            if !mapped.batch.is_empty() {
                let mut batch = mapped.batch;
                if let MappedBatch::Conversations(ref mut convs) = batch {
                    resolve_conversation_refs(self.repo.as_ref(), convs).await?;
                }
                result = self.upsert_batch(&batch).await?;
            }
            if result.failed > 0 {
                warn!(entity = %entity_type, failed = result.failed, "records failed to store");
            }
            record_failures += result.failed + mapped.dropped;

            if let Some(newest) = newest_modified(&page.records) {
                state.last_modified_seen = state.last_modified_seen.max(Some(newest));
            }

            current += fetched;
            offset += fetched;
            state.last_offset = offset as i64;
            state.updated_at = Utc::now();
            self.repo.set_sync_state(&state).await?;

            handle.update_entity(entity_type, current, state.total_records.max(0) as u64);
            info!(
                entity = %entity_type,
                batch = fetched,
                current,
                inserted = result.inserted,
                updated = result.updated,
                "batch stored"
            );

            if !page.has_more {
                break;
            }
        }

        state.status = EntityStatus::Completed;
        state.last_synced_at = Some(Utc::now());
        state.last_error = None;
        if modified_since.is_some() {
            state.total_records += current as i64;
        } else {
            state.total_records = state.total_records.max(current as i64);
        }
        state.updated_at = Utc::now();
        self.repo.set_sync_state(&state).await?;
        handle.entity_completed(entity_type, current);
        info!(entity = %entity_type, synced = current, skipped = record_failures, "entity sync completed");
        Ok(TypeOutcome::Completed)
    }

    async fn fetch_with_retry(
        &self,
        entity_type: EntityType,
        offset: u64,
        limit: u32,
        modified_since: Option<DateTime<Utc>>,
    ) -> std::result::Result<crate::source::RecordPage, FetchError> {
        let mut attempt: u32 = 1;
        loop {
            match self
                .source
                .fetch_page(entity_type, offset, limit, modified_since)
                .await
            {
                Ok(page) => return Ok(page),
                Err(FetchError::Transient(msg)) if attempt < self.options.retry_limit.max(1) => {
                    warn!(entity = %entity_type, offset, attempt, error = %msg, "transient fetch error, retrying");
                    tokio::time::sleep(self.options.retry_backoff * attempt).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn upsert_batch(&self, batch: &MappedBatch) -> Result<UpsertResult> {
        match batch {
            MappedBatch::Users(v) => self.repo.upsert_users(v).await,
            MappedBatch::Courses(v) => self.repo.upsert_courses(v).await,
            MappedBatch::Assignments(v) => self.repo.upsert_assignments(v).await,
            MappedBatch::Starters(v) => self.repo.upsert_starters(v).await,
            MappedBatch::Conversations(v) => self.repo.upsert_conversations(v).await,
            MappedBatch::Messages(v) => self.repo.upsert_messages(v).await,
        }
    }
}

fn newest_modified(records: &[Value]) -> Option<DateTime<Utc>> {
    records
        .iter()
        .filter_map(|r| r.get("Modified Date").and_then(Value::as_str))
        .filter_map(|s| {
            DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.with_timezone(&Utc))
                .ok()
        })
        .max()
}
