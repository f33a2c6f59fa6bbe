//! Sync session tracking and the progress-polling read path.
//!
//! Sessions live in an explicit registry keyed by id rather than in any
//! global state. The registry also owns the single-writer guard: at most
//! one sync session runs at a time, and a second start attempt is refused
//! rather than queued.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, SlateError};
use crate::models::common::EntityType;
use crate::models::sync::SyncMode;

/// How long finished sessions stay pollable before they are pruned.
pub const DEFAULT_SESSION_RETENTION: Duration = Duration::from_secs(3600);

/// Overall state of one sync session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionStatus::Completed | SessionStatus::Failed | SessionStatus::Cancelled
        )
    }
}

/// Per-entity-type state within a running session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityRunStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy)]
struct EntityProgress {
    status: EntityRunStatus,
    current: u64,
    total: u64,
}

impl EntityProgress {
    fn new() -> Self {
        Self {
            status: EntityRunStatus::Pending,
            current: 0,
            total: 0,
        }
    }

    fn percentage(&self) -> f64 {
        if self.total == 0 {
            return match self.status {
                EntityRunStatus::Completed => 100.0,
                _ => 0.0,
            };
        }
        let pct = (self.current as f64 / self.total as f64 * 100.0).min(100.0);
        (pct * 10.0).round() / 10.0
    }
}

#[derive(Debug)]
struct SyncSession {
    id: Uuid,
    mode: SyncMode,
    status: SessionStatus,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    progress: BTreeMap<EntityType, EntityProgress>,
    results: BTreeMap<EntityType, u64>,
    error: Option<String>,
}

impl SyncSession {
    fn new(id: Uuid, mode: SyncMode) -> Self {
        let progress = EntityType::SYNC_ORDER
            .iter()
            .map(|&t| (t, EntityProgress::new()))
            .collect();
        Self {
            id,
            mode,
            status: SessionStatus::Pending,
            started_at: Utc::now(),
            completed_at: None,
            progress,
            results: BTreeMap::new(),
            error: None,
        }
    }
}

/// Read-only view of a session, shaped for the polling consumer.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub session_id: Uuid,
    pub mode: SyncMode,
    pub status: SessionStatus,
    /// Simple average of the six per-type percentages, each capped at 100.
    pub overall_progress: f64,
    pub detailed_progress: BTreeMap<EntityType, EntityProgressSnapshot>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub results: BTreeMap<EntityType, EntityResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityProgressSnapshot {
    pub status: EntityRunStatus,
    pub current: u64,
    pub total: u64,
    pub percentage: f64,
}

/// Final record count for one entity type in a finished session.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct EntityResult {
    pub count: u64,
}

fn snapshot_of(session: &SyncSession) -> SessionSnapshot {
    let detailed: BTreeMap<EntityType, EntityProgressSnapshot> = session
        .progress
        .iter()
        .map(|(&t, p)| {
            (
                t,
                EntityProgressSnapshot {
                    status: p.status,
                    current: p.current,
                    total: p.total,
                    percentage: p.percentage(),
                },
            )
        })
        .collect();
    let overall = if detailed.is_empty() {
        0.0
    } else {
        let sum: f64 = detailed.values().map(|p| p.percentage).sum();
        ((sum / detailed.len() as f64) * 10.0).round() / 10.0
    };
    SessionSnapshot {
        session_id: session.id,
        mode: session.mode,
        status: session.status,
        overall_progress: overall,
        detailed_progress: detailed,
        results: session
            .results
            .iter()
            .map(|(&t, &count)| (t, EntityResult { count }))
            .collect(),
        error: session.error.clone(),
        started_at: session.started_at,
        completed_at: session.completed_at,
    }
}

struct SessionSlot {
    state: Mutex<SyncSession>,
    cancelled: AtomicBool,
}

fn lock(state: &Mutex<SyncSession>) -> MutexGuard<'_, SyncSession> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Registry of sync sessions plus the process-wide run guard.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<Uuid, Arc<SessionSlot>>>,
    running: AtomicBool,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new session and take the run guard. Fails with
    /// [`SlateError::SyncInProgress`] while another session holds it;
    /// the check-and-set is atomic so two concurrent starts cannot both
    /// win.
    pub fn begin(self: &Arc<Self>, mode: SyncMode) -> Result<SessionHandle> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(SlateError::SyncInProgress);
        }

        let id = Uuid::new_v4();
        let slot = Arc::new(SessionSlot {
            state: Mutex::new(SyncSession::new(id, mode)),
            cancelled: AtomicBool::new(false),
        });
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, Arc::clone(&slot));

        Ok(SessionHandle {
            registry: Arc::clone(self),
            slot,
            id,
            released: AtomicBool::new(false),
        })
    }

    /// Whether a session currently holds the run guard.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Read-only snapshot of a session. Never blocks on sync work; the
    /// state lock is only ever held for field updates.
    pub fn snapshot(&self, id: Uuid) -> Option<SessionSnapshot> {
        let sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        sessions.get(&id).map(|slot| snapshot_of(&lock(&slot.state)))
    }

    /// Flag a running session for cancellation. The engine checks the flag
    /// between batches, so the stop is clean and resumable. Returns false
    /// for unknown or already-terminal sessions.
    pub fn cancel(&self, id: Uuid) -> bool {
        let sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        match sessions.get(&id) {
            Some(slot) if !lock(&slot.state).status.is_terminal() => {
                slot.cancelled.store(true, Ordering::Release);
                true
            }
            _ => false,
        }
    }

    /// Drop terminal sessions that finished longer than `retention` ago.
    pub fn prune_expired(&self, retention: Duration) {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(retention).unwrap_or(chrono::Duration::zero());
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        sessions.retain(|_, slot| {
            let state = lock(&slot.state);
            match (state.status.is_terminal(), state.completed_at) {
                (true, Some(done)) => done > cutoff,
                _ => true,
            }
        });
    }

    fn release_run_guard(&self) {
        self.running.store(false, Ordering::Release);
    }
}

/// Writer handle to one session, held by the sync engine for the duration
/// of a run. Dropping the handle releases the run guard; a drop before
/// `finish` marks the session failed so pollers never see a run wedged in
/// `running`.
pub struct SessionHandle {
    registry: Arc<SessionRegistry>,
    slot: Arc<SessionSlot>,
    id: Uuid,
    released: AtomicBool,
}

impl SessionHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn mode(&self) -> SyncMode {
        lock(&self.slot.state).mode
    }

    pub fn is_cancelled(&self) -> bool {
        self.slot.cancelled.load(Ordering::Acquire)
    }

    pub fn mark_running(&self) {
        lock(&self.slot.state).status = SessionStatus::Running;
    }

    pub fn entity_running(&self, entity_type: EntityType) {
        if let Some(p) = lock(&self.slot.state).progress.get_mut(&entity_type) {
            p.status = EntityRunStatus::Running;
        }
    }

    /// Update a type's progress counters. `current` is cumulative and only
    /// ever moves forward within a session.
    pub fn update_entity(&self, entity_type: EntityType, current: u64, total: u64) {
        if let Some(p) = lock(&self.slot.state).progress.get_mut(&entity_type) {
            p.current = p.current.max(current);
            p.total = total.max(p.current);
        }
    }

    pub fn entity_completed(&self, entity_type: EntityType, count: u64) {
        let mut state = lock(&self.slot.state);
        if let Some(p) = state.progress.get_mut(&entity_type) {
            p.status = EntityRunStatus::Completed;
            p.current = count;
            p.total = p.total.max(count);
        }
        state.results.insert(entity_type, count);
    }

    pub fn entity_failed(&self, entity_type: EntityType) {
        if let Some(p) = lock(&self.slot.state).progress.get_mut(&entity_type) {
            p.status = EntityRunStatus::Failed;
        }
    }

    /// Move the session to a terminal state and release the run guard.
    pub fn finish(&self, status: SessionStatus, error: Option<String>) {
        {
            let mut state = lock(&self.slot.state);
            state.status = status;
            state.error = error;
            state.completed_at = Some(Utc::now());
        }
        if !self.released.swap(true, Ordering::AcqRel) {
            self.registry.release_run_guard();
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        snapshot_of(&lock(&self.slot.state))
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        if !self.released.swap(true, Ordering::AcqRel) {
            let mut state = lock(&self.slot.state);
            if !state.status.is_terminal() {
                state.status = SessionStatus::Failed;
                state.error = Some("sync task aborted".to_string());
                state.completed_at = Some(Utc::now());
            }
            drop(state);
            self.registry.release_run_guard();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> Arc<SessionRegistry> {
        Arc::new(SessionRegistry::new())
    }

    #[test]
    fn begin_initializes_all_types_pending() {
        let reg = registry();
        let handle = reg.begin(SyncMode::Full).unwrap();
        let snap = handle.snapshot();
        assert_eq!(snap.status, SessionStatus::Pending);
        assert_eq!(snap.detailed_progress.len(), 6);
        assert!(snap
            .detailed_progress
            .values()
            .all(|p| p.status == EntityRunStatus::Pending && p.current == 0));
        assert_eq!(snap.overall_progress, 0.0);
    }

    #[test]
    fn second_begin_conflicts_while_first_active() {
        let reg = registry();
        let _first = reg.begin(SyncMode::Full).unwrap();
        let second = reg.begin(SyncMode::Incremental);
        assert!(matches!(second, Err(SlateError::SyncInProgress)));
    }

    #[test]
    fn finish_releases_run_guard() {
        let reg = registry();
        let first = reg.begin(SyncMode::Full).unwrap();
        first.finish(SessionStatus::Completed, None);
        assert!(!reg.is_running());
        reg.begin(SyncMode::Full).unwrap();
    }

    #[test]
    fn drop_without_finish_marks_failed_and_releases() {
        let reg = registry();
        let id = {
            let handle = reg.begin(SyncMode::Full).unwrap();
            handle.mark_running();
            handle.id()
        };
        assert!(!reg.is_running());
        let snap = reg.snapshot(id).unwrap();
        assert_eq!(snap.status, SessionStatus::Failed);
        assert_eq!(snap.error.as_deref(), Some("sync task aborted"));
    }

    #[test]
    fn snapshot_unknown_session_is_none() {
        let reg = registry();
        assert!(reg.snapshot(Uuid::new_v4()).is_none());
    }

    #[test]
    fn overall_progress_averages_across_types() {
        let reg = registry();
        let handle = reg.begin(SyncMode::Full).unwrap();
        handle.entity_completed(EntityType::User, 100);
        handle.entity_completed(EntityType::Course, 10);
        handle.entity_completed(EntityType::Assignment, 0);
        // Three of six at 100%, three untouched at 0%.
        let snap = handle.snapshot();
        assert_eq!(snap.overall_progress, 50.0);
    }

    #[test]
    fn percentage_caps_at_100() {
        let reg = registry();
        let handle = reg.begin(SyncMode::Full).unwrap();
        // Source under-reported the total; current overtakes it.
        handle.update_entity(EntityType::User, 100, 80);
        let snap = handle.snapshot();
        let p = &snap.detailed_progress[&EntityType::User];
        assert_eq!(p.current, 100);
        assert!(p.percentage <= 100.0);
    }

    #[test]
    fn current_never_regresses() {
        let reg = registry();
        let handle = reg.begin(SyncMode::Full).unwrap();
        handle.update_entity(EntityType::User, 200, 400);
        handle.update_entity(EntityType::User, 150, 400);
        let snap = handle.snapshot();
        assert_eq!(snap.detailed_progress[&EntityType::User].current, 200);
    }

    #[test]
    fn zero_record_type_completes_at_100_percent() {
        let reg = registry();
        let handle = reg.begin(SyncMode::Full).unwrap();
        handle.entity_completed(EntityType::ConversationStarter, 0);
        let snap = handle.snapshot();
        let p = &snap.detailed_progress[&EntityType::ConversationStarter];
        assert_eq!(p.current, 0);
        assert_eq!(p.total, 0);
        assert_eq!(p.percentage, 100.0);
    }

    #[test]
    fn cancel_flags_running_session_only() {
        let reg = registry();
        let handle = reg.begin(SyncMode::Full).unwrap();
        let id = handle.id();
        assert!(!handle.is_cancelled());
        assert!(reg.cancel(id));
        assert!(handle.is_cancelled());

        handle.finish(SessionStatus::Cancelled, None);
        assert!(!reg.cancel(id));
        assert!(!reg.cancel(Uuid::new_v4()));
    }

    #[test]
    fn prune_removes_only_expired_terminal_sessions() {
        let reg = registry();
        let finished = reg.begin(SyncMode::Full).unwrap();
        let finished_id = finished.id();
        finished.finish(SessionStatus::Completed, None);

        let active = reg.begin(SyncMode::Full).unwrap();
        let active_id = active.id();
        active.mark_running();

        // Nothing old enough yet.
        reg.prune_expired(Duration::from_secs(3600));
        assert!(reg.snapshot(finished_id).is_some());

        // Retention of zero expires every terminal session.
        reg.prune_expired(Duration::from_secs(0));
        assert!(reg.snapshot(finished_id).is_none());
        assert!(reg.snapshot(active_id).is_some());
        active.finish(SessionStatus::Completed, None);
    }

    #[test]
    fn snapshot_serializes_camel_case_with_type_keys() {
        let reg = registry();
        let handle = reg.begin(SyncMode::Incremental).unwrap();
        handle.entity_completed(EntityType::User, 3);
        let json = serde_json::to_string(&handle.snapshot()).unwrap();
        assert!(json.contains("\"sessionId\""));
        assert!(json.contains("\"overallProgress\""));
        assert!(json.contains("\"detailedProgress\""));
        assert!(json.contains("\"conversation_starter\""));
        assert!(json.contains("\"mode\":\"incremental\""));
    }
}
