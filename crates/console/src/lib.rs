//! Slate Console — JSON API for the dashboard front-end.
//!
//! Serves the sync management surface (trigger, progress polling, cancel,
//! per-type status) and the aggregate/chart queries the dashboard renders.
//! Sync runs are dispatched onto a background task so the triggering
//! request returns immediately with a session id to poll.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::error;
use uuid::Uuid;

use slate_core::db::repository::{
    ConversationRepository, MessageRepository, SyncStateRepository, UserRepository,
};
use slate_core::db::sqlite::SqliteRepository;
use slate_core::error::SlateError;
use slate_core::models::common::EntityType;
use slate_core::models::sync::{SyncMode, SyncState};
use slate_core::scheduler::SyncScheduler;
use slate_core::session::SessionRegistry;
use slate_core::source::RecordSource;
use slate_core::sync::{SyncEngine, SyncOptions};

/// Shared application state for all console routes.
pub struct AppState {
    pub repo: Arc<SqliteRepository>,
    pub registry: Arc<SessionRegistry>,
    pub source: Arc<dyn RecordSource>,
    pub sync_options: SyncOptions,
    pub session_retention: Duration,
    pub scheduler: Option<Arc<SyncScheduler>>,
}

/// Build the console router with all routes.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/sync", post(start_sync))
        .route("/api/sync/progress/:session_id", get(sync_progress))
        .route("/api/sync/cancel/:session_id", post(cancel_sync))
        .route("/api/sync/status", get(sync_status_summary))
        .route("/api/stats", get(stats))
        .route("/api/metrics", get(metrics))
        .route("/api/chart/sessions-by-date", get(chart_sessions_by_date))
        .route(
            "/api/chart/conversations-by-course",
            get(chart_conversations_by_course),
        )
        .route(
            "/api/chart/conversations-by-activity",
            get(chart_conversations_by_activity),
        )
        .route("/api/conversations/recent", get(recent_conversations))
        .route("/api/scheduler/status", get(scheduler_status))
        .route("/api/scheduler/pause", post(scheduler_pause))
        .route("/api/scheduler/resume", post(scheduler_resume))
        .with_state(state)
}

type ApiError = (StatusCode, Json<Value>);

fn internal_error(e: SlateError) -> ApiError {
    error!(error = %e, "console request failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"error": e.to_string()})),
    )
}

fn not_found(message: &str) -> ApiError {
    (StatusCode::NOT_FOUND, Json(json!({"error": message})))
}

// -- Health --

async fn health() -> &'static str {
    "ok"
}

// -- Sync management --

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct StartSyncRequest {
    mode: Option<SyncMode>,
    batch_size: Option<u32>,
}

async fn start_sync(
    State(state): State<Arc<AppState>>,
    body: Option<Json<StartSyncRequest>>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let mode = request.mode.unwrap_or_default();

    let mut options = state.sync_options.clone();
    if let Some(batch_size) = request.batch_size {
        if batch_size == 0 || batch_size > 500 {
            return Err((
                StatusCode::BAD_REQUEST,
                Json(json!({"error": "batch size must be between 1 and 500"})),
            ));
        }
        options.batch_size = batch_size;
    }

    let handle = match state.registry.begin(mode) {
        Ok(handle) => handle,
        Err(SlateError::SyncInProgress) => {
            return Err((
                StatusCode::CONFLICT,
                Json(json!({"error": SlateError::SyncInProgress.to_string()})),
            ));
        }
        Err(e) => return Err(internal_error(e)),
    };
    let session_id = handle.id();

    let engine = SyncEngine::new(Arc::clone(&state.repo), Arc::clone(&state.source), options);
    tokio::spawn(async move {
        engine.run(handle).await;
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({"sessionId": session_id, "mode": mode})),
    ))
}

async fn sync_progress(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    state.registry.prune_expired(state.session_retention);
    match state.registry.snapshot(session_id) {
        Some(snapshot) => serde_json::to_value(snapshot)
            .map(Json)
            .map_err(|e| internal_error(e.into())),
        None => Err(not_found("session not found")),
    }
}

async fn cancel_sync(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    if state.registry.cancel(session_id) {
        Ok(Json(json!({"cancelled": true})))
    } else {
        Err(not_found("session not found or already finished"))
    }
}

async fn sync_status_summary(
    State(state): State<Arc<AppState>>,
) -> Result<Json<BTreeMap<EntityType, SyncState>>, ApiError> {
    let states = state
        .repo
        .list_sync_states()
        .await
        .map_err(internal_error)?;
    Ok(Json(states.into_iter().map(|s| (s.entity_type, s)).collect()))
}

// -- Dashboard aggregates --

async fn stats(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    let users = state.repo.count_users().await.map_err(internal_error)?;
    let conversations = state
        .repo
        .count_conversations()
        .await
        .map_err(internal_error)?;
    let messages = state
        .repo
        .count_user_messages()
        .await
        .map_err(internal_error)?;
    Ok(Json(json!({
        "users": users,
        "conversations": conversations,
        "messages": messages,
    })))
}

async fn metrics(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    let total_users = state.repo.count_users().await.map_err(internal_error)?;
    let total_conversations = state
        .repo
        .count_conversations()
        .await
        .map_err(internal_error)?;
    let total_messages = state.repo.count_messages().await.map_err(internal_error)?;
    let user_messages = state
        .repo
        .count_user_messages()
        .await
        .map_err(internal_error)?;

    let avg_messages = if total_conversations > 0 {
        (user_messages as f64 / total_conversations as f64 * 100.0).round() / 100.0
    } else {
        0.0
    };

    let mut activity = serde_json::Map::new();
    for (kind, count) in state
        .repo
        .conversations_by_activity()
        .await
        .map_err(internal_error)?
    {
        activity.insert(kind.as_str().to_string(), json!(count));
    }

    Ok(Json(json!({
        "totalUsers": total_users,
        "totalConversations": total_conversations,
        "totalMessages": total_messages,
        "userMessages": user_messages,
        "avgMessagesPerConversation": avg_messages,
        "activity": activity,
    })))
}

#[derive(Debug, Deserialize)]
struct DaysQuery {
    days: Option<i64>,
}

async fn chart_sessions_by_date(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DaysQuery>,
) -> Result<Json<Value>, ApiError> {
    let days = query.days.unwrap_or(30).clamp(1, 365);
    let rows = state
        .repo
        .conversations_by_day(days)
        .await
        .map_err(internal_error)?;
    let labels: Vec<String> = rows.iter().map(|(day, _)| day.clone()).collect();
    let data: Vec<i64> = rows.iter().map(|(_, n)| *n).collect();
    let total: i64 = data.iter().sum();
    Ok(Json(json!({"labels": labels, "data": data, "total": total})))
}

async fn chart_conversations_by_course(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Value>, ApiError> {
    let rows = state
        .repo
        .conversations_by_course()
        .await
        .map_err(internal_error)?;
    let labels: Vec<String> = rows
        .iter()
        .map(|(id, name, _)| name.clone().unwrap_or_else(|| format!("Course {id}")))
        .collect();
    let data: Vec<i64> = rows.iter().map(|(_, _, n)| *n).collect();
    let total: i64 = data.iter().sum();
    Ok(Json(json!({"labels": labels, "data": data, "total": total})))
}

async fn chart_conversations_by_activity(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Value>, ApiError> {
    let rows = state
        .repo
        .conversations_by_activity()
        .await
        .map_err(internal_error)?;
    let labels: Vec<&str> = rows.iter().map(|(kind, _)| kind.as_str()).collect();
    let data: Vec<i64> = rows.iter().map(|(_, n)| *n).collect();
    let total: i64 = data.iter().sum();
    Ok(Json(json!({"labels": labels, "data": data, "total": total})))
}

#[derive(Debug, Deserialize)]
struct RecentQuery {
    limit: Option<i64>,
}

async fn recent_conversations(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RecentQuery>,
) -> Result<Json<Value>, ApiError> {
    let limit = query.limit.unwrap_or(10).clamp(1, 100);
    let conversations = state
        .repo
        .list_recent_conversations(limit)
        .await
        .map_err(internal_error)?;
    serde_json::to_value(conversations)
        .map(Json)
        .map_err(|e| internal_error(e.into()))
}

// -- Scheduler --

async fn scheduler_status(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    match &state.scheduler {
        Some(scheduler) => serde_json::to_value(scheduler.status())
            .map(Json)
            .map_err(|e| internal_error(e.into())),
        None => Err(not_found("scheduler is not enabled")),
    }
}

async fn scheduler_pause(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    match &state.scheduler {
        Some(scheduler) => {
            scheduler.pause();
            Ok(Json(json!({"paused": true})))
        }
        None => Err(not_found("scheduler is not enabled")),
    }
}

async fn scheduler_resume(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    match &state.scheduler {
        Some(scheduler) => {
            scheduler.resume();
            Ok(Json(json!({"paused": false})))
        }
        None => Err(not_found("scheduler is not enabled")),
    }
}
