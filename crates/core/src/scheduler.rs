//! Periodic background sync trigger.
//!
//! A thin tokio task that fires a caller-supplied job on a fixed interval.
//! Ticks are skipped while paused or when the previous run overlaps the
//! next tick (missed ticks coalesce), so at most one scheduled sync is in
//! flight at a time.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub struct SyncScheduler {
    interval: Duration,
    paused: Arc<AtomicBool>,
    last_tick: Arc<Mutex<Option<DateTime<Utc>>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

/// Point-in-time view of the scheduler for status endpoints.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerStatus {
    pub running: bool,
    pub paused: bool,
    pub interval_secs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_tick: Option<DateTime<Utc>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SyncScheduler {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            paused: Arc::new(AtomicBool::new(false)),
            last_tick: Arc::new(Mutex::new(None)),
            handle: Mutex::new(None),
        }
    }

    /// Spawn the ticking task. The first run happens one full interval in;
    /// calling start twice is a no-op.
    pub fn start<F, Fut>(&self, job: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut guard = lock(&self.handle);
        if guard.is_some() {
            warn!("sync scheduler already started");
            return;
        }

        let paused = Arc::clone(&self.paused);
        let last_tick = Arc::clone(&self.last_tick);
        let interval = self.interval;
        *guard = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // interval's first tick resolves immediately; consume it so the
            // job does not fire at startup.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if paused.load(Ordering::Acquire) {
                    continue;
                }
                *lock(&last_tick) = Some(Utc::now());
                job().await;
            }
        }));
        info!(interval_secs = interval.as_secs(), "sync scheduler started");
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::Release);
        info!("sync scheduler paused");
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::Release);
        info!("sync scheduler resumed");
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    pub fn is_running(&self) -> bool {
        lock(&self.handle)
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    pub fn stop(&self) {
        if let Some(handle) = lock(&self.handle).take() {
            handle.abort();
            info!("sync scheduler stopped");
        }
    }

    pub fn status(&self) -> SchedulerStatus {
        SchedulerStatus {
            running: self.is_running(),
            paused: self.is_paused(),
            interval_secs: self.interval.as_secs(),
            last_tick: *lock(&self.last_tick),
        }
    }
}

impl Drop for SyncScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}
