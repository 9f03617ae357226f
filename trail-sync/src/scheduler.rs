//! Debounced write-back with a circuit breaker
//!
//! ```text
//! mutation ──► schedule(3s) ──► [one pending timer] ──► fire
//!                                                        │
//!   reset ───► expedite(500ms) ─┘        read latest state, encode full shape
//!                                                        │
//!                               same as last written? ── yes ─► skip
//!                                                        │ no
//!                                                   set_merge
//!                                          ok ─► remember snapshot
//!                                 breaker-class error ─► disable for session
//!                                       other error ─► log, retry next cycle
//! ```
//!
//! The timer owns no copy of the state. It reads the session's watch
//! channel when it fires, so a write always carries the newest state.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use trail_engine::{ProgressDocument, ProgressState};

use crate::error::{RemoteError, SyncError};
use crate::events::{EventBus, TrailEvent};
use crate::identity::UserId;
use crate::store::RemoteStore;

/// Observable scheduler state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub pending: bool,
    pub disabled: bool,
    pub writes: u64,
    pub skipped: u64,
    pub failures: u64,
    pub last_write_at: Option<DateTime<Utc>>,
}

struct Binding {
    user: UserId,
    path: String,
}

struct PendingWrite {
    id: u64,
    due: Instant,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct Inner {
    binding: Option<Binding>,
    generation: u64,
    pending: Option<PendingWrite>,
    next_timer_id: u64,
    last_written: Option<String>,
    disabled: bool,
    writes: u64,
    skipped: u64,
    failures: u64,
    last_write_at: Option<DateTime<Utc>>,
}

struct Shared {
    store: Arc<dyn RemoteStore>,
    state: watch::Receiver<ProgressState>,
    events: Arc<EventBus>,
    inner: Mutex<Inner>,
    /// Writes that left the queue and have not finished yet
    in_flight: watch::Sender<usize>,
}

/// A write that left the queue and is about to hit the store
struct Prepared {
    user: UserId,
    path: String,
    generation: u64,
    snapshot: String,
    document: serde_json::Value,
}

/// Owns at most one pending write timer for the bound user.
///
/// `schedule`, `expedite` and `cancel` spawn or abort Tokio tasks and must be
/// called from within a runtime.
pub struct WriteScheduler {
    shared: Arc<Shared>,
}

impl WriteScheduler {
    pub fn new(
        store: Arc<dyn RemoteStore>,
        state: watch::Receiver<ProgressState>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                store,
                state,
                events,
                inner: Mutex::new(Inner::default()),
                in_flight: watch::channel(0).0,
            }),
        }
    }

    /// Point the scheduler at another user's document (or at nobody).
    ///
    /// Drops the pending timer, forgets the last written snapshot and resets
    /// the breaker. Writes still in flight for the previous binding are not
    /// recorded.
    pub fn rebind(&self, user: Option<UserId>, path: Option<String>) {
        let mut inner = self.shared.lock();
        Self::abort_pending(&mut inner);
        inner.generation += 1;
        inner.binding = user.zip(path).map(|(user, path)| Binding { user, path });
        inner.last_written = None;
        inner.disabled = false;
    }

    /// Start a write timer unless one is already pending.
    ///
    /// Returns whether a new timer was started.
    pub fn schedule(&self, delay: Duration) -> bool {
        let mut inner = self.shared.lock();
        if !Self::accepting(&inner) {
            return false;
        }
        if inner.pending.is_some() {
            debug!("Write already pending");
            return false;
        }
        self.spawn_timer(&mut inner, delay);
        true
    }

    /// Make the pending write fire no later than `delay` from now
    pub fn expedite(&self, delay: Duration) -> bool {
        let mut inner = self.shared.lock();
        if !Self::accepting(&inner) {
            return false;
        }
        if let Some(pending) = &inner.pending {
            if pending.due <= Instant::now() + delay {
                return false;
            }
        }
        Self::abort_pending(&mut inner);
        self.spawn_timer(&mut inner, delay);
        true
    }

    /// Drop the pending timer without writing
    pub fn cancel(&self) {
        let mut inner = self.shared.lock();
        if Self::abort_pending(&mut inner) {
            debug!("Pending write cancelled");
        }
    }

    /// Fire the pending write now and wait for it, along with any write a
    /// timer already started.
    ///
    /// Writes go to the binding current at the time of the call.
    pub async fn flush(&self) -> Result<(), SyncError> {
        let prepared = {
            let mut inner = self.shared.lock();
            if Self::abort_pending(&mut inner) {
                self.shared.prepare(&mut inner)
            } else {
                None
            }
        };

        let result = match prepared {
            Some(prepared) => self.shared.execute(prepared).await,
            None => Ok(()),
        };
        self.shared.wait_idle().await;
        result.map_err(SyncError::RemoteWrite)
    }

    pub fn status(&self) -> SyncStatus {
        let inner = self.shared.lock();
        SyncStatus {
            pending: inner.pending.is_some(),
            disabled: inner.disabled,
            writes: inner.writes,
            skipped: inner.skipped,
            failures: inner.failures,
            last_write_at: inner.last_write_at,
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.shared.lock().disabled
    }

    fn accepting(inner: &Inner) -> bool {
        if inner.disabled {
            debug!("Sync disabled, write not scheduled");
            return false;
        }
        inner.binding.is_some()
    }

    fn abort_pending(inner: &mut Inner) -> bool {
        match inner.pending.take() {
            Some(pending) => {
                pending.handle.abort();
                true
            }
            None => false,
        }
    }

    fn spawn_timer(&self, inner: &mut Inner, delay: Duration) {
        inner.next_timer_id += 1;
        let id = inner.next_timer_id;
        let shared = Arc::clone(&self.shared);

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            shared.fire(id).await;
        });

        debug!(delay_ms = delay.as_millis() as u64, timer_id = id, "Write scheduled");
        inner.pending = Some(PendingWrite {
            id,
            due: Instant::now() + delay,
            handle,
        });
    }
}

struct InFlight<'a>(&'a watch::Sender<usize>);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.send_modify(|count| *count = count.saturating_sub(1));
    }
}

impl Drop for WriteScheduler {
    fn drop(&mut self) {
        let mut inner = self.shared.lock();
        Self::abort_pending(&mut inner);
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn fire(&self, timer_id: u64) {
        // Clearing the slot and capturing binding plus state happen under one
        // lock, so a rebind either aborts this timer or comes after the capture
        let prepared = {
            let mut inner = self.lock();
            if inner.pending.as_ref().map(|p| p.id) != Some(timer_id) {
                return;
            }
            inner.pending = None;
            self.prepare(&mut inner)
        };
        if let Some(prepared) = prepared {
            // Failures are classified and logged inside execute
            let _ = self.execute(prepared).await;
        }
    }

    async fn wait_idle(&self) {
        let mut in_flight = self.in_flight.subscribe();
        let _ = in_flight.wait_for(|count| *count == 0).await;
    }

    /// Capture the bound document path and the latest state.
    ///
    /// A returned write counts as in flight until `execute` finishes it.
    fn prepare(&self, inner: &mut Inner) -> Option<Prepared> {
        if inner.disabled {
            return None;
        }
        let binding = inner.binding.as_ref()?;
        let (user, path) = (binding.user.clone(), binding.path.clone());

        let state = self.state.borrow().clone();
        let document = match ProgressDocument::full(&state).to_value() {
            Ok(document) => document,
            Err(e) => {
                warn!(user_id = %user, error = %e, "Failed to encode progress document");
                return None;
            }
        };
        let snapshot = document.to_string();

        if inner.last_written.as_deref() == Some(snapshot.as_str()) {
            inner.skipped += 1;
            debug!(user_id = %user, "Snapshot unchanged, write skipped");
            return None;
        }

        self.in_flight.send_modify(|count| *count += 1);
        Some(Prepared {
            user,
            path,
            generation: inner.generation,
            snapshot,
            document,
        })
    }

    async fn execute(&self, prepared: Prepared) -> Result<(), RemoteError> {
        let _in_flight = InFlight(&self.in_flight);

        let result = self
            .store
            .set_merge(&prepared.path, prepared.document)
            .await;

        let mut inner = self.lock();
        if inner.generation != prepared.generation {
            debug!(user_id = %prepared.user, "User changed during write, result discarded");
            return result;
        }

        match &result {
            Ok(()) => {
                inner.last_written = Some(prepared.snapshot);
                inner.writes += 1;
                inner.last_write_at = Some(Utc::now());
                info!(user_id = %prepared.user, path = %prepared.path, "Progress written");
            }
            Err(e) if e.trips_breaker() => {
                inner.failures += 1;
                inner.disabled = true;
                error!(
                    user_id = %prepared.user,
                    class = e.class(),
                    error = %e,
                    "Progress write failed, sync disabled for this session"
                );
                self.events.emit(TrailEvent::SyncDisabled {
                    user_id: prepared.user.clone(),
                    reason: e.class(),
                });
            }
            Err(e) => {
                inner.failures += 1;
                warn!(
                    user_id = %prepared.user,
                    class = e.class(),
                    error = %e,
                    "Progress write failed, will retry on next change"
                );
            }
        }
        result
    }
}
