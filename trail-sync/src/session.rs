//! Per-user trail session
//!
//! One [`TrailSession`] holds the progress of whoever is signed in. Callers
//! read it through accessors or a watch channel, mutate it through
//! `submit_score` / `complete_by_id` / `reset`, and the session takes care of
//! loading the user's document and writing it back.
//!
//! ```text
//!  IdentityProvider ──► switch_user ──► RemoteStore::get ──► decode ──► state
//!                                                                      │
//!  submit_score / complete_by_id / reset ──► engine ──► state ─────────┤
//!                                                                      ▼
//!                                          WriteScheduler ──► RemoteStore::set_merge
//! ```

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use trail_engine::metrics;
use trail_engine::{
    bootstrap_unlocks, Catalog, CompletionOutcome, DocumentShape, NodeStatus, ProgressDocument,
    ProgressState, ScoreOutcome, TrailError, TrailNode, TrailSection, TrailSummary,
};

use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::events::{EventBus, TrailEvent};
use crate::identity::{IdentityProvider, UserId};
use crate::scheduler::{SyncStatus, WriteScheduler};
use crate::store::RemoteStore;

/// Result of loading a user's progress
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "camelCase")]
pub enum LoadOutcome {
    /// A stored document was decoded
    Loaded(DocumentShape),
    /// No user, or the user has no document yet
    Empty,
    /// The read failed or the document was unusable; starting from scratch
    Degraded(String),
    /// Another user took over before the read returned; result dropped
    Superseded,
}

pub struct TrailSession {
    id: Uuid,
    catalog: Arc<Catalog>,
    state: watch::Sender<ProgressState>,
    identity: Arc<dyn IdentityProvider>,
    store: Arc<dyn RemoteStore>,
    config: SyncConfig,
    scheduler: WriteScheduler,
    events: Arc<EventBus>,
    user: Mutex<Option<UserId>>,
    load_generation: AtomicU64,
}

impl TrailSession {
    pub fn new(
        catalog: Arc<Catalog>,
        identity: Arc<dyn IdentityProvider>,
        store: Arc<dyn RemoteStore>,
        config: SyncConfig,
    ) -> Self {
        let (state, state_rx) = watch::channel(fresh_state(&catalog));
        let events = Arc::new(EventBus::with_capacity(config.event_capacity));
        let scheduler = WriteScheduler::new(store.clone(), state_rx, events.clone());

        Self {
            id: Uuid::new_v4(),
            catalog,
            state,
            identity,
            store,
            config,
            scheduler,
            events,
            user: Mutex::new(None),
            load_generation: AtomicU64::new(0),
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.id
    }

    pub fn events(&self) -> Arc<EventBus> {
        self.events.clone()
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn current_user(&self) -> Option<UserId> {
        self.user
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    // =========================================================================
    // Observation
    // =========================================================================

    pub fn snapshot(&self) -> ProgressState {
        self.state.borrow().clone()
    }

    /// Change notifications; the receiver always holds the latest state
    pub fn subscribe(&self) -> watch::Receiver<ProgressState> {
        self.state.subscribe()
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn sections(&self) -> &[TrailSection] {
        self.catalog.sections()
    }

    pub fn find_node(&self, id: &str) -> Option<&TrailNode> {
        self.catalog.find_node(id)
    }

    pub fn route_for(&self, id: &str) -> &str {
        self.catalog.route_for(id)
    }

    pub fn get_status(&self, id: &str) -> NodeStatus {
        self.state.borrow().status(id)
    }

    pub fn node_progress(&self, id: &str) -> u32 {
        metrics::node_progress(&self.state.borrow(), id)
    }

    pub fn best_score(&self, id: &str) -> u32 {
        self.state.borrow().best_score(id)
    }

    pub fn node_xp(&self, id: &str) -> u32 {
        self.state.borrow().node_xp(id)
    }

    pub fn total_xp(&self) -> u32 {
        self.state.borrow().total_xp
    }

    pub fn level(&self) -> u32 {
        metrics::level(self.total_xp())
    }

    pub fn xp_to_next_level(&self) -> u32 {
        metrics::xp_to_next_level(self.total_xp())
    }

    pub fn progress_to_next_level(&self) -> u32 {
        metrics::progress_to_next_level(self.total_xp())
    }

    pub fn achievements_unlocked(&self) -> Vec<u32> {
        metrics::achievements_unlocked(self.total_xp())
    }

    pub fn is_achievement_unlocked(&self, xp_mark: u32) -> bool {
        metrics::is_achievement_unlocked(self.total_xp(), xp_mark)
    }

    /// Rounded percent of completed nodes; 0 for an unknown section
    pub fn section_progress(&self, section_id: &str) -> u32 {
        self.section_by_id(section_id)
            .map(|s| metrics::section_progress(s, &self.state.borrow().status_map))
            .unwrap_or(0)
    }

    pub fn is_section_completed(&self, section_id: &str) -> bool {
        self.section_by_id(section_id)
            .map(|s| metrics::is_section_completed(s, &self.state.borrow().status_map))
            .unwrap_or(false)
    }

    /// Whether the node at `index` of the section is its "start here" node
    pub fn is_current(&self, section_id: &str, index: usize) -> bool {
        self.section_by_id(section_id)
            .map(|s| metrics::is_current(s, index, &self.state.borrow().status_map))
            .unwrap_or(false)
    }

    pub fn summary(&self) -> TrailSummary {
        TrailSummary::compute(&self.catalog, &self.state.borrow())
    }

    fn section_by_id(&self, section_id: &str) -> Option<&TrailSection> {
        self.catalog.sections().iter().find(|s| s.id == section_id)
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Record `correct` out of `total` answers for a node.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn submit_score(
        &self,
        node_id: &str,
        correct: u32,
        total: u32,
    ) -> Result<ScoreOutcome, SyncError> {
        let outcome = self.mutate(|catalog, state| {
            trail_engine::submit_score(catalog, state, node_id, correct, total)
        })?;

        self.events.emit(TrailEvent::ScoreSubmitted {
            node_id: node_id.to_string(),
            score: outcome.score,
            xp_gain: outcome.xp_gain,
            passed: outcome.passed_now,
        });
        if outcome.completed {
            self.events.emit(TrailEvent::NodeCompleted {
                node_id: node_id.to_string(),
                xp_gain: outcome.xp_gain,
            });
        }
        Ok(outcome)
    }

    /// Complete a node without a score (100%).
    ///
    /// Must be called from within a Tokio runtime.
    pub fn complete_by_id(&self, node_id: &str) -> Result<CompletionOutcome, SyncError> {
        let outcome =
            self.mutate(|catalog, state| trail_engine::complete_by_id(catalog, state, node_id))?;

        self.events.emit(TrailEvent::NodeCompleted {
            node_id: node_id.to_string(),
            xp_gain: outcome.xp_gain,
        });
        Ok(outcome)
    }

    /// Wipe the user's progress and write the empty state soon.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn reset(&self) -> Result<(), SyncError> {
        let user = self.require_user()?;

        self.state.send_replace(fresh_state(&self.catalog));
        self.scheduler.expedite(self.config.reset_debounce());

        info!(user_id = %user, session_id = %self.id, "Progress reset");
        self.events.emit(TrailEvent::ProgressReset { user_id: user });
        Ok(())
    }

    fn require_user(&self) -> Result<UserId, SyncError> {
        self.current_user().ok_or(SyncError::NotAuthenticated)
    }

    /// Apply an engine operation to a copy of the state, publish the copy if
    /// it changed and schedule a write
    fn mutate<T, F>(&self, op: F) -> Result<T, SyncError>
    where
        F: FnOnce(&Catalog, &mut ProgressState) -> Result<T, TrailError>,
    {
        self.require_user()?;

        let before = self.snapshot();
        let mut next = before.clone();
        let value = op(&self.catalog, &mut next)?;

        if next != before {
            let (xp_before, xp_after) = (before.total_xp, next.total_xp);
            self.state.send_replace(next);
            self.scheduler.schedule(self.config.debounce());
            self.emit_milestones(xp_before, xp_after);
        }
        Ok(value)
    }

    fn emit_milestones(&self, xp_before: u32, xp_after: u32) {
        let (level_before, level_after) = (metrics::level(xp_before), metrics::level(xp_after));
        if level_after > level_before {
            self.events.emit(TrailEvent::LevelReached { level: level_after });
        }
        for mark in metrics::achievements_unlocked(xp_after) {
            if !metrics::is_achievement_unlocked(xp_before, mark) {
                self.events.emit(TrailEvent::AchievementUnlocked { xp_mark: mark });
            }
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Load progress for whoever the identity provider reports right now
    pub async fn start(&self) -> LoadOutcome {
        self.switch_user(self.identity.current_user()).await
    }

    /// Drop the current user's state and load `user`'s document.
    ///
    /// The previous user's pending write is flushed to their own document
    /// first; nothing of theirs is written to the new user's document.
    pub async fn switch_user(&self, user: Option<UserId>) -> LoadOutcome {
        let generation = self.load_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let path = user.as_ref().map(|u| self.config.document_path(u));

        // The previous user's pending changes still belong in their document
        if let Err(e) = self.scheduler.flush().await {
            warn!(session_id = %self.id, error = %e, "Failed to save progress before switching user");
        }
        if self.load_generation.load(Ordering::SeqCst) != generation {
            return LoadOutcome::Superseded;
        }

        *self.user.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = user.clone();
        self.scheduler.rebind(user.clone(), path.clone());
        self.state.send_replace(fresh_state(&self.catalog));

        let (Some(user), Some(path)) = (user, path) else {
            info!(session_id = %self.id, "No user, progress cleared");
            self.events.emit(TrailEvent::ProgressLoaded {
                user_id: None,
                outcome: LoadOutcome::Empty,
            });
            return LoadOutcome::Empty;
        };

        let read = self.store.get(&path).await;

        if self.load_generation.load(Ordering::SeqCst) != generation {
            debug!(user_id = %user, "User changed during load, result discarded");
            return LoadOutcome::Superseded;
        }

        let (state, outcome) = match read {
            Ok(Some(value)) => match ProgressDocument::decode(&value) {
                Ok(document) => {
                    let shape = document.shape();
                    (document.into_state(&self.catalog), LoadOutcome::Loaded(shape))
                }
                Err(e) => {
                    warn!(user_id = %user, error = %e, "Unreadable progress document, starting empty");
                    (fresh_state(&self.catalog), LoadOutcome::Degraded(e.to_string()))
                }
            },
            Ok(None) => (fresh_state(&self.catalog), LoadOutcome::Empty),
            Err(e) => {
                warn!(
                    user_id = %user,
                    class = e.class(),
                    error = %e,
                    "Failed to read progress, starting empty"
                );
                (fresh_state(&self.catalog), LoadOutcome::Degraded(e.to_string()))
            }
        };

        info!(
            user_id = %user,
            session_id = %self.id,
            outcome = ?outcome,
            total_xp = state.total_xp,
            completed = state.completed_count(),
            "Progress loaded"
        );
        self.state.send_replace(state);
        self.events.emit(TrailEvent::ProgressLoaded {
            user_id: Some(user),
            outcome: outcome.clone(),
        });
        outcome
    }

    /// Follow identity changes in a background task until the provider goes
    /// away
    pub fn follow_identity(self: Arc<Self>) -> JoinHandle<()> {
        let mut identity_rx = self.identity.subscribe();
        identity_rx.borrow_and_update();

        tokio::spawn(async move {
            while identity_rx.changed().await.is_ok() {
                let user = identity_rx.borrow_and_update().clone();
                if user == self.current_user() {
                    continue;
                }
                self.switch_user(user).await;
            }
            debug!(session_id = %self.id, "Identity provider closed");
        })
    }

    /// Write any pending change now
    pub async fn flush(&self) -> Result<(), SyncError> {
        self.scheduler.flush().await
    }

    pub fn sync_status(&self) -> SyncStatus {
        self.scheduler.status()
    }
}

fn fresh_state(catalog: &Catalog) -> ProgressState {
    let mut state = ProgressState::empty();
    bootstrap_unlocks(catalog, &mut state);
    state
}
