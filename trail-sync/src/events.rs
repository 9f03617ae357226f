//! Event system for trail progress
//!
//! Broadcasts what happened to the trail so a UI can react with feedback:
//! - XP toasts and level-up banners
//! - Achievement badges
//! - "Sync disabled" warnings

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, trace, warn};

use crate::identity::UserId;
use crate::session::LoadOutcome;

/// Trail events emitted by a session
#[derive(Debug, Clone, PartialEq)]
pub enum TrailEvent {
    ProgressLoaded {
        user_id: Option<UserId>,
        outcome: LoadOutcome,
    },
    ScoreSubmitted {
        node_id: String,
        score: u32,
        xp_gain: u32,
        passed: bool,
    },
    NodeCompleted {
        node_id: String,
        xp_gain: u32,
    },
    LevelReached {
        level: u32,
    },
    AchievementUnlocked {
        xp_mark: u32,
    },
    ProgressReset {
        user_id: UserId,
    },
    SyncDisabled {
        user_id: UserId,
        reason: &'static str,
    },
}

/// Event bus for broadcasting trail events
pub struct EventBus {
    sender: broadcast::Sender<TrailEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(256)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event to all subscribers
    pub fn emit(&self, event: TrailEvent) {
        trace!(event = ?event, "Emitting trail event");
        // No subscribers is fine
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TrailEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

fn log_event(event: &TrailEvent) {
    match event {
        TrailEvent::LevelReached { level } => info!(level = level, "Level reached"),
        TrailEvent::AchievementUnlocked { xp_mark } => {
            info!(xp_mark = xp_mark, "Achievement unlocked")
        }
        TrailEvent::SyncDisabled { user_id, reason } => {
            warn!(user_id = %user_id, reason = reason, "Progress sync disabled")
        }
        _ => debug!(event = ?event, "Trail event"),
    }
}

/// Spawn a background task that logs all events
pub fn spawn_logging_listener(event_bus: Arc<EventBus>) -> tokio::task::JoinHandle<()> {
    let mut receiver = event_bus.subscribe();

    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(event) => log_event(&event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    debug!(skipped = n, "Event listener lagged, skipped events");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event bus closed, stopping listener");
                    break;
                }
            }
        }
    })
}
