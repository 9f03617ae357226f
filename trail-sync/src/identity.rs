//! Identity provider seam
//!
//! The engine only needs "who is the current user, if anyone" plus a way to
//! hear about changes. Authentication itself happens elsewhere.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::info;

/// Identifier of an authenticated user
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Source of the current user identity
pub trait IdentityProvider: Send + Sync {
    /// Current user id, or `None` when signed out
    fn current_user(&self) -> Option<UserId>;

    /// Change notifications; the receiver always holds the latest identity
    fn subscribe(&self) -> watch::Receiver<Option<UserId>>;
}

/// Watch-channel identity provider, driven by whoever owns authentication
pub struct IdentityHandle {
    tx: watch::Sender<Option<UserId>>,
}

impl IdentityHandle {
    pub fn new(initial: Option<UserId>) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx }
    }

    pub fn signed_out() -> Self {
        Self::new(None)
    }

    pub fn sign_in(&self, user: UserId) {
        info!(user_id = %user, "User signed in");
        self.tx.send_replace(Some(user));
    }

    pub fn sign_out(&self) {
        info!("User signed out");
        self.tx.send_replace(None);
    }
}

impl IdentityProvider for IdentityHandle {
    fn current_user(&self) -> Option<UserId> {
        self.tx.borrow().clone()
    }

    fn subscribe(&self) -> watch::Receiver<Option<UserId>> {
        self.tx.subscribe()
    }
}
