//! Error types for trail-sync

use thiserror::Error;
use trail_engine::TrailError;

/// Failure reported by a remote document store
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Quota exhausted: {0}")]
    QuotaExhausted(String),

    #[error("Request timeout: {0}")]
    Timeout(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Malformed document: {0}")]
    Malformed(String),

    #[error("Remote error: {0}")]
    Other(String),
}

impl RemoteError {
    /// Failures after which retrying in this session is pointless
    pub fn trips_breaker(&self) -> bool {
        matches!(
            self,
            RemoteError::Unauthorized(_) | RemoteError::QuotaExhausted(_) | RemoteError::Timeout(_)
        )
    }

    /// Short machine-readable class, used in logs and events
    pub fn class(&self) -> &'static str {
        match self {
            RemoteError::Unauthorized(_) => "unauthorized",
            RemoteError::QuotaExhausted(_) => "quota-exhausted",
            RemoteError::Timeout(_) => "timeout",
            RemoteError::Unavailable(_) => "unavailable",
            RemoteError::Malformed(_) => "malformed",
            RemoteError::Other(_) => "other",
        }
    }
}

impl From<std::io::Error> for RemoteError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::PermissionDenied => RemoteError::Unauthorized(e.to_string()),
            std::io::ErrorKind::TimedOut => RemoteError::Timeout(e.to_string()),
            _ => RemoteError::Unavailable(e.to_string()),
        }
    }
}

impl From<serde_json::Error> for RemoteError {
    fn from(e: serde_json::Error) -> Self {
        RemoteError::Malformed(e.to_string())
    }
}

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Not authenticated")]
    NotAuthenticated,

    #[error(transparent)]
    Trail(#[from] TrailError),

    #[error("Remote write failed: {0}")]
    RemoteWrite(RemoteError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}
