//! Trail Sync - per-user sessions and persistence for the learning trail
//!
//! Wraps the pure `trail-engine` state in a session that knows who is signed
//! in, loads that user's progress document and writes changes back with a
//! debounce.
//!
//! ## Architecture
//!
//! ```text
//! IdentityProvider ─► TrailSession ─► watch::Sender<ProgressState> ─► UI
//!                          │
//!                          ├─► EventBus (level ups, achievements, sync state)
//!                          └─► WriteScheduler ─► RemoteStore (memory | file)
//! ```
//!
//! ## Storage Layout
//!
//! ```text
//! {data_dir}/
//! ├── users/
//! │   └── {uid}/trilha/status.json   # One progress document per user
//! └── config.toml                    # Configuration
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod identity;
pub mod scheduler;
pub mod session;
pub mod store;

// Re-exports
pub use config::SyncConfig;
pub use error::{RemoteError, SyncError};
pub use events::{spawn_logging_listener, EventBus, TrailEvent};
pub use identity::{IdentityHandle, IdentityProvider, UserId};
pub use scheduler::{SyncStatus, WriteScheduler};
pub use session::{LoadOutcome, TrailSession};
pub use store::{FileStore, MemoryStore, RemoteStore};
