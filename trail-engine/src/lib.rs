//! Trail Engine - learning trail progress for Moneva
//!
//! Tracks which lesson and quiz nodes of the learning trail are locked,
//! unlocked or completed, grants XP on the first successful completion of a
//! node and derives levels, achievements and section progress from it.
//!
//! ## Architecture
//!
//! ```text
//! Catalog (static sections + nodes, trail order)
//!     │
//!     ├─► ProgressState (status, best score, XP ledger, total XP)
//!     │        │
//!     │        ├─► gating    apply_gates / unlock_next_from
//!     │        ├─► scoring   submit_score / complete_by_id
//!     │        └─► metrics   level, achievements, section progress
//!     │
//!     └─► document (full / minimal remote shapes <-> ProgressState)
//! ```
//!
//! Everything here is synchronous and free of I/O. Persistence, identity and
//! change notification live in `trail-sync`.

pub mod catalog;
pub mod document;
pub mod error;
pub mod gating;
pub mod metrics;
pub mod scoring;
pub mod state;

// Re-exports
pub use catalog::{Catalog, NodeKind, NodePosition, TrailNode, TrailSection, DEFAULT_ROUTE};
pub use document::{DocumentShape, FullDocument, MinimalDocument, ProgressDocument};
pub use error::TrailError;
pub use gating::{apply_gates, bootstrap_unlocks, unlock_next_from};
pub use metrics::{SectionSummary, TrailSummary, ACHIEVEMENT_XP_MARKS};
pub use scoring::{base_xp, complete_by_id, submit_score, CompletionOutcome, ScoreOutcome, PASS_THRESHOLD};
pub use state::{NodeStatus, ProgressState, ScoreMap, StatusMap};
