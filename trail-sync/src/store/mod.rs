//! Remote document store seam
//!
//! Progress lives in one document per user at a fixed logical path. The
//! engine needs only `get` and `set_merge`; it assumes no transactions
//! across sessions (last write wins).
//!
//! ## Implementations
//!
//! - [`MemoryStore`] - in-process map with failure injection, for tests
//! - [`FileStore`] - one JSON file per document under a root directory

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::RemoteError;

/// Per-user document store
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Fetch the document at `path`, `None` if it does not exist
    async fn get(&self, path: &str) -> Result<Option<Value>, RemoteError>;

    /// Write `document` at `path`, merging top-level keys into any existing
    /// object
    async fn set_merge(&self, path: &str, document: Value) -> Result<(), RemoteError>;
}

/// Shallow merge: top-level keys of `incoming` replace those of `existing`.
/// Non-object values replace the document wholesale.
pub fn merge_documents(existing: Option<Value>, incoming: Value) -> Value {
    match (existing, incoming) {
        (Some(Value::Object(mut base)), Value::Object(update)) => {
            for (key, value) in update {
                base.insert(key, value);
            }
            Value::Object(base)
        }
        (_, incoming) => incoming,
    }
}
