//! In-memory document store
//!
//! Holds documents in a concurrent map and counts writes. Failures can be
//! queued up front so tests can drive the synchronizer's error handling.

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::{merge_documents, RemoteStore};
use crate::error::RemoteError;

#[derive(Default)]
pub struct MemoryStore {
    documents: DashMap<String, Value>,
    read_failures: Mutex<VecDeque<RemoteError>>,
    write_failures: Mutex<VecDeque<RemoteError>>,
    read_delay: Mutex<Option<Duration>>,
    write_delay: Mutex<Option<Duration>>,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a document directly, bypassing merge and counters
    pub fn insert(&self, path: impl Into<String>, document: Value) {
        self.documents.insert(path.into(), document);
    }

    /// Current document at `path`
    pub fn document(&self, path: &str) -> Option<Value> {
        self.documents.get(path).map(|d| d.value().clone())
    }

    /// Make the next `get` fail with `error`
    pub fn fail_next_read(&self, error: RemoteError) {
        if let Ok(mut queue) = self.read_failures.lock() {
            queue.push_back(error);
        }
    }

    /// Make the next `set_merge` fail with `error`
    pub fn fail_next_write(&self, error: RemoteError) {
        if let Ok(mut queue) = self.write_failures.lock() {
            queue.push_back(error);
        }
    }

    /// Delay every `get` by `delay` (simulates a slow network)
    pub fn set_read_delay(&self, delay: Option<Duration>) {
        if let Ok(mut slot) = self.read_delay.lock() {
            *slot = delay;
        }
    }

    /// Delay every `set_merge` by `delay`; the document changes after it
    pub fn set_write_delay(&self, delay: Option<Duration>) {
        if let Ok(mut slot) = self.write_delay.lock() {
            *slot = delay;
        }
    }

    /// Number of `get` calls
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Number of `set_merge` calls, including failed ones
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn take_failure(queue: &Mutex<VecDeque<RemoteError>>) -> Option<RemoteError> {
        queue.lock().ok().and_then(|mut q| q.pop_front())
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn get(&self, path: &str) -> Result<Option<Value>, RemoteError> {
        self.reads.fetch_add(1, Ordering::SeqCst);

        let delay = self.read_delay.lock().ok().and_then(|d| *d);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(error) = Self::take_failure(&self.read_failures) {
            return Err(error);
        }
        Ok(self.document(path))
    }

    async fn set_merge(&self, path: &str, document: Value) -> Result<(), RemoteError> {
        self.writes.fetch_add(1, Ordering::SeqCst);

        let delay = self.write_delay.lock().ok().and_then(|d| *d);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(error) = Self::take_failure(&self.write_failures) {
            return Err(error);
        }

        let existing = self.documents.remove(path).map(|(_, v)| v);
        self.documents
            .insert(path.to_string(), merge_documents(existing, document));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_get_and_merge() {
        let store = MemoryStore::new();
        assert_eq!(store.get("users/a").await.unwrap(), None);

        store.set_merge("users/a", json!({ "totalXp": 1 })).await.unwrap();
        store.set_merge("users/a", json!({ "currentNodeId": null })).await.unwrap();

        let doc = store.get("users/a").await.unwrap().unwrap();
        assert_eq!(doc, json!({ "totalXp": 1, "currentNodeId": null }));
        assert_eq!(store.write_count(), 2);
        assert_eq!(store.read_count(), 2);
    }

    #[tokio::test]
    async fn test_injected_failures_are_consumed_once() {
        let store = MemoryStore::new();
        store.fail_next_write(RemoteError::Timeout("slow".into()));
        store.fail_next_read(RemoteError::Unavailable("down".into()));

        assert!(store.set_merge("p", json!({})).await.is_err());
        assert!(store.set_merge("p", json!({})).await.is_ok());
        assert!(store.get("p").await.is_err());
        assert!(store.get("p").await.is_ok());
    }
}
