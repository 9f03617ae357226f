//! File-backed document store
//!
//! Stores each document as pretty-printed JSON under a root directory:
//!
//! ```text
//! {root}/users/{uid}/trilha/status.json
//! ```
//!
//! Writes go to a temp file first and are renamed into place.

use async_trait::async_trait;
use serde_json::Value;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

use super::{merge_documents, RemoteStore};
use crate::error::RemoteError;

pub struct FileStore {
    root_dir: PathBuf,
}

impl FileStore {
    /// Create a store rooted at `root_dir`, creating the directory if needed
    pub async fn new<P: AsRef<Path>>(root_dir: P) -> Result<Self, RemoteError> {
        let root_dir = root_dir.as_ref().to_path_buf();
        fs::create_dir_all(&root_dir).await?;

        info!(path = %root_dir.display(), "Initialized file document store");
        Ok(Self { root_dir })
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    /// Map a logical document path to a file, refusing anything that could
    /// escape the root directory
    fn file_path(&self, path: &str) -> Result<PathBuf, RemoteError> {
        let logical = Path::new(path);
        let safe = logical
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if path.is_empty() || !safe {
            return Err(RemoteError::Other(format!("invalid document path: {}", path)));
        }
        Ok(self.root_dir.join(logical).with_extension("json"))
    }
}

#[async_trait]
impl RemoteStore for FileStore {
    async fn get(&self, path: &str) -> Result<Option<Value>, RemoteError> {
        let file = self.file_path(path)?;
        match fs::read(&file).await {
            Ok(bytes) => {
                let value = serde_json::from_slice(&bytes)?;
                Ok(Some(value))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set_merge(&self, path: &str, document: Value) -> Result<(), RemoteError> {
        let file = self.file_path(path)?;
        if let Some(parent) = file.parent() {
            fs::create_dir_all(parent).await?;
        }

        let existing = self.get(path).await?;
        let merged = merge_documents(existing, document);
        let bytes = serde_json::to_vec_pretty(&merged)?;

        let tmp = file.with_extension("json.tmp");
        fs::write(&tmp, &bytes).await?;
        fs::rename(&tmp, &file).await?;

        debug!(path = %file.display(), bytes = bytes.len(), "Document written");
        Ok(())
    }
}
