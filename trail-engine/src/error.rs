//! Error types for trail-engine

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrailError {
    #[error("Unknown node: {0}")]
    UnknownNode(String),

    #[error("Invalid catalog: {0}")]
    InvalidCatalog(String),

    #[error("Malformed progress document: {0}")]
    Document(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
