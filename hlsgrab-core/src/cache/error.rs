use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("cache store path not configured")]
    MissingStore,
    #[error("failed to open database at {path}: {source}")]
    OpenDatabase {
        path: PathBuf,
        source: rusqlite::Error,
    },
    #[error("refusing to store an empty manifest list for {key}")]
    EmptyManifests { key: String },
    #[error("cache task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub type CacheResult<T> = std::result::Result<T, CacheError>;
