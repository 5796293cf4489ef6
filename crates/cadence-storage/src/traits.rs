//! Object-store seam used by the mover.
//!
//! Only the operations a relocation needs are exposed. Audio never streams
//! through the pipeline; every implementation copies inside the store.

use crate::StorageBackend;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Copy failed: {0}")]
    CopyFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Storage backend error: {0}")]
    BackendError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// One bucket of a media object store.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Server-side copy, overwriting `to_key`. `NotFound` if the source is missing.
    async fn copy(&self, from_key: &str, to_key: &str) -> StorageResult<()>;

    /// Remove an object. Removing a missing object succeeds.
    async fn delete(&self, storage_key: &str) -> StorageResult<()>;

    async fn exists(&self, storage_key: &str) -> StorageResult<bool>;

    fn backend_type(&self) -> StorageBackend;

    /// Bucket this store is bound to
    fn bucket(&self) -> &str;
}
