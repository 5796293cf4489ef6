use std::path::PathBuf;
use std::time::Instant;

use async_trait::async_trait;
use tokio::fs;

use crate::traits::{Storage, StorageError, StorageResult};
use crate::StorageBackend;

/// Filesystem-backed bucket for development and tests.
///
/// Keys map to paths under `base_path`; the bucket name is nominal.
#[derive(Clone)]
pub struct LocalStorage {
    base_path: PathBuf,
    bucket: String,
}

impl LocalStorage {
    pub async fn new(base_path: impl Into<PathBuf>, bucket: String) -> StorageResult<Self> {
        let base_path = base_path.into();
        fs::create_dir_all(&base_path).await.map_err(|e| {
            StorageError::ConfigError(format!(
                "cannot create storage directory {}: {}",
                base_path.display(),
                e
            ))
        })?;
        Ok(LocalStorage { base_path, bucket })
    }

    /// Resolve a key under the base directory, refusing anything that could
    /// land outside it.
    fn resolve(&self, storage_key: &str) -> StorageResult<PathBuf> {
        let traversal = storage_key.is_empty()
            || storage_key.starts_with('/')
            || storage_key.split('/').any(|segment| segment == "..");
        if traversal {
            return Err(StorageError::InvalidKey(storage_key.to_string()));
        }

        let path = self.base_path.join(storage_key);

        // Existing entries may be symlinks pointing elsewhere
        if let Ok(real) = path.canonicalize() {
            let base = self.base_path.canonicalize()?;
            if !real.starts_with(&base) {
                return Err(StorageError::InvalidKey(format!(
                    "{} resolves outside {}",
                    storage_key,
                    base.display()
                )));
            }
        }

        Ok(path)
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn copy(&self, from_key: &str, to_key: &str) -> StorageResult<()> {
        let from = self.resolve(from_key)?;
        let to = self.resolve(to_key)?;
        let started = Instant::now();

        if !fs::try_exists(&from).await? {
            return Err(StorageError::NotFound(from_key.to_string()));
        }
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent).await?;
        }

        let bytes = fs::copy(&from, &to)
            .await
            .map_err(|e| StorageError::CopyFailed(format!("{} -> {}: {}", from_key, to_key, e)))?;

        tracing::info!(
            from_key = %from_key,
            to_key = %to_key,
            size_bytes = bytes,
            duration_ms = started.elapsed().as_secs_f64() * 1000.0,
            "Local copy successful"
        );
        Ok(())
    }

    async fn delete(&self, storage_key: &str) -> StorageResult<()> {
        let path = self.resolve(storage_key)?;
        match fs::remove_file(&path).await {
            Ok(()) => {
                tracing::debug!(key = %storage_key, "Local delete successful");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::DeleteFailed(format!("{}: {}", storage_key, e))),
        }
    }

    async fn exists(&self, storage_key: &str) -> StorageResult<bool> {
        let path = self.resolve(storage_key)?;
        Ok(fs::try_exists(&path).await?)
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Local
    }

    fn bucket(&self) -> &str {
        &self.bucket
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn storage(dir: &tempfile::TempDir) -> LocalStorage {
        LocalStorage::new(dir.path(), "cadence-test".to_string())
            .await
            .unwrap()
    }

    async fn seed(dir: &tempfile::TempDir, key: &str, data: &[u8]) {
        let path = dir.path().join(key);
        fs::create_dir_all(path.parent().unwrap()).await.unwrap();
        fs::write(path, data).await.unwrap();
    }

    #[tokio::test]
    async fn copy_keeps_source_until_deleted() {
        let dir = tempdir().unwrap();
        let storage = storage(&dir).await;
        seed(&dir, "uploads/u1/song.wav", b"RIFF....WAVE").await;

        storage
            .copy("uploads/u1/song.wav", "media/u1/t1.wav")
            .await
            .unwrap();

        assert!(storage.exists("uploads/u1/song.wav").await.unwrap());
        let copied = fs::read(dir.path().join("media/u1/t1.wav")).await.unwrap();
        assert_eq!(copied, b"RIFF....WAVE");

        storage.delete("uploads/u1/song.wav").await.unwrap();
        assert!(!storage.exists("uploads/u1/song.wav").await.unwrap());
    }

    #[tokio::test]
    async fn copy_missing_source_is_not_found() {
        let dir = tempdir().unwrap();
        let storage = storage(&dir).await;

        let result = storage.copy("uploads/u1/none.mp3", "media/u1/t1.mp3").await;
        assert!(matches!(result, Err(StorageError::NotFound(_))));
        assert!(!storage.exists("media/u1/t1.mp3").await.unwrap());
    }

    #[tokio::test]
    async fn traversal_is_rejected() {
        let dir = tempdir().unwrap();
        let storage = storage(&dir).await;

        let result = storage.copy("../../../etc/passwd", "media/u1/t1.mp3").await;
        assert!(matches!(result, Err(StorageError::InvalidKey(_))));

        let result = storage.delete("media/../../etc/passwd").await;
        assert!(matches!(result, Err(StorageError::InvalidKey(_))));

        let result = storage.exists("/etc/passwd").await;
        assert!(matches!(result, Err(StorageError::InvalidKey(_))));
    }

    #[tokio::test]
    async fn deleting_missing_object_succeeds() {
        let dir = tempdir().unwrap();
        let storage = storage(&dir).await;

        assert!(storage.delete("nonexistent/file.mp3").await.is_ok());
    }

    #[tokio::test]
    async fn reports_bucket_and_backend() {
        let dir = tempdir().unwrap();
        let storage = storage(&dir).await;

        assert_eq!(storage.bucket(), "cadence-test");
        assert_eq!(storage.backend_type(), StorageBackend::Local);
    }
}
