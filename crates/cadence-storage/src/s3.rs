use std::time::Instant;

use async_trait::async_trait;
use object_store::aws::{AmazonS3, AmazonS3Builder};
use object_store::path::Path;
use object_store::Error as ObjectStoreError;
use object_store::ObjectStoreExt;

use crate::traits::{Storage, StorageError, StorageResult};
use crate::StorageBackend;

/// S3 (or S3-compatible) bucket accessed through `object_store`.
#[derive(Clone)]
pub struct S3Storage {
    store: AmazonS3,
    bucket: String,
}

impl S3Storage {
    /// Bind to `bucket`. Credentials come from the standard AWS environment
    /// variables; `endpoint_url` targets MinIO or LocalStack.
    pub fn new(bucket: String, region: String, endpoint_url: Option<String>) -> StorageResult<Self> {
        let mut builder = AmazonS3Builder::from_env()
            .with_region(region)
            .with_bucket_name(&bucket);

        if let Some(endpoint) = endpoint_url {
            builder = builder
                .with_allow_http(endpoint.starts_with("http://"))
                .with_endpoint(endpoint);
        }

        let store = builder
            .build()
            .map_err(|e| StorageError::ConfigError(e.to_string()))?;

        tracing::debug!(bucket = %bucket, "S3 storage initialized");
        Ok(S3Storage { store, bucket })
    }

    fn failure(
        &self,
        op: &'static str,
        key: &str,
        started: Instant,
        err: ObjectStoreError,
        wrap: fn(String) -> StorageError,
    ) -> StorageError {
        if let ObjectStoreError::NotFound { .. } = err {
            return StorageError::NotFound(key.to_string());
        }
        tracing::error!(
            error = %err,
            bucket = %self.bucket,
            key = %key,
            op = op,
            duration_ms = started.elapsed().as_secs_f64() * 1000.0,
            "S3 request failed"
        );
        wrap(err.to_string())
    }
}

#[async_trait]
impl Storage for S3Storage {
    async fn copy(&self, from_key: &str, to_key: &str) -> StorageResult<()> {
        let started = Instant::now();

        // CopyObject; the bytes never leave S3
        self.store
            .copy(&Path::from(from_key), &Path::from(to_key))
            .await
            .map_err(|e| self.failure("copy", from_key, started, e, StorageError::CopyFailed))?;

        tracing::info!(
            bucket = %self.bucket,
            from_key = %from_key,
            to_key = %to_key,
            duration_ms = started.elapsed().as_secs_f64() * 1000.0,
            "S3 copy successful"
        );
        Ok(())
    }

    async fn delete(&self, storage_key: &str) -> StorageResult<()> {
        let started = Instant::now();

        match self.store.delete(&Path::from(storage_key)).await {
            Ok(()) => {}
            Err(ObjectStoreError::NotFound { .. }) => {
                tracing::debug!(key = %storage_key, "S3 object already absent");
            }
            Err(e) => {
                return Err(self.failure(
                    "delete",
                    storage_key,
                    started,
                    e,
                    StorageError::DeleteFailed,
                ))
            }
        }

        tracing::debug!(
            bucket = %self.bucket,
            key = %storage_key,
            duration_ms = started.elapsed().as_secs_f64() * 1000.0,
            "S3 delete successful"
        );
        Ok(())
    }

    async fn exists(&self, storage_key: &str) -> StorageResult<bool> {
        let started = Instant::now();
        match self.store.head(&Path::from(storage_key)).await {
            Ok(_) => Ok(true),
            Err(ObjectStoreError::NotFound { .. }) => Ok(false),
            Err(e) => Err(self.failure(
                "head",
                storage_key,
                started,
                e,
                StorageError::BackendError,
            )),
        }
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::S3
    }

    fn bucket(&self) -> &str {
        &self.bucket
    }
}
