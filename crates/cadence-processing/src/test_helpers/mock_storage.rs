//! In-memory object store bound to one bucket

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use cadence_storage::{Storage, StorageBackend, StorageError, StorageResult};

pub struct MemoryStorage {
    bucket: String,
    files: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    calls: Mutex<Vec<(&'static str, String)>>,
    fail_copies: AtomicBool,
    fail_deletes: AtomicBool,
    copy_delay: Mutex<Option<Duration>>,
}

impl MemoryStorage {
    pub fn new(bucket: &str) -> Self {
        Self {
            bucket: bucket.to_string(),
            files: Arc::new(Mutex::new(HashMap::new())),
            calls: Mutex::new(Vec::new()),
            fail_copies: AtomicBool::new(false),
            fail_deletes: AtomicBool::new(false),
            copy_delay: Mutex::new(None),
        }
    }

    /// Seed an object without counting a call
    pub fn put(&self, key: &str, data: &[u8]) {
        self.files.lock().unwrap().insert(key.to_string(), data.to_vec());
    }

    pub fn contains(&self, key: &str) -> bool {
        self.files.lock().unwrap().contains_key(key)
    }

    pub fn fail_copies(&self, fail: bool) {
        self.fail_copies.store(fail, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    /// Make every copy sleep before it lands
    pub fn delay_copies(&self, delay: Duration) {
        *self.copy_delay.lock().unwrap() = Some(delay);
    }

    /// Copies that actually completed
    pub fn copy_count(&self) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(op, _)| *op == "copy")
            .count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn record(&self, op: &'static str, key: &str) {
        self.calls.lock().unwrap().push((op, key.to_string()));
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn copy(&self, from_key: &str, to_key: &str) -> StorageResult<()> {
        let delay = *self.copy_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_copies.load(Ordering::SeqCst) {
            self.record("copy_failed", from_key);
            return Err(StorageError::CopyFailed(format!(
                "{} -> {}: injected failure",
                from_key, to_key
            )));
        }
        let mut files = self.files.lock().unwrap();
        let data = files
            .get(from_key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(from_key.to_string()))?;
        files.insert(to_key.to_string(), data);
        drop(files);
        self.record("copy", from_key);
        Ok(())
    }

    async fn delete(&self, storage_key: &str) -> StorageResult<()> {
        self.record("delete", storage_key);
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(StorageError::DeleteFailed(format!(
                "{}: injected failure",
                storage_key
            )));
        }
        self.files.lock().unwrap().remove(storage_key);
        Ok(())
    }

    async fn exists(&self, storage_key: &str) -> StorageResult<bool> {
        self.record("exists", storage_key);
        Ok(self.contains(storage_key))
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Local
    }

    fn bucket(&self) -> &str {
        &self.bucket
    }
}
