//! In-memory backend for tests and `--in-memory` runs
//!
//! All data is lost on process termination. Guarded batches are checked and
//! applied under one write lock, which gives the same atomicity as the sled
//! transaction.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::traits::{
    validate_guarded_batch, validate_key, validate_value, BatchOp, Guard, Result, StorageBackend,
    StorageError, DEFAULT_SCAN_LIMIT,
};

/// Thread-safe ordered map shared behind `Arc<RwLock<_>>`
#[derive(Clone, Debug, Default)]
pub struct MemoryBackend {
    storage: Arc<RwLock<BTreeMap<Vec<u8>, Vec<u8>>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.storage.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.read().is_empty()
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        validate_key(key)?;
        validate_value(value)?;
        self.storage.write().insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        validate_key(key)?;
        Ok(self.storage.read().get(key).cloned())
    }

    async fn delete(&self, key: &[u8]) -> Result<()> {
        validate_key(key)?;
        self.storage.write().remove(key);
        Ok(())
    }

    async fn contains(&self, key: &[u8]) -> Result<bool> {
        validate_key(key)?;
        Ok(self.storage.read().contains_key(key))
    }

    async fn scan_prefix(&self, prefix: &[u8], limit: Option<usize>) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let max = limit.unwrap_or(DEFAULT_SCAN_LIMIT);
        let storage = self.storage.read();
        Ok(storage
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .take(max)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    async fn write_batch_guarded(&self, guards: &[Guard], ops: &[BatchOp]) -> Result<()> {
        validate_guarded_batch(guards, ops)?;

        let mut storage = self.storage.write();
        for guard in guards {
            if storage.get(&guard.key).map(Vec::as_slice) != guard.expected.as_deref() {
                return Err(StorageError::CasConflict);
            }
        }
        for op in ops {
            match op {
                BatchOp::Put { key, value } => {
                    storage.insert(key.clone(), value.clone());
                }
                BatchOp::Delete { key } => {
                    storage.remove(key);
                }
            }
        }
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        Ok(())
    }
}
