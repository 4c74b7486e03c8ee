//! Sled-based storage backend
//!
//! Durable key-value storage for balances, ads and sessions. Each logical
//! store is a named [`SledTree`]; guarded batches run as a single sled
//! transaction so the guard checks and the writes commit together.
//!
//! Blocking sled calls run on `spawn_blocking` so handlers never stall the
//! async runtime.

use async_trait::async_trait;
use sled::transaction::{ConflictableTransactionError, ConflictableTransactionResult, TransactionError};
use std::path::Path;
use tracing::{debug, info, warn};

use super::traits::{
    validate_guarded_batch, validate_key, validate_tree_name, validate_value, BatchOp, Guard,
    Result, StorageBackend, StorageError, DEFAULT_SCAN_LIMIT,
};

/// Default cache capacity (64 MB)
pub const DEFAULT_CACHE_CAPACITY: u64 = 64 * 1024 * 1024;

// ============================================================================
// Sled Backend
// ============================================================================

/// Handle to an open sled database
///
/// ```ignore
/// let backend = SledBackend::open("./data/elmas")?;
/// let tree = backend.open_tree("elmas")?;
/// tree.put(b"meta:schema", b"1").await?;
/// ```
#[derive(Clone, Debug)]
pub struct SledBackend {
    db: sled::Db,
}

impl SledBackend {
    /// Open or create a sled database at the given path with the default cache
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_config(path, DEFAULT_CACHE_CAPACITY)
    }

    /// Open or create a sled database with custom cache capacity.
    ///
    /// A corrupted database is reported, never cleared: it holds balances.
    pub fn open_with_config<P: AsRef<Path>>(path: P, cache_capacity: u64) -> Result<Self> {
        let db = sled::Config::default()
            .path(path.as_ref())
            .cache_capacity(cache_capacity)
            .mode(sled::Mode::HighThroughput)
            .open()
            .map_err(|e| {
                let msg = e.to_string();
                let lower = msg.to_lowercase();
                if lower.contains("corrupt") || lower.contains("crc") || lower.contains("checksum") {
                    warn!(
                        "Sled database at {:?} looks corrupted: {}. Restore from backup before restarting.",
                        path.as_ref(),
                        msg
                    );
                }
                StorageError::OpenFailed(msg)
            })?;

        info!(
            "Opened sled database at {:?} with {}MB cache",
            path.as_ref(),
            cache_capacity / (1024 * 1024)
        );
        Ok(Self { db })
    }

    /// Open a temporary database that is removed on drop
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::default()
            .temporary(true)
            .open()
            .map_err(|e| StorageError::OpenFailed(e.to_string()))?;
        Ok(Self { db })
    }

    /// Open a named tree for namespaced storage
    pub fn open_tree(&self, name: &str) -> Result<SledTree> {
        validate_tree_name(name)?;

        let tree = self
            .db
            .open_tree(name)
            .map_err(|e| StorageError::TreeFailed(e.to_string()))?;

        debug!("Opened sled tree: {}", name);
        Ok(SledTree {
            tree,
            name: name.to_string(),
        })
    }

    /// Get database size on disk (approximate)
    pub fn size_on_disk(&self) -> Result<u64> {
        self.db
            .size_on_disk()
            .map_err(|e| StorageError::ReadFailed(e.to_string()))
    }

    /// Flush all pending writes to disk (synchronous)
    pub fn flush_sync(&self) -> Result<()> {
        self.db
            .flush()
            .map_err(|e| StorageError::FlushFailed(e.to_string()))?;
        Ok(())
    }
}

// ============================================================================
// Sled Tree
// ============================================================================

/// A namespaced tree within a sled database
#[derive(Clone, Debug)]
pub struct SledTree {
    tree: sled::Tree,
    name: String,
}

impl SledTree {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Clear all entries in this tree
    pub fn clear(&self) -> Result<()> {
        self.tree
            .clear()
            .map_err(|e| StorageError::DeleteFailed(e.to_string()))?;
        debug!("Cleared tree: {}", self.name);
        Ok(())
    }
}

fn apply_guarded(tree: &sled::Tree, guards: &[Guard], ops: &[BatchOp]) -> Result<()> {
    let outcome = tree.transaction(|tx| -> ConflictableTransactionResult<(), ()> {
        for guard in guards {
            let current = tx.get(guard.key.as_slice())?;
            if current.as_deref() != guard.expected.as_deref() {
                return Err(ConflictableTransactionError::Abort(()));
            }
        }
        for op in ops {
            match op {
                BatchOp::Put { key, value } => {
                    tx.insert(key.as_slice(), value.as_slice())?;
                }
                BatchOp::Delete { key } => {
                    tx.remove(key.as_slice())?;
                }
            }
        }
        Ok(())
    });

    match outcome {
        Ok(()) => Ok(()),
        Err(TransactionError::Abort(())) => Err(StorageError::CasConflict),
        Err(TransactionError::Storage(e)) => Err(StorageError::BatchFailed(e.to_string())),
    }
}

#[async_trait]
impl StorageBackend for SledTree {
    async fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        validate_key(key)?;
        validate_value(value)?;

        let tree = self.tree.clone();
        let key = key.to_vec();
        let value = value.to_vec();

        tokio::task::spawn_blocking(move || {
            tree.insert(key, value)
                .map_err(|e| StorageError::WriteFailed(e.to_string()))
        })
        .await
        .map_err(|e| StorageError::TaskFailed(e.to_string()))??;

        Ok(())
    }

    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        validate_key(key)?;

        let tree = self.tree.clone();
        let key = key.to_vec();

        tokio::task::spawn_blocking(move || {
            tree.get(key)
                .map_err(|e| StorageError::ReadFailed(e.to_string()))
                .map(|opt| opt.map(|v| v.to_vec()))
        })
        .await
        .map_err(|e| StorageError::TaskFailed(e.to_string()))?
    }

    async fn delete(&self, key: &[u8]) -> Result<()> {
        validate_key(key)?;

        let tree = self.tree.clone();
        let key = key.to_vec();

        tokio::task::spawn_blocking(move || {
            tree.remove(key)
                .map_err(|e| StorageError::DeleteFailed(e.to_string()))
        })
        .await
        .map_err(|e| StorageError::TaskFailed(e.to_string()))??;

        Ok(())
    }

    async fn contains(&self, key: &[u8]) -> Result<bool> {
        validate_key(key)?;

        let tree = self.tree.clone();
        let key = key.to_vec();

        tokio::task::spawn_blocking(move || {
            tree.contains_key(key)
                .map_err(|e| StorageError::ReadFailed(e.to_string()))
        })
        .await
        .map_err(|e| StorageError::TaskFailed(e.to_string()))?
    }

    async fn scan_prefix(&self, prefix: &[u8], limit: Option<usize>) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let tree = self.tree.clone();
        let prefix = prefix.to_vec();
        let max = limit.unwrap_or(DEFAULT_SCAN_LIMIT);

        tokio::task::spawn_blocking(move || {
            let mut results = Vec::with_capacity(max.min(1000));
            for item in tree.scan_prefix(prefix).take(max) {
                let (k, v) = item.map_err(|e| StorageError::ScanFailed(e.to_string()))?;
                results.push((k.to_vec(), v.to_vec()));
            }
            Ok(results)
        })
        .await
        .map_err(|e| StorageError::TaskFailed(e.to_string()))?
    }

    async fn write_batch_guarded(&self, guards: &[Guard], ops: &[BatchOp]) -> Result<()> {
        validate_guarded_batch(guards, ops)?;

        let tree = self.tree.clone();
        let guards = guards.to_vec();
        let ops = ops.to_vec();

        tokio::task::spawn_blocking(move || apply_guarded(&tree, &guards, &ops))
            .await
            .map_err(|e| StorageError::TaskFailed(e.to_string()))?
    }

    async fn flush(&self) -> Result<()> {
        let tree = self.tree.clone();

        tokio::task::spawn_blocking(move || {
            tree.flush()
                .map_err(|e| StorageError::FlushFailed(e.to_string()))
        })
        .await
        .map_err(|e| StorageError::TaskFailed(e.to_string()))??;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_tree() -> (SledTree, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let backend = SledBackend::open(temp_dir.path()).unwrap();
        let tree = backend.open_tree("elmas").unwrap();
        (tree, temp_dir)
    }

    #[tokio::test]
    async fn test_basic_put_get() {
        let (tree, _dir) = create_test_tree();

        tree.put(b"user:1", b"alice").await.unwrap();
        assert_eq!(tree.get(b"user:1").await.unwrap(), Some(b"alice".to_vec()));
        assert_eq!(tree.get(b"user:2").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_guarded_batch_commits_all_or_nothing() {
        let (tree, _dir) = create_test_tree();
        tree.put(b"session:a", b"created").await.unwrap();

        // Stale guard: nothing written
        let err = tree
            .write_batch_guarded(
                &[Guard::equals(b"session:a".to_vec(), b"started".to_vec())],
                &[
                    BatchOp::put(b"session:a".to_vec(), b"paid".to_vec()),
                    BatchOp::put(b"user:1".to_vec(), b"100".to_vec()),
                ],
            )
            .await
            .unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(tree.get(b"user:1").await.unwrap(), None);

        tree.write_batch_guarded(
            &[
                Guard::equals(b"session:a".to_vec(), b"created".to_vec()),
                Guard::absent(b"user:1".to_vec()),
            ],
            &[
                BatchOp::put(b"session:a".to_vec(), b"paid".to_vec()),
                BatchOp::put(b"user:1".to_vec(), b"100".to_vec()),
            ],
        )
        .await
        .unwrap();

        assert_eq!(tree.get(b"session:a").await.unwrap(), Some(b"paid".to_vec()));
        assert_eq!(tree.get(b"user:1").await.unwrap(), Some(b"100".to_vec()));
    }

    #[tokio::test]
    async fn test_persistence_across_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().to_path_buf();

        {
            let backend = SledBackend::open(&path).unwrap();
            let tree = backend.open_tree("elmas").unwrap();
            tree.put(b"user:7", b"balance").await.unwrap();
            tree.flush().await.unwrap();
        }

        {
            let backend = SledBackend::open(&path).unwrap();
            let tree = backend.open_tree("elmas").unwrap();
            assert_eq!(tree.get(b"user:7").await.unwrap(), Some(b"balance".to_vec()));
        }
    }

    #[tokio::test]
    async fn test_named_trees_are_isolated() {
        let (tree, dir) = create_test_tree();
        let backend = SledBackend::open(dir.path().join("other")).unwrap();
        let other = backend.open_tree("other").unwrap();

        tree.put(b"k", b"v").await.unwrap();
        assert!(!other.contains(b"k").await.unwrap());
        assert!(backend.open_tree("bad name").is_err());
    }
}
