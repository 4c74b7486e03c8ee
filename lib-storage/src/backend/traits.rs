//! Storage backend trait, batch operations and validation.
//!
//! ## Example
//! ```rust,ignore
//! use lib_storage::{BatchOp, Guard, StorageBackend};
//!
//! async fn seal<B: StorageBackend>(backend: &B, old: Vec<u8>, new: Vec<u8>) -> lib_storage::Result<()> {
//!     backend
//!         .write_batch_guarded(
//!             &[Guard::equals(b"session:1".to_vec(), old)],
//!             &[BatchOp::Put { key: b"session:1".to_vec(), value: new }],
//!         )
//!         .await
//! }
//! ```

use async_trait::async_trait;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Storage backend errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// Database failed to open
    #[error("Database open failed: {0}")]
    OpenFailed(String),

    /// Write operation failed
    #[error("Write failed: {0}")]
    WriteFailed(String),

    /// Read operation failed
    #[error("Read failed: {0}")]
    ReadFailed(String),

    /// Delete operation failed
    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    /// Batch operation failed
    #[error("Batch operation failed: {0}")]
    BatchFailed(String),

    /// Scan operation failed
    #[error("Scan failed: {0}")]
    ScanFailed(String),

    /// Flush operation failed
    #[error("Flush failed: {0}")]
    FlushFailed(String),

    /// Tree operation failed
    #[error("Tree operation failed: {0}")]
    TreeFailed(String),

    /// A guard did not hold: the record was modified since it was read
    #[error("Compare-and-swap conflict: value was modified")]
    CasConflict,

    /// Key exceeds maximum allowed size
    #[error("Key exceeds maximum size of {max} bytes (got {actual})")]
    KeyTooLarge { max: usize, actual: usize },

    /// Value exceeds maximum allowed size
    #[error("Value exceeds maximum size of {max} bytes (got {actual})")]
    ValueTooLarge { max: usize, actual: usize },

    /// Empty key not allowed
    #[error("Empty keys are not allowed")]
    EmptyKey,

    /// Invalid tree name
    #[error("Invalid tree name: {0}")]
    InvalidTreeName(String),

    /// Batch exceeds limits
    #[error("Batch exceeds limits: {0}")]
    BatchTooLarge(String),

    /// Task execution failed
    #[error("Task execution failed: {0}")]
    TaskFailed(String),
}

impl StorageError {
    /// True when the failure is an optimistic-concurrency conflict that the
    /// caller may resolve by re-reading and retrying.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StorageError::CasConflict)
    }
}

/// Result type for storage operations
pub type Result<T> = std::result::Result<T, StorageError>;

// ============================================================================
// Constants
// ============================================================================

/// Maximum key size (256 bytes)
pub const MAX_KEY_SIZE: usize = 256;

/// Maximum value size (1 MB; records here are small)
pub const MAX_VALUE_SIZE: usize = 1024 * 1024;

/// Maximum tree name length
pub const MAX_TREE_NAME_LENGTH: usize = 64;

/// Maximum operations per batch
pub const MAX_BATCH_OPS: usize = 1_000;

/// Maximum guards per guarded batch
pub const MAX_BATCH_GUARDS: usize = 64;

/// Default scan limit
pub const DEFAULT_SCAN_LIMIT: usize = 10_000;

// ============================================================================
// Batch Operations
// ============================================================================

/// Batch operation for atomic writes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    /// Insert or update a key-value pair
    Put { key: Vec<u8>, value: Vec<u8> },
    /// Delete a key
    Delete { key: Vec<u8> },
}

impl BatchOp {
    pub fn put(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        BatchOp::Put {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn key(&self) -> &[u8] {
        match self {
            BatchOp::Put { key, .. } | BatchOp::Delete { key } => key,
        }
    }
}

/// Precondition of a guarded batch: `key` must currently hold `expected`
/// (`None` means the key must be absent).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Guard {
    pub key: Vec<u8>,
    pub expected: Option<Vec<u8>>,
}

impl Guard {
    pub fn new(key: impl Into<Vec<u8>>, expected: Option<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            expected,
        }
    }

    pub fn equals(key: impl Into<Vec<u8>>, expected: impl Into<Vec<u8>>) -> Self {
        Self::new(key, Some(expected.into()))
    }

    pub fn absent(key: impl Into<Vec<u8>>) -> Self {
        Self::new(key, None)
    }
}

// ============================================================================
// Storage Backend Trait
// ============================================================================

/// Core storage backend trait
///
/// All implementations must be `Send + Sync` and safe for concurrent access
/// from independent request handlers.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Insert or update a key-value pair
    async fn put(&self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Get a value by key, `None` if absent
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Delete a key. Deleting an absent key is not an error.
    async fn delete(&self, key: &[u8]) -> Result<()>;

    /// Check if a key exists
    async fn contains(&self, key: &[u8]) -> Result<bool>;

    /// Scan all keys with a given prefix in lexicographic order, up to a limit
    async fn scan_prefix(&self, prefix: &[u8], limit: Option<usize>) -> Result<Vec<(Vec<u8>, Vec<u8>)>>;

    /// Execute a batch of operations atomically
    async fn write_batch(&self, ops: &[BatchOp]) -> Result<()> {
        self.write_batch_guarded(&[], ops).await
    }

    /// Atomically verify every guard and apply the batch.
    ///
    /// Either all guards hold and all ops are applied, or nothing is written
    /// and `StorageError::CasConflict` is returned.
    async fn write_batch_guarded(&self, guards: &[Guard], ops: &[BatchOp]) -> Result<()>;

    /// Atomically compare and swap a single value
    async fn compare_and_swap(
        &self,
        key: &[u8],
        expected: Option<&[u8]>,
        new: Option<&[u8]>,
    ) -> Result<()> {
        let guard = Guard::new(key.to_vec(), expected.map(|v| v.to_vec()));
        let op = match new {
            Some(value) => BatchOp::put(key.to_vec(), value.to_vec()),
            None => BatchOp::Delete { key: key.to_vec() },
        };
        self.write_batch_guarded(&[guard], &[op]).await
    }

    /// Flush all pending writes to durable storage
    async fn flush(&self) -> Result<()>;
}

// ============================================================================
// Validation
// ============================================================================

pub(crate) fn validate_key(key: &[u8]) -> Result<()> {
    if key.is_empty() {
        return Err(StorageError::EmptyKey);
    }
    if key.len() > MAX_KEY_SIZE {
        return Err(StorageError::KeyTooLarge {
            max: MAX_KEY_SIZE,
            actual: key.len(),
        });
    }
    Ok(())
}

pub(crate) fn validate_value(value: &[u8]) -> Result<()> {
    if value.len() > MAX_VALUE_SIZE {
        return Err(StorageError::ValueTooLarge {
            max: MAX_VALUE_SIZE,
            actual: value.len(),
        });
    }
    Ok(())
}

pub(crate) fn validate_tree_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(StorageError::InvalidTreeName(
            "Tree name cannot be empty".to_string(),
        ));
    }
    if name.len() > MAX_TREE_NAME_LENGTH {
        return Err(StorageError::InvalidTreeName(format!(
            "Tree name exceeds {} characters",
            MAX_TREE_NAME_LENGTH
        )));
    }
    if !name.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '-') {
        return Err(StorageError::InvalidTreeName(
            "Tree name must contain only alphanumeric characters, underscores, or hyphens".to_string(),
        ));
    }
    Ok(())
}

pub(crate) fn validate_guarded_batch(guards: &[Guard], ops: &[BatchOp]) -> Result<()> {
    if ops.len() > MAX_BATCH_OPS {
        return Err(StorageError::BatchTooLarge(format!(
            "Batch has {} operations, max is {}",
            ops.len(),
            MAX_BATCH_OPS
        )));
    }
    if guards.len() > MAX_BATCH_GUARDS {
        return Err(StorageError::BatchTooLarge(format!(
            "Batch has {} guards, max is {}",
            guards.len(),
            MAX_BATCH_GUARDS
        )));
    }

    for guard in guards {
        validate_key(&guard.key)?;
        if let Some(expected) = &guard.expected {
            validate_value(expected)?;
        }
    }

    for op in ops {
        match op {
            BatchOp::Put { key, value } => {
                validate_key(key)?;
                validate_value(value)?;
            }
            BatchOp::Delete { key } => {
                validate_key(key)?;
            }
        }
    }

    Ok(())
}
