//! Ledger errors

use lib_storage::StorageError;
use lib_types::Amount;
use thiserror::Error;

/// Error during balance operations
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Insufficient balance: have {have}, need {need}")]
    InsufficientBalance { have: Amount, need: Amount },

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Arithmetic overflow")]
    Overflow,

    #[error("Too many concurrent updates to {0}")]
    Contention(String),

    #[error("Record codec error: {0}")]
    Codec(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl LedgerError {
    /// A guarded write lost a race; re-read and retry.
    pub fn is_conflict(&self) -> bool {
        matches!(self, LedgerError::Storage(e) if e.is_conflict())
    }
}

/// Result type for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;
