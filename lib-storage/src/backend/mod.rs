//! Storage backend implementations
//!
//! - [`SledBackend`] / [`SledTree`]: persistent, crash-safe, used in production
//! - [`MemoryBackend`]: in-process, used by tests and `--in-memory` runs

pub mod memory;
pub mod sled_backend;
pub mod traits;

pub use memory::MemoryBackend;
pub use sled_backend::{SledBackend, SledTree};
pub use traits::{BatchOp, Guard, Result, StorageBackend, StorageError};
