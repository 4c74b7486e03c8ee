//! Storage layer for the ELMAS node
//!
//! Provides an async key-value abstraction with conditional batch writes.
//! Every state transition in the node is expressed as exactly one
//! [`StorageBackend::write_batch_guarded`] call, so a transition is either
//! fully committed or not at all.

pub mod backend;

pub use backend::{
    BatchOp, Guard, MemoryBackend, Result, SledBackend, SledTree, StorageBackend, StorageError,
};
