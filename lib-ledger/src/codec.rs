//! Record encoding and key layout
//!
//! All records live in one keyspace so that a single guarded batch can touch
//! sessions and accounts together. Keys are `namespace:id`.

use serde::{de::DeserializeOwned, Serialize};

use lib_types::UserId;

use crate::errors::{LedgerError, LedgerResult};

pub const USER_PREFIX: &str = "user:";

pub fn user_key(user_id: UserId) -> Vec<u8> {
    format!("{USER_PREFIX}{user_id}").into_bytes()
}

pub fn encode<T: Serialize>(value: &T) -> LedgerResult<Vec<u8>> {
    bincode::serialize(value).map_err(|e| LedgerError::Codec(e.to_string()))
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> LedgerResult<T> {
    bincode::deserialize(bytes).map_err(|e| LedgerError::Codec(e.to_string()))
}
