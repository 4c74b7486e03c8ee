//! Key layout and record codec for the node's keyspace
//!
//! Everything lives in one tree so a settlement can guard and write the
//! session, the user and the referrer in one transaction.
//!
//! | Prefix | Record |
//! |---|---|
//! | `user:` | `UserAccount` (owned by `lib-ledger`) |
//! | `ad:` | `Advertisement`, id zero-padded so scans come back in id order |
//! | `session:` | `AdSession`, keyed by hex session id |
//! | `pending:` | `PendingAction` per user |
//! | `meta:` | counters |

use serde::{de::DeserializeOwned, Serialize};

use lib_types::{AdId, SessionId, UserId};

pub const AD_PREFIX: &str = "ad:";
pub const SESSION_PREFIX: &str = "session:";
pub const PENDING_PREFIX: &str = "pending:";
pub const AD_SEQ_KEY: &[u8] = b"meta:ad_seq";

pub fn ad_key(id: AdId) -> Vec<u8> {
    format!("{AD_PREFIX}{:020}", id.0).into_bytes()
}

pub fn session_key(id: &SessionId) -> Vec<u8> {
    format!("{SESSION_PREFIX}{}", id.to_hex()).into_bytes()
}

pub fn pending_key(user_id: UserId) -> Vec<u8> {
    format!("{PENDING_PREFIX}{user_id}").into_bytes()
}

pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, bincode::Error> {
    bincode::serialize(value)
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, bincode::Error> {
    bincode::deserialize(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ad_keys_sort_by_id() {
        assert!(ad_key(AdId(9)) < ad_key(AdId(10)));
        assert_eq!(ad_key(AdId(7)), b"ad:00000000000000000007".to_vec());
    }

    #[test]
    fn test_session_key_is_hex() {
        let key = session_key(&SessionId::new([0xab; 32]));
        assert_eq!(key.len(), SESSION_PREFIX.len() + 64);
    }
}
