//! Capability ids for ad sessions
//!
//! A session id is the only thing a client needs (together with a matching
//! identity) to claim a reward, so it must be unguessable.

use lib_types::{SessionId, UserId};
use rand::RngCore;

const SESSION_ID_LABEL: &[u8] = b"ELMAS_ad_session_v1";

/// Mint a fresh 256-bit session id.
///
/// Mixes 256 bits from the OS CSPRNG with the owner and creation time under
/// blake3, so ids stay unique even if the RNG were to repeat.
pub fn generate_session_id(user_id: UserId, now_secs: u64) -> SessionId {
    let mut random_bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut random_bytes);

    let material = [
        user_id.get().to_le_bytes().as_slice(),
        &now_secs.to_le_bytes(),
        &random_bytes,
        SESSION_ID_LABEL,
    ]
    .concat();

    SessionId::new(*blake3::hash(&material).as_bytes())
}
