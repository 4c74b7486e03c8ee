//! ELMAS rewarded-ad node
//!
//! Users watch a short ad, wait out a server-side timer and claim a reward
//! in TL and ELMAS tokens. Settlement is exactly-once per session and pays
//! the user's referrer a share in the same atomic write.

pub mod ads;
pub mod api;
pub mod bot;
pub mod config;
pub mod node;
pub mod store;

pub use node::ElmasNode;
