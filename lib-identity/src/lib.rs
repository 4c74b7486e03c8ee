//! Identity for the ELMAS node
//!
//! Verifies that a claimed Telegram identity was signed by Telegram, and
//! mints the unguessable capability ids that ad sessions are addressed by.

pub mod auth;

pub use auth::{
    ct_eq_bytes, generate_session_id, sign_login_payload, sign_web_app_init_data, InitDataVerifier,
    TelegramUser, VerifiedIdentity, VerifyError,
};
