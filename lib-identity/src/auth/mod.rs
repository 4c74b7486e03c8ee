//! Authentication primitives
//!
//! - [`init_data`]: Telegram signed payload verification (two signer contexts)
//! - [`security`]: constant-time comparison and HMAC helpers
//! - [`session`]: capability token generation for ad sessions

pub mod init_data;
pub mod security;
pub mod session;

pub use init_data::{
    sign_login_payload, sign_web_app_init_data, InitDataVerifier, TelegramUser, VerifiedIdentity,
    VerifyError,
};
pub use security::ct_eq_bytes;
pub use session::generate_session_id;
