//! Telegram signed payload verification
//!
//! Telegram signs two kinds of payloads with the bot's credential, and the
//! secret each is keyed with differs:
//!
//! | Entry point | Signer | Secret |
//! |---|---|---|
//! | [`InitDataVerifier::verify_web_app_init_data`] | Mini App host (`initData`) | `HMAC-SHA256(key = "WebAppData", msg = bot_token)` |
//! | [`InitDataVerifier::verify_login_payload`] | Bot API / login widget | `SHA-256(bot_token)` |
//!
//! Both hash the same data-check string (every field except `hash`, as
//! `key=value`, sorted by key, joined by `\n`) with HMAC-SHA256 and compare
//! the hex digest in constant time. A payload accepted by one entry point is
//! rejected by the other.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;
use tracing::debug;

use lib_types::UserId;

use super::security::{ct_eq_bytes, hmac_sha256, sha256};

/// Domain-separation label for Mini App secrets
const WEB_APP_LABEL: &[u8] = b"WebAppData";

/// Why a payload was rejected. Callers treat every variant as unauthenticated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerifyError {
    #[error("payload has no hash field")]
    MissingHash,

    #[error("payload signature does not match")]
    BadHash,

    #[error("payload is older than the allowed age")]
    Expired,

    #[error("payload user field is malformed")]
    MalformedUser,
}

impl VerifyError {
    /// Stable snake_case reason for logs and API bodies
    pub fn reason(&self) -> &'static str {
        match self {
            VerifyError::MissingHash => "missing_hash",
            VerifyError::BadHash => "bad_hash",
            VerifyError::Expired => "expired",
            VerifyError::MalformedUser => "malformed_user",
        }
    }
}

/// Telegram user as embedded in signed payloads
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TelegramUser {
    pub id: i64,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub language_code: Option<String>,
}

impl TelegramUser {
    pub fn user_id(&self) -> UserId {
        UserId(self.id)
    }

    /// Name to greet the user by: first name, then `@username`, then the id
    pub fn display_name(&self) -> String {
        if let Some(name) = self.first_name.as_deref().filter(|n| !n.is_empty()) {
            return name.to_string();
        }
        if let Some(username) = self.username.as_deref().filter(|n| !n.is_empty()) {
            return format!("@{username}");
        }
        self.id.to_string()
    }
}

/// A payload whose signature checked out
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIdentity {
    pub user: TelegramUser,
    pub auth_date: Option<u64>,
    /// Every signed field except `hash`
    pub fields: BTreeMap<String, String>,
}

impl VerifiedIdentity {
    pub fn user_id(&self) -> UserId {
        self.user.user_id()
    }
}

#[derive(Clone, Copy)]
enum UserSource {
    /// Mini App: `user` field holds a JSON object
    JsonField,
    /// Login widget: `id`, `first_name`, `username` are top-level fields
    FlatFields,
}

/// Verifier for both Telegram signer contexts, keyed by one bot token.
#[derive(Clone)]
pub struct InitDataVerifier {
    web_app_secret: [u8; 32],
    login_secret: [u8; 32],
    max_age_secs: Option<u64>,
}

impl fmt::Debug for InitDataVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InitDataVerifier")
            .field("max_age_secs", &self.max_age_secs)
            .finish_non_exhaustive()
    }
}

impl InitDataVerifier {
    /// `max_age_secs = None` disables the `auth_date` freshness check.
    pub fn new(bot_token: &str, max_age_secs: Option<u64>) -> Self {
        Self {
            web_app_secret: web_app_secret(bot_token),
            login_secret: login_secret(bot_token),
            max_age_secs,
        }
    }

    pub fn max_age_secs(&self) -> Option<u64> {
        self.max_age_secs
    }

    /// Verify a Mini App `initData` string.
    pub fn verify_web_app_init_data(&self, raw: &str, now_secs: u64) -> Result<VerifiedIdentity, VerifyError> {
        verify_with_secret(&self.web_app_secret, raw, now_secs, self.max_age_secs, UserSource::JsonField)
            .inspect_err(|e| debug!(reason = e.reason(), "rejected web app init data"))
    }

    /// Verify a login-widget / Bot API signed payload in query-string form.
    pub fn verify_login_payload(&self, raw: &str, now_secs: u64) -> Result<VerifiedIdentity, VerifyError> {
        verify_with_secret(&self.login_secret, raw, now_secs, self.max_age_secs, UserSource::FlatFields)
            .inspect_err(|e| debug!(reason = e.reason(), "rejected login payload"))
    }
}

fn web_app_secret(bot_token: &str) -> [u8; 32] {
    hmac_sha256(WEB_APP_LABEL, bot_token.as_bytes())
}

fn login_secret(bot_token: &str) -> [u8; 32] {
    sha256(bot_token.as_bytes())
}

/// Split a URL-encoded query string into decoded pairs, preserving order.
fn parse_pairs(raw: &str) -> Result<Vec<(String, String)>, VerifyError> {
    let mut pairs = Vec::new();
    for segment in raw.trim().trim_start_matches('?').split('&') {
        if segment.is_empty() {
            continue;
        }
        let (key, value) = segment.split_once('=').unwrap_or((segment, ""));
        pairs.push((decode_component(key)?, decode_component(value)?));
    }
    Ok(pairs)
}

fn decode_component(s: &str) -> Result<String, VerifyError> {
    let spaced = s.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|decoded| decoded.into_owned())
        .map_err(|_| VerifyError::BadHash)
}

fn data_check_string(fields: &BTreeMap<String, String>) -> String {
    fields
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn verify_with_secret(
    secret: &[u8; 32],
    raw: &str,
    now_secs: u64,
    max_age_secs: Option<u64>,
    source: UserSource,
) -> Result<VerifiedIdentity, VerifyError> {
    let mut hash = None;
    let mut fields = BTreeMap::new();

    for (key, value) in parse_pairs(raw)? {
        if key == "hash" {
            if hash.replace(value).is_some() {
                return Err(VerifyError::BadHash);
            }
        } else if fields.insert(key, value).is_some() {
            // Duplicate keys make the data-check string ambiguous
            return Err(VerifyError::BadHash);
        }
    }

    let supplied = hash.ok_or(VerifyError::MissingHash)?;
    let expected = hex::encode(hmac_sha256(secret, data_check_string(&fields).as_bytes()));
    if !ct_eq_bytes(expected.as_bytes(), supplied.as_bytes()) {
        return Err(VerifyError::BadHash);
    }

    let auth_date = fields.get("auth_date").and_then(|v| v.parse::<u64>().ok());
    if let Some(max_age) = max_age_secs {
        match auth_date {
            Some(signed_at) if now_secs.saturating_sub(signed_at) <= max_age => {}
            _ => return Err(VerifyError::Expired),
        }
    }

    let user = match source {
        UserSource::JsonField => {
            let json = fields.get("user").ok_or(VerifyError::MalformedUser)?;
            serde_json::from_str::<TelegramUser>(json).map_err(|_| VerifyError::MalformedUser)?
        }
        UserSource::FlatFields => TelegramUser {
            id: fields
                .get("id")
                .and_then(|v| v.parse::<i64>().ok())
                .ok_or(VerifyError::MalformedUser)?,
            first_name: fields.get("first_name").cloned(),
            last_name: fields.get("last_name").cloned(),
            username: fields.get("username").cloned(),
            language_code: None,
        },
    };

    Ok(VerifiedIdentity {
        user,
        auth_date,
        fields,
    })
}

fn sign_with_secret(secret: &[u8; 32], pairs: &[(&str, &str)]) -> String {
    let fields: BTreeMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    let hash = hex::encode(hmac_sha256(secret, data_check_string(&fields).as_bytes()));

    let mut encoded: Vec<String> = pairs
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect();
    encoded.push(format!("hash={hash}"));
    encoded.join("&")
}

/// Produce a Mini App `initData` string signed the way Telegram signs it.
/// Used by local tooling and tests.
pub fn sign_web_app_init_data(bot_token: &str, pairs: &[(&str, &str)]) -> String {
    sign_with_secret(&web_app_secret(bot_token), pairs)
}

/// Produce a login-widget payload signed the way Telegram signs it.
pub fn sign_login_payload(bot_token: &str, pairs: &[(&str, &str)]) -> String {
    sign_with_secret(&login_secret(bot_token), pairs)
}
