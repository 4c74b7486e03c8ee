//! Bot command and callback parsing

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;

use lib_types::{Amount, SessionId, UserId};

pub const BUTTON_WATCH_AD: &str = "📺 Watch ad";
pub const BUTTON_WALLET: &str = "💰 Wallet";
pub const BUTTON_REFERRAL: &str = "👥 Referral";

/// Telegram rejects `callback_data` longer than this
pub const MAX_CALLBACK_DATA_BYTES: usize = 64;

const CALLBACK_START: &str = "s";
const CALLBACK_CLAIM: &str = "c";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotCommand {
    /// `/start [referrer_id]`
    Start { referrer: Option<UserId> },
    WatchAd,
    Wallet,
    Referral,
    /// `/convert <ELMAS>`; `None` when the amount is missing or malformed
    Convert(Option<Amount>),
    Admin,
    NewAd,
    Cancel,
    Help,
    /// Anything else, fed to a pending prompt if there is one
    Text(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackAction {
    Start(SessionId),
    Claim(SessionId),
}

impl CallbackAction {
    /// One-letter tag followed by the base64url session id (44 bytes)
    pub fn data(&self) -> String {
        match self {
            CallbackAction::Start(sid) => format!("{CALLBACK_START}{}", URL_SAFE_NO_PAD.encode(sid.as_bytes())),
            CallbackAction::Claim(sid) => format!("{CALLBACK_CLAIM}{}", URL_SAFE_NO_PAD.encode(sid.as_bytes())),
        }
    }
}

pub fn parse_command(text: &str) -> BotCommand {
    let text = text.trim();
    match text {
        BUTTON_WATCH_AD => return BotCommand::WatchAd,
        BUTTON_WALLET => return BotCommand::Wallet,
        BUTTON_REFERRAL => return BotCommand::Referral,
        _ => {}
    }

    let Some(rest) = text.strip_prefix('/') else {
        return BotCommand::Text(text.to_string());
    };
    let (head, arg) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
    // `/cmd@BotName` in group chats
    let name = head.split('@').next().unwrap_or(head).to_ascii_lowercase();
    let arg = arg.trim();

    match name.as_str() {
        "start" => BotCommand::Start {
            referrer: arg.parse().ok(),
        },
        "watch" | "ad" => BotCommand::WatchAd,
        "wallet" | "balance" => BotCommand::Wallet,
        "referral" | "ref" => BotCommand::Referral,
        "convert" => BotCommand::Convert(arg.replace(',', ".").parse().ok().filter(|a: &Amount| !a.is_zero())),
        "admin" => BotCommand::Admin,
        "newad" => BotCommand::NewAd,
        "cancel" => BotCommand::Cancel,
        "help" => BotCommand::Help,
        _ => BotCommand::Text(text.to_string()),
    }
}

pub fn parse_callback(data: &str) -> Option<CallbackAction> {
    if let Some(encoded) = data.strip_prefix(CALLBACK_START) {
        return decode_session_id(encoded).map(CallbackAction::Start);
    }
    if let Some(encoded) = data.strip_prefix(CALLBACK_CLAIM) {
        return decode_session_id(encoded).map(CallbackAction::Claim);
    }
    None
}

fn decode_session_id(encoded: &str) -> Option<SessionId> {
    let bytes: [u8; 32] = URL_SAFE_NO_PAD.decode(encoded).ok()?.try_into().ok()?;
    Some(SessionId::new(bytes))
}
