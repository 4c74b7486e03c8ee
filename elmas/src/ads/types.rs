//! Advertisement and ad session records

use serde::{Deserialize, Serialize};
use std::fmt;

use lib_ledger::Balances;
use lib_types::{AdId, Amount, Reward, SessionId, UserId};

use super::countdown;

/// Shortest allowed watch duration
pub const MIN_REQUIRED_SECONDS: u32 = 10;
/// Longest allowed watch duration
pub const MAX_REQUIRED_SECONDS: u32 = 600;
/// Duration used when an ad does not specify one
pub const DEFAULT_REQUIRED_SECONDS: u32 = 15;

const MEDIA_EXTENSIONS: &[&str] = &[".mp4", ".webm", ".mov", ".m4v", ".m3u8", ".gif"];
const MIN_MEDIA_HANDLE_LEN: usize = 16;

/// Clamp a configured watch duration into the supported range
pub fn clamp_required_seconds(seconds: Option<u32>) -> u32 {
    seconds
        .unwrap_or(DEFAULT_REQUIRED_SECONDS)
        .clamp(MIN_REQUIRED_SECONDS, MAX_REQUIRED_SECONDS)
}

/// Basic playability check for an ad's content reference.
///
/// Accepts an `http(s)` URL with a host and a video extension, or an opaque
/// Telegram media handle (no scheme, URL-safe characters only).
pub fn is_well_formed_content(reference: &str) -> bool {
    let reference = reference.trim();
    if reference.is_empty() || reference.chars().any(char::is_whitespace) {
        return false;
    }

    if let Some((scheme, rest)) = reference.split_once("://") {
        if scheme != "https" && scheme != "http" {
            return false;
        }
        let (host, path) = rest.split_once('/').unwrap_or((rest, ""));
        if host.is_empty() {
            return false;
        }
        let path = path.split(['?', '#']).next().unwrap_or("").to_ascii_lowercase();
        return MEDIA_EXTENSIONS.iter().any(|ext| path.ends_with(ext));
    }

    reference.len() >= MIN_MEDIA_HANDLE_LEN
        && reference
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Catalog entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Advertisement {
    pub id: AdId,
    pub title: String,
    pub content_reference: String,
    pub required_seconds: u32,
    pub reward: Reward,
    pub is_active: bool,
    pub expires_at: Option<u64>,
    pub created_at: u64,
}

impl Advertisement {
    /// Active, unexpired and playable at `now`
    pub fn is_eligible(&self, now: u64) -> bool {
        self.is_active
            && self.expires_at.map_or(true, |expires_at| expires_at > now)
            && is_well_formed_content(&self.content_reference)
    }
}

/// Session lifecycle. Variants are declared in lifecycle order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Created,
    Started,
    Completed,
    Paid,
    Expired,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Created => "created",
            SessionStatus::Started => "started",
            SessionStatus::Completed => "completed",
            SessionStatus::Paid => "paid",
            SessionStatus::Expired => "expired",
        }
    }

    /// Paid and expired sessions never change again
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Paid | SessionStatus::Expired)
    }

    /// Allowed edges of the state machine
    pub fn can_transition_to(&self, next: SessionStatus) -> bool {
        use SessionStatus::*;
        matches!(
            (self, next),
            (Created, Started)
                | (Created, Completed)
                | (Started, Completed)
                | (Completed, Paid)
                | (Created, Expired)
                | (Started, Expired)
                | (Completed, Expired)
        )
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// "Session S's settlement credited referrer R with `amount`"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferralCredit {
    pub referrer: UserId,
    pub amount: Reward,
}

/// A single-use, time-gated claim on one ad reward
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdSession {
    pub session_id: SessionId,
    pub user_id: UserId,
    pub ad_id: AdId,
    /// Snapshot taken at creation
    pub required_seconds: u32,
    pub created_at: u64,
    pub started_at: Option<u64>,
    pub completed_at: Option<u64>,
    pub paid_at: Option<u64>,
    /// `created_at + required_seconds + grace`
    pub deadline: u64,
    pub status: SessionStatus,
    /// What the owner received; zero when sealed over the daily cap
    pub credited: Reward,
    pub capped: bool,
    pub referral: Option<ReferralCredit>,
}

impl AdSession {
    pub fn new(
        session_id: SessionId,
        user_id: UserId,
        ad_id: AdId,
        required_seconds: u32,
        now: u64,
        grace_secs: u64,
    ) -> Self {
        Self {
            session_id,
            user_id,
            ad_id,
            required_seconds,
            created_at: now,
            started_at: None,
            completed_at: None,
            paid_at: None,
            deadline: now
                .saturating_add(u64::from(required_seconds))
                .saturating_add(grace_secs),
            status: SessionStatus::Created,
            credited: Reward::ZERO,
            capped: false,
            referral: None,
        }
    }

    /// Start of the watch timer: the explicit start if there was one,
    /// otherwise creation
    pub fn gate_origin(&self) -> u64 {
        self.started_at.unwrap_or(self.created_at)
    }

    pub fn remaining_secs(&self, now: u64) -> u64 {
        countdown::remaining_secs(now, self.gate_origin(), self.required_seconds)
    }

    /// Past the deadline and never paid
    pub fn is_overdue(&self, now: u64) -> bool {
        now > self.deadline && self.paid_at.is_none()
    }

    /// A watch started at `now` would end after the deadline
    pub fn too_late_to_start(&self, now: u64) -> bool {
        now.saturating_add(u64::from(self.required_seconds)) > self.deadline
    }

    /// Move to `next`, stamping the matching timestamp.
    pub fn advance(&mut self, next: SessionStatus, now: u64) -> Result<(), InvalidTransition> {
        if !self.status.can_transition_to(next) {
            return Err(InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        match next {
            SessionStatus::Started => self.started_at = Some(now),
            SessionStatus::Completed => self.completed_at = Some(now),
            SessionStatus::Paid => self.paid_at = Some(now),
            SessionStatus::Created | SessionStatus::Expired => {}
        }
        self.status = next;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("session cannot move from {from} to {to}")]
pub struct InvalidTransition {
    pub from: SessionStatus,
    pub to: SessionStatus,
}

/// What `request_ad` hands back to the presentation layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdOffer {
    pub session_id: SessionId,
    pub ad_title: String,
    pub content_reference: String,
    pub required_seconds: u32,
    pub reward_currency: Amount,
    pub reward_token: Amount,
    /// Mini App link for this session
    pub watch_url: String,
}

/// Result of a settled claim
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Settlement {
    pub session_id: SessionId,
    pub reward_currency: Amount,
    pub reward_token: Amount,
    pub new_balances: Balances,
    pub referral: Option<ReferralCredit>,
    pub paid_at: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_required_seconds() {
        assert_eq!(clamp_required_seconds(None), 15);
        assert_eq!(clamp_required_seconds(Some(3)), 10);
        assert_eq!(clamp_required_seconds(Some(30)), 30);
        assert_eq!(clamp_required_seconds(Some(100_000)), 600);
    }

    #[test]
    fn test_content_reference_checks() {
        assert!(is_well_formed_content("https://cdn.example.com/ads/spot.mp4"));
        assert!(is_well_formed_content("https://cdn.example.com/a.WEBM?sig=1"));
        assert!(is_well_formed_content("BAACAgIAAxkBAAIBQ2X"));
        assert!(!is_well_formed_content(""));
        assert!(!is_well_formed_content("ftp://cdn.example.com/a.mp4"));
        assert!(!is_well_formed_content("https:///a.mp4"));
        assert!(!is_well_formed_content("https://cdn.example.com/page.html"));
        assert!(!is_well_formed_content("short"));
        assert!(!is_well_formed_content("https://cdn.example.com/a b.mp4"));
    }

    #[test]
    fn test_transitions_are_monotonic() {
        let mut session = AdSession::new(SessionId::new([1; 32]), UserId(1), AdId(1), 15, 100, 180);
        assert_eq!(session.deadline, 295);

        session.advance(SessionStatus::Started, 101).unwrap();
        assert_eq!(session.gate_origin(), 101);
        assert!(session.advance(SessionStatus::Created, 102).is_err());
        assert!(session.advance(SessionStatus::Paid, 102).is_err());

        session.advance(SessionStatus::Completed, 120).unwrap();
        session.advance(SessionStatus::Paid, 120).unwrap();
        assert_eq!(session.paid_at, Some(120));
        assert!(session.advance(SessionStatus::Expired, 999).is_err());
        assert!(session.advance(SessionStatus::Paid, 999).is_err());
    }

    #[test]
    fn test_overdue_only_when_unpaid() {
        let mut session = AdSession::new(SessionId::new([2; 32]), UserId(1), AdId(1), 15, 0, 180);
        assert!(!session.is_overdue(195));
        assert!(session.is_overdue(196));
        session.paid_at = Some(20);
        assert!(!session.is_overdue(1_000));
    }

    #[test]
    fn test_late_start_window() {
        let session = AdSession::new(SessionId::new([3; 32]), UserId(1), AdId(1), 15, 0, 180);
        assert!(!session.too_late_to_start(0));
        assert!(!session.too_late_to_start(180));
        assert!(session.too_late_to_start(181));
        assert!(session.too_late_to_start(195));
    }
}
