//! Rewarded ad sessions
//!
//! Catalog, session lifecycle, settlement with referral fan-out, countdown,
//! metrics and rate limiting.

pub mod catalog;
pub mod countdown;
pub mod metrics;
pub mod rate_limiter;
pub mod referral;
pub mod session;
pub mod types;

pub use catalog::{AdCatalog, CatalogError, NewAd};
pub use countdown::remaining_secs;
pub use metrics::{AdMetrics, AdMetricsSnapshot, RejectionType};
pub use rate_limiter::{ClaimRateLimiter, RateLimitConfig, RateLimitReason, RateLimitResult};
pub use referral::{ReferralPolicy, DEFAULT_REFERRAL_SHARE_BPS};
pub use session::{
    AdSessionManager, ClaimOutcome, RequestOutcome, SessionConfig, SessionError, SessionView, SignedPayload,
    StartOutcome, StatusOutcome,
};
pub use types::{
    AdOffer, AdSession, Advertisement, ReferralCredit, SessionStatus, Settlement, DEFAULT_REQUIRED_SECONDS,
    MAX_REQUIRED_SECONDS, MIN_REQUIRED_SECONDS,
};
