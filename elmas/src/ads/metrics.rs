//! Ad session metrics
//!
//! Lock-free counters, exported as a JSON snapshot at `GET /metrics`.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Why a claim or start was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionType {
    TooEarly,
    UserMismatch,
    NotFound,
    Expired,
    AdUnavailable,
    Unauthenticated,
}

#[derive(Debug, Default)]
pub struct AdMetrics {
    sessions_created: AtomicU64,
    sessions_started: AtomicU64,
    sessions_expired: AtomicU64,
    no_ad_available: AtomicU64,
    claims_paid: AtomicU64,
    claims_capped: AtomicU64,
    claims_already_paid: AtomicU64,
    referral_credits: AtomicU64,
    rate_limit_denials: AtomicU64,
    too_early: AtomicU64,
    user_mismatch: AtomicU64,
    not_found: AtomicU64,
    expired: AtomicU64,
    ad_unavailable: AtomicU64,
    unauthenticated: AtomicU64,
}

/// Counters for rejection reasons
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectionCounters {
    pub too_early: u64,
    pub user_mismatch: u64,
    pub not_found: u64,
    pub expired: u64,
    pub ad_unavailable: u64,
    pub unauthenticated: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdMetricsSnapshot {
    pub sessions_created: u64,
    pub sessions_started: u64,
    pub sessions_expired: u64,
    pub no_ad_available: u64,
    pub claims_paid: u64,
    pub claims_capped: u64,
    pub claims_already_paid: u64,
    pub referral_credits: u64,
    pub rate_limit_denials: u64,
    pub rejections: RejectionCounters,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl AdMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_session_created(&self) {
        bump(&self.sessions_created);
    }

    pub fn record_session_started(&self) {
        bump(&self.sessions_started);
    }

    pub fn record_session_expired(&self) {
        bump(&self.sessions_expired);
    }

    pub fn record_no_ad_available(&self) {
        bump(&self.no_ad_available);
    }

    pub fn record_claim_paid(&self) {
        bump(&self.claims_paid);
    }

    pub fn record_claim_capped(&self) {
        bump(&self.claims_capped);
    }

    pub fn record_already_paid(&self) {
        bump(&self.claims_already_paid);
    }

    pub fn record_referral_credit(&self) {
        bump(&self.referral_credits);
    }

    pub fn record_rate_limit_denial(&self) {
        bump(&self.rate_limit_denials);
    }

    pub fn record_rejection(&self, reason: RejectionType) {
        let counter = match reason {
            RejectionType::TooEarly => &self.too_early,
            RejectionType::UserMismatch => &self.user_mismatch,
            RejectionType::NotFound => &self.not_found,
            RejectionType::Expired => &self.expired,
            RejectionType::AdUnavailable => &self.ad_unavailable,
            RejectionType::Unauthenticated => &self.unauthenticated,
        };
        bump(counter);
    }

    pub fn snapshot(&self) -> AdMetricsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        AdMetricsSnapshot {
            sessions_created: load(&self.sessions_created),
            sessions_started: load(&self.sessions_started),
            sessions_expired: load(&self.sessions_expired),
            no_ad_available: load(&self.no_ad_available),
            claims_paid: load(&self.claims_paid),
            claims_capped: load(&self.claims_capped),
            claims_already_paid: load(&self.claims_already_paid),
            referral_credits: load(&self.referral_credits),
            rate_limit_denials: load(&self.rate_limit_denials),
            rejections: RejectionCounters {
                too_early: load(&self.too_early),
                user_mismatch: load(&self.user_mismatch),
                not_found: load(&self.not_found),
                expired: load(&self.expired),
                ad_unavailable: load(&self.ad_unavailable),
                unauthenticated: load(&self.unauthenticated),
            },
        }
    }
}
