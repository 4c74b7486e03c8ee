//! Rate limiting for ad endpoints
//!
//! Fixed-window counters per client IP and per Telegram user, so one user
//! cannot hammer claim/start from many addresses and one address cannot
//! cycle through many users.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use lib_types::UserId;

/// Configuration for rate limiting
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub max_requests_per_ip: u32,
    pub max_requests_per_user: u32,
    pub window_duration: Duration,
    /// Tracked keys per map; new keys beyond this are refused
    pub max_entries: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests_per_ip: 100,
            max_requests_per_user: 30,
            window_duration: Duration::from_secs(60),
            max_entries: 10_000,
        }
    }
}

#[derive(Debug, Clone)]
struct RateLimitEntry {
    count: u32,
    window_start: Instant,
}

impl RateLimitEntry {
    fn new() -> Self {
        Self {
            count: 1,
            window_start: Instant::now(),
        }
    }

    fn increment(&mut self, window_duration: Duration) -> u32 {
        let now = Instant::now();
        if now.duration_since(self.window_start) > window_duration {
            self.count = 1;
            self.window_start = now;
        } else {
            self.count = self.count.saturating_add(1);
        }
        self.count
    }
}

/// Result of a rate limit check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitResult {
    Allowed { remaining: u32 },
    Denied {
        reason: RateLimitReason,
        retry_after: Duration,
    },
}

impl RateLimitResult {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateLimitResult::Allowed { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitReason {
    IpLimitExceeded,
    UserLimitExceeded,
    TooManyClients,
}

impl std::fmt::Display for RateLimitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IpLimitExceeded => write!(f, "IP rate limit exceeded"),
            Self::UserLimitExceeded => write!(f, "user rate limit exceeded"),
            Self::TooManyClients => write!(f, "rate limiter at capacity"),
        }
    }
}

pub struct ClaimRateLimiter {
    config: RateLimitConfig,
    ip_limits: Arc<RwLock<HashMap<IpAddr, RateLimitEntry>>>,
    user_limits: Arc<RwLock<HashMap<UserId, RateLimitEntry>>>,
}

impl ClaimRateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            ip_limits: Arc::new(RwLock::new(HashMap::new())),
            user_limits: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(RateLimitConfig::default())
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    async fn check<K>(
        &self,
        map: &RwLock<HashMap<K, RateLimitEntry>>,
        key: K,
        limit: u32,
        reason: RateLimitReason,
    ) -> RateLimitResult
    where
        K: std::hash::Hash + Eq,
    {
        let mut limits = map.write().await;

        let count = match limits.get_mut(&key) {
            Some(entry) => entry.increment(self.config.window_duration),
            None => {
                if limits.len() >= self.config.max_entries {
                    warn!(entries = limits.len(), "rate limit map at capacity, rejecting new client");
                    return RateLimitResult::Denied {
                        reason: RateLimitReason::TooManyClients,
                        retry_after: self.config.window_duration,
                    };
                }
                limits.insert(key, RateLimitEntry::new());
                1
            }
        };

        if count > limit {
            warn!(count, limit, %reason, "rate limit exceeded");
            RateLimitResult::Denied {
                reason,
                retry_after: self.config.window_duration,
            }
        } else {
            debug!(count, limit, "rate check passed");
            RateLimitResult::Allowed {
                remaining: limit - count,
            }
        }
    }

    pub async fn check_ip(&self, ip: IpAddr) -> RateLimitResult {
        self.check(
            &self.ip_limits,
            ip,
            self.config.max_requests_per_ip,
            RateLimitReason::IpLimitExceeded,
        )
        .await
    }

    pub async fn check_user(&self, user_id: UserId) -> RateLimitResult {
        self.check(
            &self.user_limits,
            user_id,
            self.config.max_requests_per_user,
            RateLimitReason::UserLimitExceeded,
        )
        .await
    }

    /// Drop entries whose window ended long ago (call periodically)
    pub async fn cleanup_expired(&self) {
        let now = Instant::now();
        let keep = self.config.window_duration * 2;

        self.ip_limits
            .write()
            .await
            .retain(|_, entry| now.duration_since(entry.window_start) <= keep);
        self.user_limits
            .write()
            .await
            .retain(|_, entry| now.duration_since(entry.window_start) <= keep);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ip_rate_limiting() {
        let limiter = ClaimRateLimiter::new(RateLimitConfig {
            max_requests_per_ip: 3,
            ..Default::default()
        });
        let ip: IpAddr = "192.168.1.1".parse().unwrap();

        assert!(limiter.check_ip(ip).await.is_allowed());
        assert!(limiter.check_ip(ip).await.is_allowed());
        assert!(limiter.check_ip(ip).await.is_allowed());
        assert!(!limiter.check_ip(ip).await.is_allowed());

        let other: IpAddr = "10.0.0.1".parse().unwrap();
        assert!(limiter.check_ip(other).await.is_allowed());
    }

    #[tokio::test]
    async fn test_user_rate_limiting() {
        let limiter = ClaimRateLimiter::new(RateLimitConfig {
            max_requests_per_user: 2,
            ..Default::default()
        });

        assert_eq!(
            limiter.check_user(UserId(1)).await,
            RateLimitResult::Allowed { remaining: 1 }
        );
        assert!(limiter.check_user(UserId(1)).await.is_allowed());
        assert!(matches!(
            limiter.check_user(UserId(1)).await,
            RateLimitResult::Denied {
                reason: RateLimitReason::UserLimitExceeded,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_capacity_rejects_new_clients() {
        let limiter = ClaimRateLimiter::new(RateLimitConfig {
            max_entries: 1,
            ..Default::default()
        });
        assert!(limiter.check_user(UserId(1)).await.is_allowed());
        assert!(matches!(
            limiter.check_user(UserId(2)).await,
            RateLimitResult::Denied {
                reason: RateLimitReason::TooManyClients,
                ..
            }
        ));
        // Known clients keep working
        assert!(limiter.check_user(UserId(1)).await.is_allowed());
    }

    #[tokio::test]
    async fn test_cleanup_keeps_fresh_entries() {
        let limiter = ClaimRateLimiter::with_defaults();
        limiter.check_user(UserId(1)).await;
        limiter.cleanup_expired().await;
        assert_eq!(
            limiter.check_user(UserId(1)).await,
            RateLimitResult::Allowed { remaining: 28 }
        );
    }
}
