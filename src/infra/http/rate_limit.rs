use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::domain::types::Role;

/// Per-role ceilings for one sliding window.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitTiers {
    pub anonymous: u32,
    pub user: u32,
    pub moderator: u32,
    pub admin: u32,
}

impl RateLimitTiers {
    fn ceiling(&self, tier: Option<Role>) -> u32 {
        match tier {
            None => self.anonymous,
            Some(Role::User) => self.user,
            Some(Role::Moderator) => self.moderator,
            Some(Role::Admin) => self.admin,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
}

/// Sliding-window limiter keyed by caller identity (subject, or client
/// address when anonymous). State is in-process; each instance of the
/// server enforces its own window.
#[derive(Debug, Clone)]
pub struct TieredRateLimiter {
    window: Duration,
    tiers: RateLimitTiers,
    buckets: Arc<DashMap<String, Vec<Instant>>>,
}

impl TieredRateLimiter {
    pub fn new(window: Duration, tiers: RateLimitTiers) -> Self {
        Self {
            window,
            tiers,
            buckets: Arc::new(DashMap::new()),
        }
    }

    pub fn allow(&self, key: &str, tier: Option<Role>) -> RateLimitDecision {
        let limit = self.tiers.ceiling(tier);
        let now = Instant::now();
        let window = self.window;

        let mut entry = self.buckets.entry(key.to_string()).or_default();
        entry.retain(|instant| now.duration_since(*instant) < window);

        let remaining = limit.saturating_sub(entry.len() as u32);
        if remaining == 0 {
            return RateLimitDecision {
                allowed: false,
                limit,
                remaining: 0,
            };
        }

        entry.push(now);
        RateLimitDecision {
            allowed: true,
            limit,
            remaining: remaining.saturating_sub(1),
        }
    }

    pub fn retry_after_secs(&self) -> u64 {
        self.window.as_secs().max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiers() -> RateLimitTiers {
        RateLimitTiers {
            anonymous: 2,
            user: 3,
            moderator: 5,
            admin: 10,
        }
    }

    #[test]
    fn exhausts_the_tier_ceiling_then_rejects() {
        let limiter = TieredRateLimiter::new(Duration::from_secs(60), tiers());

        for expected_remaining in (0..3).rev() {
            let decision = limiter.allow("alice", Some(Role::User));
            assert!(decision.allowed);
            assert_eq!(decision.remaining, expected_remaining);
        }

        let decision = limiter.allow("alice", Some(Role::User));
        assert!(!decision.allowed);
        assert_eq!(decision.limit, 3);
    }

    #[test]
    fn keys_are_isolated() {
        let limiter = TieredRateLimiter::new(Duration::from_secs(60), tiers());
        limiter.allow("alice", Some(Role::User));
        limiter.allow("alice", Some(Role::User));

        let decision = limiter.allow("bob", Some(Role::User));
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 2);
    }

    #[test]
    fn anonymous_callers_get_the_lowest_ceiling() {
        let limiter = TieredRateLimiter::new(Duration::from_secs(60), tiers());
        assert!(limiter.allow("203.0.113.9", None).allowed);
        assert!(limiter.allow("203.0.113.9", None).allowed);
        assert!(!limiter.allow("203.0.113.9", None).allowed);
    }
}
