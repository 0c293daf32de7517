//! Per-user request budgets for the sync endpoints.
//!
//! Each endpoint owns a fixed-window budget keyed by authenticated user id.
//! Windows that have run out are swept at most once per window length, so
//! the table only holds users seen within the last window.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::config::AppConfig;
use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncEndpoint {
    Push,
    Pull,
}

impl SyncEndpoint {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Push => "sync_push",
            Self::Pull => "sync_pull",
        }
    }
}

/// Counters reported by `/healthz`
#[derive(Debug, Clone, Copy, Serialize)]
pub struct RateLimitCounters {
    pub push_allowed: u64,
    pub push_limited: u64,
    pub pull_allowed: u64,
    pub pull_limited: u64,
}

pub struct SyncRateLimiter {
    push: Budget,
    pull: Budget,
}

impl SyncRateLimiter {
    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.rate_limit_window,
            config.push_rate_limit_per_window,
            config.pull_rate_limit_per_window,
        )
    }

    fn new(window: Duration, push_limit: u32, pull_limit: u32) -> Self {
        Self {
            push: Budget::new(window, push_limit),
            pull: Budget::new(window, pull_limit),
        }
    }

    /// Spend one request of `user_id`'s budget, or refuse with the seconds
    /// left in the current window.
    pub fn admit(&self, endpoint: SyncEndpoint, user_id: &str) -> Result<(), AppError> {
        let Err(wait) = self.budget(endpoint).spend(user_id, Instant::now()) else {
            return Ok(());
        };

        let retry_after_secs = (wait.as_secs() + u64::from(wait.subsec_nanos() > 0)).max(1);
        tracing::warn!(
            endpoint = endpoint.label(),
            user = user_fingerprint(user_id),
            retry_after_secs,
            "Rate limit exceeded"
        );
        Err(AppError::too_many_requests(
            format!("Rate limit exceeded for {}", endpoint.label()),
            retry_after_secs,
        ))
    }

    pub fn counters(&self) -> RateLimitCounters {
        RateLimitCounters {
            push_allowed: self.push.allowed.load(Ordering::Relaxed),
            push_limited: self.push.limited.load(Ordering::Relaxed),
            pull_allowed: self.pull.allowed.load(Ordering::Relaxed),
            pull_limited: self.pull.limited.load(Ordering::Relaxed),
        }
    }

    const fn budget(&self, endpoint: SyncEndpoint) -> &Budget {
        match endpoint {
            SyncEndpoint::Push => &self.push,
            SyncEndpoint::Pull => &self.pull,
        }
    }
}

struct Budget {
    window: Duration,
    limit: u32,
    users: Mutex<UserWindows>,
    allowed: AtomicU64,
    limited: AtomicU64,
}

#[derive(Default)]
struct UserWindows {
    open: HashMap<String, Window>,
    next_sweep: Option<Instant>,
}

#[derive(Debug, Clone, Copy)]
struct Window {
    opened_at: Instant,
    used: u32,
}

impl Budget {
    fn new(window: Duration, limit: u32) -> Self {
        Self {
            window,
            limit,
            users: Mutex::new(UserWindows::default()),
            allowed: AtomicU64::new(0),
            limited: AtomicU64::new(0),
        }
    }

    /// Returns how long the caller must wait when the budget is spent.
    fn spend(&self, user_id: &str, now: Instant) -> Result<(), Duration> {
        // Counters only; a panicked holder cannot leave them inconsistent
        let mut users = self.users.lock().unwrap_or_else(PoisonError::into_inner);
        self.sweep(&mut users, now);

        let window = users
            .open
            .entry(user_id.to_string())
            .or_insert(Window {
                opened_at: now,
                used: 0,
            });
        let elapsed = now.saturating_duration_since(window.opened_at);
        if elapsed >= self.window {
            *window = Window {
                opened_at: now,
                used: 0,
            };
        }

        if window.used >= self.limit {
            self.limited.fetch_add(1, Ordering::Relaxed);
            return Err(self.window.saturating_sub(elapsed));
        }
        window.used += 1;
        self.allowed.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn sweep(&self, users: &mut UserWindows, now: Instant) {
        if users.next_sweep.is_some_and(|due| now < due) {
            return;
        }
        let window = self.window;
        users
            .open
            .retain(|_, open| now.saturating_duration_since(open.opened_at) < window);
        users.next_sweep = Some(now + window);
    }

    #[cfg(test)]
    fn tracked_users(&self) -> usize {
        self.users
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .open
            .len()
    }
}

/// Stable per-process hash so logs never carry raw user ids
pub fn user_fingerprint(user_id: &str) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    user_id.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_budget_refuses_after_limit() {
        let limiter = SyncRateLimiter::new(Duration::from_secs(60), 2, 5);

        limiter.admit(SyncEndpoint::Push, "user-a").unwrap();
        limiter.admit(SyncEndpoint::Push, "user-a").unwrap();
        let err = limiter.admit(SyncEndpoint::Push, "user-a").unwrap_err();
        assert!(matches!(err, AppError::TooManyRequests(_, retry) if (1..=60).contains(&retry)));

        let counters = limiter.counters();
        assert_eq!(counters.push_allowed, 2);
        assert_eq!(counters.push_limited, 1);
        assert_eq!(counters.pull_allowed, 0);
    }

    #[test]
    fn budgets_are_per_user_and_endpoint() {
        let limiter = SyncRateLimiter::new(Duration::from_secs(60), 1, 1);

        limiter.admit(SyncEndpoint::Push, "user-a").unwrap();
        limiter.admit(SyncEndpoint::Push, "user-b").unwrap();
        limiter.admit(SyncEndpoint::Pull, "user-a").unwrap();
        assert!(limiter.admit(SyncEndpoint::Pull, "user-a").is_err());
    }

    #[test]
    fn window_resets_after_it_elapses() {
        let budget = Budget::new(Duration::from_secs(10), 1);
        let start = Instant::now();

        budget.spend("user-a", start).unwrap();
        let wait = budget
            .spend("user-a", start + Duration::from_secs(4))
            .unwrap_err();
        assert_eq!(wait, Duration::from_secs(6));
        budget
            .spend("user-a", start + Duration::from_secs(10))
            .unwrap();
    }

    #[test]
    fn expired_windows_are_swept() {
        let budget = Budget::new(Duration::from_secs(10), 5);
        let start = Instant::now();

        for user in ["a", "b", "c"] {
            budget.spend(user, start).unwrap();
        }
        assert_eq!(budget.tracked_users(), 3);

        // Before the sweep is due nothing is dropped
        budget.spend("d", start + Duration::from_secs(5)).unwrap();
        assert_eq!(budget.tracked_users(), 4);

        budget.spend("e", start + Duration::from_secs(12)).unwrap();
        assert_eq!(budget.tracked_users(), 2);
    }
}
