//! Fixed-window limiter for a single key.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Upper bound used when `now + quota_duration` cannot be represented.
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Quota settings shared by every limiter of one rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitConfig {
    /// Maximum requests allowed per window
    pub request_quota: u64,
    /// Length of the fixed window
    pub quota_duration: Duration,
}

impl LimitConfig {
    /// Create a new limit configuration.
    pub fn new(request_quota: u64, quota_duration: Duration) -> Self {
        Self {
            request_quota,
            quota_duration,
        }
    }
}

/// Request counter for one key over one window.
///
/// A limiter lives for exactly one window. Once `resets_at` has passed it is
/// expired and the owning store swaps in a fresh instance rather than
/// resetting this one, so the counter only ever grows.
#[derive(Debug)]
pub struct Limiter {
    /// The configuration this limiter was created with
    config: LimitConfig,
    /// Requests counted in this window, including denied ones
    counter: AtomicU64,
    /// When this window started
    created_at: Instant,
    /// When this window ends
    resets_at: Instant,
}

impl Limiter {
    /// Create a new limiter whose window starts now.
    pub fn new(config: LimitConfig) -> Self {
        Self::new_at(config, Instant::now())
    }

    /// Create a new limiter whose window starts at `now`.
    pub fn new_at(config: LimitConfig, now: Instant) -> Self {
        let resets_at = now
            .checked_add(config.quota_duration)
            .unwrap_or_else(|| now + FAR_FUTURE);

        Self {
            config,
            counter: AtomicU64::new(0),
            created_at: now,
            resets_at,
        }
    }

    /// Whether the counter has reached the quota.
    pub fn has_exceeded_quota(&self) -> bool {
        self.counter() >= self.config.request_quota
    }

    /// Requests left in this window, never below zero.
    pub fn remaining_quota(&self) -> u64 {
        self.config.request_quota.saturating_sub(self.counter())
    }

    /// Count one request and decide whether it may proceed.
    ///
    /// The decision uses the value before this request is counted, so exactly
    /// `request_quota` requests pass per window. Denied requests are still
    /// counted.
    pub fn validate_and_update(&self) -> bool {
        let previous = self.counter.fetch_add(1, Ordering::AcqRel);
        previous < self.config.request_quota
    }

    /// Whether the window has elapsed at `now`.
    pub fn is_expired_at(&self, now: Instant) -> bool {
        now >= self.resets_at
    }

    /// Whether the window has elapsed.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }

    /// Time left until the window ends, zero once expired.
    pub fn duration_until_reset(&self) -> Duration {
        self.duration_until_reset_at(Instant::now())
    }

    /// Time left at `now` until the window ends.
    pub fn duration_until_reset_at(&self, now: Instant) -> Duration {
        self.resets_at.saturating_duration_since(now)
    }

    /// Get the number of requests counted so far.
    pub fn counter(&self) -> u64 {
        self.counter.load(Ordering::Acquire)
    }

    /// Get the configuration for this limiter.
    pub fn config(&self) -> &LimitConfig {
        &self.config
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn resets_at(&self) -> Instant {
        self.resets_at
    }
}
