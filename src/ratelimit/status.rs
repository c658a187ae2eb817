//! Decision metadata handed back to the calling layer.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::limiter::Limiter;

/// Outcome of one rate-limit check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateLimitStatus {
    /// Whether the request may proceed
    pub allowed: bool,
    /// Requests allowed per window
    pub limit: u64,
    /// Requests left in the current window
    pub remaining: u64,
    /// Time until the current window ends
    #[serde(serialize_with = "serialize_secs")]
    pub reset_after: Duration,
    /// Wall-clock end of the current window
    pub resets_at: DateTime<Utc>,
}

impl RateLimitStatus {
    /// Snapshot a limiter right after it decided on a request.
    pub fn from_limiter(limiter: &Limiter, allowed: bool) -> Self {
        Self::from_limiter_at(limiter, allowed, Instant::now())
    }

    /// Snapshot a limiter as of `now`, the instant the decision was made.
    pub fn from_limiter_at(limiter: &Limiter, allowed: bool, now: Instant) -> Self {
        let reset_after = limiter.duration_until_reset_at(now);
        let resets_at = chrono::Duration::from_std(reset_after)
            .ok()
            .and_then(|d| Utc::now().checked_add_signed(d))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        Self {
            allowed,
            limit: limiter.config().request_quota,
            remaining: limiter.remaining_quota(),
            reset_after,
            resets_at,
        }
    }

    /// Whole seconds until reset, rounded up.
    pub fn reset_after_secs(&self) -> u64 {
        let secs = self.reset_after.as_secs();
        if self.reset_after.subsec_nanos() > 0 {
            secs + 1
        } else {
            secs
        }
    }

    /// Response headers describing this decision.
    ///
    /// `Retry-After` is only present on denials.
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        let reset = self.reset_after_secs().to_string();
        let mut headers = vec![
            ("RateLimit-Limit", self.limit.to_string()),
            ("RateLimit-Remaining", self.remaining.to_string()),
            ("RateLimit-Reset", reset.clone()),
        ];
        if !self.allowed {
            headers.push(("Retry-After", reset));
        }
        headers
    }
}

fn serialize_secs<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}
