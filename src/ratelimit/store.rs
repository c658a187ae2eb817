//! Per-key limiter registry with lazy window rotation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::debug;

use super::limiter::{LimitConfig, Limiter};

/// Owns the authoritative limiter for every key of one rule.
///
/// A single lock guards the whole map so the look-up, expiry check and
/// replacement in [`LimiterStore::get`] happen as one step. Expired entries
/// are only replaced when their key is looked up again; keys that stop
/// appearing stay in memory.
#[derive(Debug, Default)]
pub struct LimiterStore {
    /// Limiters indexed by key
    entries: Mutex<HashMap<String, Arc<Limiter>>>,
}

impl LimiterStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the limiter currently valid for `key`.
    ///
    /// Creates one on first sight of the key and swaps in a fresh one once
    /// the previous window has elapsed.
    pub fn get(&self, key: &str, config: &LimitConfig) -> Arc<Limiter> {
        self.get_at(key, config, Instant::now())
    }

    /// Same as [`LimiterStore::get`], evaluated at `now`.
    pub fn get_at(&self, key: &str, config: &LimitConfig, now: Instant) -> Arc<Limiter> {
        let mut entries = self.entries.lock();

        if let Some(limiter) = entries.get(key) {
            if !limiter.is_expired_at(now) {
                return Arc::clone(limiter);
            }
            debug!(
                key = %key,
                counted = limiter.counter(),
                "Window elapsed, rotating limiter"
            );
        } else {
            debug!(
                key = %key,
                quota = config.request_quota,
                duration_ms = config.quota_duration.as_millis() as u64,
                "Creating new limiter"
            );
        }

        let limiter = Arc::new(Limiter::new_at(*config, now));
        entries.insert(key.to_string(), Arc::clone(&limiter));
        limiter
    }

    /// Install `limiter` under `key`, replacing any previous entry.
    pub fn set(&self, key: impl Into<String>, limiter: Arc<Limiter>) {
        self.entries.lock().insert(key.into(), limiter);
    }

    /// Get the number of retained entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
