//! Named rate limit rules.
//!
//! Each rule pairs a [`LimitConfig`] with its own [`LimiterStore`], so
//! independent rules never share counters.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, trace};

use super::key::KeyExtractor;
use super::limiter::LimitConfig;
use super::status::RateLimitStatus;
use super::store::LimiterStore;
use crate::config::RuleConfig;
use crate::error::{Result, TurnstileError};

/// A single named rule and the limiters it owns.
#[derive(Debug)]
pub struct RateLimitRule {
    name: String,
    config: LimitConfig,
    store: LimiterStore,
}

impl RateLimitRule {
    /// Create a new rule with an empty store.
    pub fn new(name: impl Into<String>, config: LimitConfig) -> Self {
        Self {
            name: name.into(),
            config,
            store: LimiterStore::new(),
        }
    }

    /// Count a request for `key` and report the decision.
    pub fn check(&self, key: &str) -> RateLimitStatus {
        let now = Instant::now();
        let limiter = self.store.get_at(key, &self.config, now);
        let allowed = limiter.validate_and_update();

        trace!(rule = %self.name, key = %key, allowed, "Checked rate limit");

        if !allowed {
            debug!(
                rule = %self.name,
                key = %key,
                counted = limiter.counter(),
                limit = self.config.request_quota,
                "Rate limit exceeded"
            );
        }

        RateLimitStatus::from_limiter_at(&limiter, allowed, now)
    }

    /// Derive the key from `request` and check it.
    pub fn check_request<R, E>(&self, request: &R, extractor: &E) -> RateLimitStatus
    where
        R: ?Sized,
        E: KeyExtractor<R> + ?Sized,
    {
        let key = extractor.extract_key(request);
        self.check(&key)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &LimitConfig {
        &self.config
    }

    /// Get the limiter store backing this rule.
    pub fn store(&self) -> &LimiterStore {
        &self.store
    }
}

/// The set of rules a service enforces, indexed by name.
#[derive(Debug, Default)]
pub struct RuleSet {
    rules: HashMap<String, Arc<RateLimitRule>>,
}

impl RuleSet {
    /// Create an empty rule set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a rule set from configuration, rejecting invalid rules.
    pub fn from_configs(configs: &[RuleConfig]) -> Result<Self> {
        let mut set = Self::new();

        for rule in configs {
            if rule.name.trim().is_empty() {
                return Err(TurnstileError::Config("rule name must not be empty".to_string()));
            }
            if rule.request_quota == 0 {
                return Err(TurnstileError::Config(format!(
                    "rule '{}': request_quota must be at least 1",
                    rule.name
                )));
            }
            if rule.quota_duration_ms == 0 {
                return Err(TurnstileError::Config(format!(
                    "rule '{}': quota_duration_ms must be at least 1",
                    rule.name
                )));
            }

            let config = LimitConfig::new(
                rule.request_quota,
                Duration::from_millis(rule.quota_duration_ms),
            );
            if !set.insert(RateLimitRule::new(rule.name.clone(), config)) {
                return Err(TurnstileError::Config(format!(
                    "duplicate rule name '{}'",
                    rule.name
                )));
            }

            info!(
                rule = %rule.name,
                quota = rule.request_quota,
                duration_ms = rule.quota_duration_ms,
                "Loaded rate limit rule"
            );
        }

        Ok(set)
    }

    /// Add a rule. Returns `false` if a rule with that name already exists.
    pub fn insert(&mut self, rule: RateLimitRule) -> bool {
        if self.rules.contains_key(rule.name()) {
            return false;
        }
        self.rules.insert(rule.name().to_string(), Arc::new(rule));
        true
    }

    pub fn get(&self, name: &str) -> Option<&Arc<RateLimitRule>> {
        self.rules.get(name)
    }

    /// Rule names in sorted order.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.rules.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
