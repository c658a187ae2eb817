//! Turnstile - fixed-window request rate limiting
//!
//! This crate tracks, per client key, how many requests arrived in the
//! current fixed window and denies requests once a rule's quota is used up.
//! Each rule owns a [`ratelimit::LimiterStore`] that hands out one
//! [`ratelimit::Limiter`] per key and lazily replaces it when its window
//! ends. A small TCP decision service exposes the rules to other processes.

pub mod config;
pub mod decision;
pub mod error;
pub mod ratelimit;
