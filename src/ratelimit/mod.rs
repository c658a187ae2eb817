//! Rate limiting logic and state management.

mod key;
mod limiter;
mod rules;
mod status;
mod store;

pub use key::{ClientAddr, KeyExtractor};
pub use limiter::{LimitConfig, Limiter};
pub use rules::{RateLimitRule, RuleSet};
pub use status::RateLimitStatus;
pub use store::LimiterStore;
