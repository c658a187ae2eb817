//! Line protocol for the decision service.
//!
//! Requests are single lines:
//!
//! - `CHECK <rule> [key]` counts a request and answers with a JSON status.
//!   Without a key the client's IP address is used.
//! - `PING` answers `PONG`.
//!
//! Failures answer `{"error": "..."}` and leave the connection open.

use std::net::SocketAddr;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::error::{Result, TurnstileError};
use crate::ratelimit::{ClientAddr, KeyExtractor, RateLimitStatus, RuleSet};

/// A parsed request line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command<'a> {
    Check { rule: &'a str, key: Option<&'a str> },
    Ping,
}

impl<'a> Command<'a> {
    /// Parse one request line.
    pub fn parse(line: &'a str) -> Result<Self> {
        let mut parts = line.split_whitespace();
        let verb = parts
            .next()
            .ok_or_else(|| TurnstileError::Protocol("empty request".to_string()))?;

        let command = if verb.eq_ignore_ascii_case("CHECK") {
            let rule = parts
                .next()
                .ok_or_else(|| {
                    TurnstileError::Protocol("CHECK requires a rule name".to_string())
                })?;
            Command::Check {
                rule,
                key: parts.next(),
            }
        } else if verb.eq_ignore_ascii_case("PING") {
            Command::Ping
        } else {
            return Err(TurnstileError::Protocol(format!("unknown command '{}'", verb)));
        };

        if parts.next().is_some() {
            return Err(TurnstileError::Protocol("too many arguments".to_string()));
        }
        Ok(command)
    }
}

/// Answer to a `CHECK` request.
#[derive(Debug, Serialize)]
pub struct CheckResponse<'a> {
    pub rule: &'a str,
    pub key: String,
    #[serde(flatten)]
    pub status: RateLimitStatus,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

/// Turns request lines into decisions against a rule set.
pub struct DecisionService {
    rules: Arc<RuleSet>,
}

impl DecisionService {
    /// Create a new service over the given rules.
    pub fn new(rules: Arc<RuleSet>) -> Self {
        Self { rules }
    }

    /// Handle one request line from `peer` and produce the response line.
    #[instrument(skip(self, peer), fields(peer = %peer))]
    pub fn handle_line(&self, line: &str, peer: SocketAddr) -> String {
        match self.dispatch(line, peer) {
            Ok(response) => response,
            Err(e) => self.error_response(&e),
        }
    }

    /// Encode `error` as a response line.
    pub fn error_response(&self, error: &TurnstileError) -> String {
        warn!(error = %error, "Rejected request line");
        let body = ErrorResponse {
            error: error.to_string(),
        };
        serde_json::to_string(&body)
            .unwrap_or_else(|_| r#"{"error":"internal"}"#.to_string())
    }

    fn dispatch(&self, line: &str, peer: SocketAddr) -> Result<String> {
        match Command::parse(line)? {
            Command::Ping => Ok("PONG".to_string()),
            Command::Check { rule, key } => {
                let limit = self
                    .rules
                    .get(rule)
                    .ok_or_else(|| TurnstileError::Protocol(format!("unknown rule '{}'", rule)))?;

                let key = match key {
                    Some(key) => key.to_string(),
                    None => ClientAddr.extract_key(&peer),
                };
                let status = limit.check(&key);

                debug!(rule = %rule, key = %key, allowed = status.allowed, "Decision made");

                let response = CheckResponse { rule, key, status };
                serde_json::to_string(&response)
                    .map_err(|e| {
                        TurnstileError::Protocol(format!("failed to encode response: {}", e))
                    })
            }
        }
    }
}
