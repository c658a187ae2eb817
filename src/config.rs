//! Configuration management for Turnstile.

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;

use crate::error::Result;

/// Prefix for environment overrides, e.g. `TURNSTILE_SERVER__LISTEN_ADDR`.
const ENV_PREFIX: &str = "TURNSTILE";

/// Main configuration for the Turnstile service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnstileConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Rate limit rules, one limiter store each
    #[serde(default = "default_rules")]
    pub rules: Vec<RuleConfig>,
}

impl Default for TurnstileConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            rules: default_rules(),
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Decision service address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

/// A single rate limit rule as written in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleConfig {
    /// Name clients use to select this rule
    pub name: String,
    /// Maximum requests per window
    pub request_quota: u64,
    /// Window length in milliseconds
    pub quota_duration_ms: u64,
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8090))
}

fn default_rules() -> Vec<RuleConfig> {
    vec![RuleConfig {
        name: "default".to_string(),
        request_quota: 60,
        quota_duration_ms: 60_000,
    }]
}

impl TurnstileConfig {
    /// Load configuration from an optional YAML file, then apply environment
    /// overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            let file = File::from(path).format(FileFormat::Yaml).required(true);
            builder = builder.add_source(file);
        }

        let config = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()?
            .try_deserialize()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TurnstileError;

    #[test]
    fn test_default_config() {
        let config = TurnstileConfig::default();

        let expected: SocketAddr = "127.0.0.1:8090".parse().unwrap();
        assert_eq!(config.server.listen_addr, expected);
        assert_eq!(config.rules.len(), 1);
        assert_eq!(config.rules[0].name, "default");
        assert_eq!(config.rules[0].request_quota, 60);
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
server:
  listen_addr: "0.0.0.0:9000"
rules:
  - name: login
    request_quota: 5
    quota_duration_ms: 1000
  - name: search
    request_quota: 100
    quota_duration_ms: 60000
"#;
        let config = TurnstileConfig::from_yaml_str(yaml).unwrap();

        let expected: SocketAddr = "0.0.0.0:9000".parse().unwrap();
        assert_eq!(config.server.listen_addr, expected);
        assert_eq!(
            config.rules[0],
            RuleConfig {
                name: "login".to_string(),
                request_quota: 5,
                quota_duration_ms: 1000,
            }
        );
        assert_eq!(config.rules[1].quota_duration_ms, 60000);
    }

    #[test]
    fn test_missing_sections_use_defaults() {
        let yaml = r#"
rules:
  - name: api
    request_quota: 10
    quota_duration_ms: 500
"#;
        let config = TurnstileConfig::from_yaml_str(yaml).unwrap();

        assert_eq!(config.server.listen_addr, default_listen_addr());
        assert_eq!(config.rules.len(), 1);
        assert_eq!(config.rules[0].name, "api");
    }

    #[test]
    fn test_invalid_rule_is_rejected() {
        let yaml = r#"
rules:
  - name: api
    request_quota: lots
    quota_duration_ms: 500
"#;
        let result = TurnstileConfig::from_yaml_str(yaml);
        assert!(matches!(result, Err(TurnstileError::ConfigLoad(_))));
    }
}
