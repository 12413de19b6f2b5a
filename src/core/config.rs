//! Client configuration and environment fallbacks.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Prefix for every environment variable this crate consults.
pub const ENV_PREFIX: &str = "HOLOGRES_";

/// Default user-agent sent on every cloud API request.
pub const DEFAULT_USER_AGENT: &str = concat!("hologres-rs/", env!("CARGO_PKG_VERSION"));

/// Configuration for the cloud HTTP client.
///
/// Deserialization ignores unrecognized keys instead of rejecting them, so
/// configuration maps written for newer clients keep working.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Overall per-request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: f64,
    /// Upper bound on request attempts is `max_retries + 1`; a value of 0
    /// performs exactly one attempt. Retries apply uniformly to every HTTP
    /// verb, including POST, so non-idempotent mutations can be applied
    /// twice when the server commits an attempt the client saw fail.
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
    /// Base delay for exponential backoff; attempt `n` waits
    /// `retry_delay_secs * 2^n` before retrying.
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: f64,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_verify_ssl")]
    pub verify_ssl: bool,
}

fn default_timeout() -> f64 {
    30.0
}

fn default_max_retries() -> usize {
    3
}

fn default_retry_delay() -> f64 {
    1.0
}

fn default_max_connections() -> usize {
    100
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

fn default_verify_ssl() -> bool {
    true
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
            max_retries: default_max_retries(),
            retry_delay_secs: default_retry_delay(),
            max_connections: default_max_connections(),
            user_agent: default_user_agent(),
            verify_ssl: default_verify_ssl(),
        }
    }
}

/// Exponential backoff schedule shared by the HTTP client and the
/// embedding retry wrappers: attempt `n` (zero-based) waits
/// `base * 2^n`.
pub fn backoff_delay(base_secs: f64, attempt: u32) -> Duration {
    Duration::from_secs_f64(base_secs.max(0.0) * 2f64.powi(attempt as i32))
}

/// Connection parameters read from `HOLOGRES_`-prefixed environment
/// variables. Used only as fallback when a parameter is not passed
/// explicitly.
#[derive(Debug, Clone, Default)]
pub struct EnvConfig {
    pub api_key: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub database: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub region: Option<String>,
}

impl EnvConfig {
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(format!("{}{}", ENV_PREFIX, name)).ok();
        Self {
            api_key: var("API_KEY"),
            username: var("USERNAME"),
            password: var("PASSWORD"),
            database: var("DATABASE"),
            host: var("HOST"),
            port: var("PORT").and_then(|p| p.parse().ok()),
            region: var("REGION"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.timeout_secs, 30.0);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.retry_delay_secs, 1.0);
        assert_eq!(config.max_connections, 100);
        assert!(config.verify_ssl);
        assert!(config.user_agent.starts_with("hologres-rs/"));
    }

    #[test]
    fn backoff_doubles_per_attempt() {
        assert_eq!(backoff_delay(1.0, 0), Duration::from_secs(1));
        assert_eq!(backoff_delay(1.0, 1), Duration::from_secs(2));
        assert_eq!(backoff_delay(1.0, 2), Duration::from_secs(4));
        assert_eq!(backoff_delay(0.5, 3), Duration::from_secs(4));
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let config: ClientConfig = serde_json::from_str(
            r#"{"timeout_secs": 5.0, "frobnicate": true, "nested": {"a": 1}}"#,
        )
        .unwrap();
        assert_eq!(config.timeout_secs, 5.0);
        assert_eq!(config.max_retries, 3);
    }
}
