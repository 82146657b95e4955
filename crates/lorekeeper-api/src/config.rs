//! Server configuration read from the environment at startup.

use std::time::Duration;

use lorekeeper_jobs::{JobQueueConfig, RetryPolicy};

use crate::error::AppError;

const DEFAULT_COMPLETION_URL: &str = "http://localhost:1234/v1/chat/completions";
const DEFAULT_COMPLETION_MODEL: &str = "local-model";

/// Everything the binary needs to wire the engine.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// `PostgreSQL` URL. The in-memory store is used when absent.
    pub database_url: Option<String>,
    /// Bind host.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Job queue tuning.
    pub queue: JobQueueConfig,
    /// Retry policy for entity creation and stat-block synthesis.
    pub creation_retry: RetryPolicy,
    /// OpenAI-compatible chat completions endpoint.
    pub completion_url: String,
    /// Model name sent to the endpoint.
    pub completion_model: String,
    /// How long `GET /api/v1/jobs/{id}` waits for a result before answering
    /// `pending`. Zero polls without waiting.
    pub poll_timeout: Duration,
    /// Age after which settled lifecycle records are evicted.
    pub status_ttl: Duration,
}

impl AppConfig {
    /// Reads the configuration from process environment variables.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if a variable is set but cannot be parsed.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`, which maps a variable name
    /// to its value.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if a value cannot be parsed.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let queue_defaults = JobQueueConfig::default();
        let retry_defaults = RetryPolicy::default();

        let workers: usize = parse_or(&lookup, "LOREKEEPER_WORKERS", queue_defaults.workers)?;
        if workers == 0 {
            return Err(AppError::Config("LOREKEEPER_WORKERS must be at least 1".into()));
        }
        let queue = JobQueueConfig {
            workers,
            max_error_len: parse_or(&lookup, "LOREKEEPER_MAX_ERROR_LEN", queue_defaults.max_error_len)?,
            restart_delay: millis_or(&lookup, "LOREKEEPER_RESTART_DELAY_MS", queue_defaults.restart_delay)?,
            ..queue_defaults
        };
        let creation_retry = RetryPolicy::exponential(
            parse_or(&lookup, "LOREKEEPER_CREATION_ATTEMPTS", retry_defaults.max_attempts)?,
            millis_or(&lookup, "LOREKEEPER_CREATION_BACKOFF_MS", retry_defaults.base_delay)?,
        );

        Ok(Self {
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or(&lookup, "PORT", 3000)?,
            queue,
            creation_retry,
            completion_url: lookup("LOREKEEPER_COMPLETION_URL")
                .unwrap_or_else(|| DEFAULT_COMPLETION_URL.to_string()),
            completion_model: lookup("LOREKEEPER_COMPLETION_MODEL")
                .unwrap_or_else(|| DEFAULT_COMPLETION_MODEL.to_string()),
            poll_timeout: millis_or(&lookup, "LOREKEEPER_POLL_TIMEOUT_MS", Duration::from_secs(20))?,
            status_ttl: Duration::from_secs(parse_or(&lookup, "LOREKEEPER_STATUS_TTL_SECS", 3600)?),
        })
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| AppError::Config(format!("{key} is invalid: {e}"))),
    }
}

fn millis_or(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: Duration,
) -> Result<Duration, AppError> {
    let default_ms = u64::try_from(default.as_millis()).unwrap_or(u64::MAX);
    parse_or(lookup, key, default_ms).map(Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(vars: &[(&str, &str)]) -> Result<AppConfig, AppError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults_apply_when_nothing_is_set() {
        let config = config_from(&[]).unwrap();

        assert_eq!(config.database_url, None);
        assert_eq!(config.port, 3000);
        assert_eq!(config.queue.workers, 2);
        assert_eq!(config.queue.max_error_len, 300);
        assert_eq!(config.queue.restart_delay, Duration::from_millis(1000));
        assert_eq!(config.creation_retry, RetryPolicy::default());
        assert_eq!(config.completion_model, DEFAULT_COMPLETION_MODEL);
    }

    #[test]
    fn test_variables_override_defaults() {
        let config = config_from(&[
            ("DATABASE_URL", "postgres://localhost/lore"),
            ("PORT", "8080"),
            ("LOREKEEPER_WORKERS", "4"),
            ("LOREKEEPER_CREATION_ATTEMPTS", "5"),
            ("LOREKEEPER_CREATION_BACKOFF_MS", "250"),
            ("LOREKEEPER_POLL_TIMEOUT_MS", "0"),
        ])
        .unwrap();

        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/lore"));
        assert_eq!(config.port, 8080);
        assert_eq!(config.queue.workers, 4);
        assert_eq!(
            config.creation_retry,
            RetryPolicy::exponential(5, Duration::from_millis(250))
        );
        assert_eq!(config.poll_timeout, Duration::ZERO);
    }

    #[test]
    fn test_unparseable_value_is_a_config_error() {
        let result = config_from(&[("PORT", "eighty")]);

        match result {
            Err(AppError::Config(message)) => assert!(message.contains("PORT")),
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    fn test_zero_workers_is_rejected() {
        assert!(matches!(
            config_from(&[("LOREKEEPER_WORKERS", "0")]),
            Err(AppError::Config(_))
        ));
    }
}
