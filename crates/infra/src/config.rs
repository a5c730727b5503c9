//! Environment-driven configuration.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use docvault_auth::SessionConfig;
use docvault_ingestion::{BackoffStrategy, OrchestratorConfig, RetryPolicy};
use docvault_observability::LogFormat;

pub const JWT_SECRET_ENV: &str = "JWT_SECRET";
pub const ACCESS_TOKEN_TTL_SECS_ENV: &str = "ACCESS_TOKEN_TTL_SECS";
pub const REFRESH_TOKEN_TTL_DAYS_ENV: &str = "REFRESH_TOKEN_TTL_DAYS";
pub const INGESTION_MAX_RETRIES_ENV: &str = "INGESTION_MAX_RETRIES";
pub const INGESTION_BASE_DELAY_MS_ENV: &str = "INGESTION_BASE_DELAY_MS";
pub const INGESTION_MAX_DELAY_MS_ENV: &str = "INGESTION_MAX_DELAY_MS";
pub const INGESTION_BACKOFF_ENV: &str = "INGESTION_BACKOFF";
pub const INGESTION_SUCCESS_RATE_ENV: &str = "INGESTION_SUCCESS_RATE";
pub const INGESTION_CANCEL_PENDING_RETRIES_ENV: &str = "INGESTION_CANCEL_PENDING_RETRIES";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

const DEV_JWT_SECRET: &str = "dev-secret";

/// Source of raw configuration values.
///
/// Tests pass a map instead of mutating the process environment.
pub trait ConfigSource {
    fn get(&self, key: &str) -> Option<String>;
}

/// The real process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl ConfigSource for ProcessEnv {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl ConfigSource for HashMap<String, String> {
    fn get(&self, key: &str) -> Option<String> {
        HashMap::get(self, key).cloned()
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
    #[error("{0}")]
    Inconsistent(String),
}

/// Fully resolved process configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub jwt_secret: String,
    /// Set when no `JWT_SECRET` was provided.
    pub insecure_jwt_secret: bool,
    pub session: SessionConfig,
    pub ingestion: OrchestratorConfig,
    /// Success probability of the simulated connector.
    pub success_rate: f64,
    pub log_format: LogFormat,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            jwt_secret: DEV_JWT_SECRET.to_string(),
            insecure_jwt_secret: true,
            session: SessionConfig::default(),
            ingestion: OrchestratorConfig::default(),
            success_rate: 0.7,
            log_format: LogFormat::Json,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_source(&ProcessEnv)
    }

    pub fn from_source(source: &impl ConfigSource) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let (jwt_secret, insecure_jwt_secret) = match source.get(JWT_SECRET_ENV) {
            Some(secret) if !secret.is_empty() => (secret, false),
            _ => (defaults.jwt_secret, true),
        };

        let access_token_ttl = lifetime(
            ACCESS_TOKEN_TTL_SECS_ENV,
            parse_or(source, ACCESS_TOKEN_TTL_SECS_ENV, 3600)?,
            chrono::Duration::try_seconds,
        )?;
        let refresh_token_ttl = lifetime(
            REFRESH_TOKEN_TTL_DAYS_ENV,
            parse_or(source, REFRESH_TOKEN_TTL_DAYS_ENV, 7)?,
            chrono::Duration::try_days,
        )?;

        let max_retries = parse_or(source, INGESTION_MAX_RETRIES_ENV, 3u32)?;
        let base_delay_ms = parse_or(source, INGESTION_BASE_DELAY_MS_ENV, 2000u64)?;
        let max_delay_ms = parse_or(source, INGESTION_MAX_DELAY_MS_ENV, 30_000u64)?;
        if max_delay_ms < base_delay_ms {
            return Err(ConfigError::Inconsistent(format!(
                "{INGESTION_MAX_DELAY_MS_ENV} ({max_delay_ms}) is below {INGESTION_BASE_DELAY_MS_ENV} ({base_delay_ms})"
            )));
        }
        let backoff = parse_or(source, INGESTION_BACKOFF_ENV, true)?;

        let success_rate = parse_or(source, INGESTION_SUCCESS_RATE_ENV, defaults.success_rate)?;
        if !(0.0..=1.0).contains(&success_rate) {
            return Err(ConfigError::Invalid {
                key: INGESTION_SUCCESS_RATE_ENV,
                value: success_rate.to_string(),
                reason: "must be between 0 and 1".to_string(),
            });
        }

        let retry_policy = RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(base_delay_ms),
            max_delay: Duration::from_millis(max_delay_ms),
            strategy: if backoff {
                BackoffStrategy::Exponential
            } else {
                BackoffStrategy::Fixed
            },
            ..RetryPolicy::default()
        };

        Ok(Self {
            jwt_secret,
            insecure_jwt_secret,
            session: SessionConfig {
                access_token_ttl,
                refresh_token_ttl,
            },
            ingestion: OrchestratorConfig::default()
                .with_retry_policy(retry_policy)
                .with_cancel_pending_retries(parse_or(
                    source,
                    INGESTION_CANCEL_PENDING_RETRIES_ENV,
                    false,
                )?),
            success_rate,
            log_format: parse_or(source, LOG_FORMAT_ENV, defaults.log_format)?,
        })
    }
}

fn parse_or<T>(source: &impl ConfigSource, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match source.get(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|err: T::Err| ConfigError::Invalid {
            key,
            value: raw.clone(),
            reason: err.to_string(),
        }),
    }
}

/// A positive lifetime that still yields a representable expiry when added
/// to the current time.
fn lifetime(
    key: &'static str,
    value: i64,
    to_duration: fn(i64) -> Option<chrono::Duration>,
) -> Result<chrono::Duration, ConfigError> {
    let invalid = |reason: &str| ConfigError::Invalid {
        key,
        value: value.to_string(),
        reason: reason.to_string(),
    };

    if value <= 0 {
        return Err(invalid("must be positive"));
    }
    let ttl = to_duration(value).ok_or_else(|| invalid("out of range"))?;
    chrono::Utc::now()
        .checked_add_signed(ttl)
        .map(|_| ttl)
        .ok_or_else(|| invalid("out of range"))
}
