use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::retry::RetryPolicy;

/// Values accepted by the listing provider for `fromDays`.
const ALLOWED_FROM_DAYS: &[&str] = &["1", "3", "7", "14"];

/// Application configuration loaded from environment variables.
/// Credentials are optional here: a missing key only fails the stage that needs it.
#[derive(Debug, Clone)]
pub struct Config {
    pub rapidapi_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub embedding: EmbeddingConfig,
    pub acquire: AcquireConfig,
    pub cleaning: CleaningConfig,
    pub rust_log: String,
}

#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    pub base_url: String,
    pub model: String,
    pub dimensions: Option<usize>,
    pub batch_size: usize,
    pub max_input_chars: usize,
    /// Pause between successive batches, to stay under informal rate limits.
    pub batch_pause: Duration,
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "text-embedding-3-small".to_string(),
            dimensions: None,
            batch_size: 64,
            max_input_chars: 32_000,
            batch_pause: Duration::from_millis(100),
            request_timeout: Duration::from_secs(60),
            retry: RetryPolicy::default(),
        }
    }
}

/// Search parameters and transport settings for the listing provider.
#[derive(Debug, Clone)]
pub struct AcquireConfig {
    pub host: String,
    pub endpoint: String,
    pub query: String,
    pub location: String,
    pub max_rows: u32,
    pub job_type: String,
    pub radius: String,
    pub sort: String,
    pub from_days: String,
    pub country: String,
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for AcquireConfig {
    fn default() -> Self {
        let host = "indeed-scraper-api.p.rapidapi.com".to_string();
        Self {
            endpoint: format!("https://{host}/api/job"),
            host,
            query: "Developer".to_string(),
            location: "Saint Louis MO".to_string(),
            max_rows: 15,
            job_type: "fulltime".to_string(),
            radius: "50".to_string(),
            sort: "relevance".to_string(),
            from_days: "7".to_string(),
            country: "us".to_string(),
            request_timeout: Duration::from_secs(20),
            // one retry only: every call spends provider quota
            retry: RetryPolicy {
                max_attempts: 2,
                initial_backoff: Duration::from_millis(500),
                max_backoff: Duration::from_secs(2),
                jitter: Duration::from_millis(100),
            },
        }
    }
}

/// What the cleaning stage does with a posting missing its title or description.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingPolicy {
    /// Replace empty fields with "n/a".
    Fill,
    /// Skip the posting.
    Drop,
}

impl FromStr for MissingPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fill" => Ok(MissingPolicy::Fill),
            "drop" => Ok(MissingPolicy::Drop),
            other => anyhow::bail!("unknown missing policy '{other}' (expected 'fill' or 'drop')"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CleaningConfig {
    pub lowercase: bool,
    pub remove_special_chars: bool,
    pub missing_policy: MissingPolicy,
}

impl Default for CleaningConfig {
    fn default() -> Self {
        Self {
            lowercase: true,
            remove_special_chars: true,
            missing_policy: MissingPolicy::Fill,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let embedding_defaults = EmbeddingConfig::default();
        let retry_defaults = embedding_defaults.retry.clone();
        let embedding = EmbeddingConfig {
            base_url: env_or("OPENAI_BASE_URL", embedding_defaults.base_url),
            model: env_or("EMBEDDING_MODEL", embedding_defaults.model),
            dimensions: optional_env("EMBEDDING_DIMENSIONS")
                .map(|v| v.parse::<usize>())
                .transpose()
                .context("EMBEDDING_DIMENSIONS must be a positive integer")?,
            batch_size: parse_env("EMBEDDING_BATCH_SIZE", embedding_defaults.batch_size)?.max(1),
            max_input_chars: parse_env("EMBEDDING_TRUNCATE_CHARS", embedding_defaults.max_input_chars)?,
            batch_pause: Duration::from_millis(parse_env("EMBEDDING_BATCH_PAUSE_MS", 100)?),
            request_timeout: Duration::from_secs(parse_env("EMBEDDING_TIMEOUT_SECS", 60)?),
            retry: RetryPolicy {
                max_attempts: parse_env("EMBEDDING_MAX_ATTEMPTS", retry_defaults.max_attempts)?,
                initial_backoff: Duration::from_millis(parse_env("EMBEDDING_INITIAL_BACKOFF_MS", 1000)?),
                max_backoff: Duration::from_millis(parse_env("EMBEDDING_MAX_BACKOFF_MS", 30_000)?),
                jitter: retry_defaults.jitter,
            },
        };

        let acquire_defaults = AcquireConfig::default();
        let acquire = AcquireConfig {
            query: env_or("JOB_QUERY", acquire_defaults.query.clone()),
            location: env_or("JOB_LOCATION", acquire_defaults.location.clone()),
            max_rows: parse_env("JOB_MAX_ROWS", acquire_defaults.max_rows)?,
            job_type: env_or("JOB_TYPE", acquire_defaults.job_type.clone()),
            radius: env_or("JOB_RADIUS", acquire_defaults.radius.clone()),
            from_days: env_or("JOB_FROM_DAYS", acquire_defaults.from_days.clone()),
            country: env_or("JOB_COUNTRY", acquire_defaults.country.clone()),
            ..acquire_defaults
        };
        validate_from_days(&acquire.from_days)?;

        let cleaning = CleaningConfig {
            missing_policy: optional_env("CLEAN_MISSING_POLICY")
                .map(|v| v.parse())
                .transpose()?
                .unwrap_or(MissingPolicy::Fill),
            ..CleaningConfig::default()
        };

        Ok(Config {
            rapidapi_key: optional_env("RAPIDAPI_KEY"),
            openai_api_key: optional_env("OPENAI_API_KEY"),
            embedding,
            acquire,
            cleaning,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

/// The provider only accepts a fixed set of look-back windows.
fn validate_from_days(value: &str) -> Result<()> {
    anyhow::ensure!(
        ALLOWED_FROM_DAYS.contains(&value),
        "JOB_FROM_DAYS must be one of {ALLOWED_FROM_DAYS:?}, got '{value}'"
    );
    Ok(())
}

/// Reads `key`, treating an empty or whitespace-only value as unset.
fn optional_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_or(key: &str, default: String) -> String {
    optional_env(key).unwrap_or(default)
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match optional_env(key) {
        Some(v) => v
            .parse::<T>()
            .with_context(|| format!("Environment variable '{key}' has an invalid value '{v}'")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_policy_parses_case_insensitively() {
        assert_eq!("FILL".parse::<MissingPolicy>().unwrap(), MissingPolicy::Fill);
        assert_eq!(" drop ".parse::<MissingPolicy>().unwrap(), MissingPolicy::Drop);
        assert!("keep".parse::<MissingPolicy>().is_err());
    }

    #[test]
    fn test_embedding_defaults_match_service_limits() {
        let cfg = EmbeddingConfig::default();
        assert_eq!(cfg.batch_size, 64);
        assert_eq!(cfg.max_input_chars, 32_000);
        assert_eq!(cfg.retry.max_attempts, 5);
        assert_eq!(cfg.retry.initial_backoff, Duration::from_secs(1));
        assert_eq!(cfg.retry.max_backoff, Duration::from_secs(30));
    }

    #[test]
    fn test_acquire_default_endpoint_uses_host() {
        let cfg = AcquireConfig::default();
        assert_eq!(cfg.endpoint, "https://indeed-scraper-api.p.rapidapi.com/api/job");
        assert!(ALLOWED_FROM_DAYS.contains(&cfg.from_days.as_str()));
    }

    #[test]
    fn test_from_days_accepts_provider_windows() {
        for days in ["1", "3", "7", "14"] {
            assert!(validate_from_days(days).is_ok(), "{days} should be accepted");
        }
    }

    #[test]
    fn test_from_days_rejects_other_values() {
        for days in ["0", "2", "30", "seven", ""] {
            let err = validate_from_days(days).unwrap_err();
            assert!(err.to_string().contains("JOB_FROM_DAYS"));
        }
    }

    #[test]
    fn test_parse_env_uses_default_when_unset() {
        let value: u32 = parse_env("JOBMATCH_TEST_SURELY_UNSET_VAR", 42).unwrap();
        assert_eq!(value, 42);
    }
}
