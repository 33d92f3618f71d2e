//! Executor configuration
//!
//! Pure values: pricing, backoff, repair bound, default limits and the
//! per-sub-call timeouts. Loaded from defaults, optionally overridden from
//! environment variables.

use crate::cost::PricingConfig;
use crate::error::{ExecError, Result};
use crate::warehouse::RetryPolicy;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_MAX_REPAIR_ATTEMPTS: u32 = 3;
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 300;
pub const DEFAULT_MAX_RESULTS: usize = 1000;

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub pricing: PricingConfig,
    pub retry: RetryPolicy,
    /// Upper bound on repair calls within one execution.
    pub max_repair_attempts: u32,
    pub default_timeout_seconds: u64,
    pub default_max_results: usize,
    pub dry_run_timeout: Duration,
    pub repair_timeout: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            pricing: PricingConfig::default(),
            retry: RetryPolicy::default(),
            max_repair_attempts: DEFAULT_MAX_REPAIR_ATTEMPTS,
            default_timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
            default_max_results: DEFAULT_MAX_RESULTS,
            dry_run_timeout: Duration::from_secs(30),
            repair_timeout: Duration::from_secs(60),
        }
    }
}

impl ExecutorConfig {
    /// Build configuration from defaults plus environment overrides.
    ///
    /// A variable that is present but unparsable is an error rather than
    /// silently ignored.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let mut config = Self::default();

        if let Some(price) = env_parse::<f64>("COST_PER_TB_USD")? {
            config.pricing.price_per_unit_usd = price;
        }
        if let Some(secs) = env_parse::<u64>("QUERY_TIMEOUT_SECONDS")? {
            config.default_timeout_seconds = secs;
        }
        if let Some(rows) = env_parse::<usize>("MAX_QUERY_ROWS")? {
            config.default_max_results = rows;
        }
        if let Some(attempts) = env_parse::<u32>("MAX_REPAIR_ATTEMPTS")? {
            config.max_repair_attempts = attempts;
        }
        if let Some(ms) = env_parse::<u64>("RETRY_INITIAL_DELAY_MS")? {
            config.retry.initial_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = env_parse::<u64>("RETRY_MAX_DELAY_MS")? {
            config.retry.max_delay = Duration::from_millis(ms);
        }
        if let Some(multiplier) = env_parse::<f64>("RETRY_MULTIPLIER")? {
            config.retry.backoff_multiplier = multiplier;
        }
        if let Some(secs) = env_parse::<u64>("DRY_RUN_TIMEOUT_SECONDS")? {
            config.dry_run_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = env_parse::<u64>("REPAIR_TIMEOUT_SECONDS")? {
            config.repair_timeout = Duration::from_secs(secs);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.pricing.bytes_per_unit == 0 {
            return Err(ExecError::Config("bytes_per_unit must be positive".to_string()));
        }
        if !(self.pricing.price_per_unit_usd >= 0.0) {
            return Err(ExecError::Config(format!(
                "price_per_unit_usd must be non-negative, got {}",
                self.pricing.price_per_unit_usd
            )));
        }
        if self.retry.backoff_multiplier < 1.0 {
            return Err(ExecError::Config(format!(
                "backoff multiplier must be >= 1.0, got {}",
                self.retry.backoff_multiplier
            )));
        }
        if !(0.0..=1.0).contains(&self.retry.jitter) {
            return Err(ExecError::Config(format!(
                "jitter must be within 0.0..=1.0, got {}",
                self.retry.jitter
            )));
        }
        if self.retry.max_delay < self.retry.initial_delay {
            return Err(ExecError::Config(
                "retry max_delay must not be shorter than initial_delay".to_string(),
            ));
        }
        if self.default_timeout_seconds == 0 {
            return Err(ExecError::Config("default_timeout_seconds must be positive".to_string()));
        }
        if self.default_max_results == 0 {
            return Err(ExecError::Config("default_max_results must be positive".to_string()));
        }
        if self.dry_run_timeout.is_zero() || self.repair_timeout.is_zero() {
            return Err(ExecError::Config(
                "dry-run and repair timeouts must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Read an optional environment variable and parse it.
pub(crate) fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) if raw.trim().is_empty() => Ok(None),
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ExecError::Config(format!("{}={:?}: {}", key, raw, e))),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ExecutorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_repair_attempts, 3);
        assert_eq!(config.retry.initial_delay, Duration::from_secs(1));
        assert_eq!(config.retry.max_delay, Duration::from_secs(10));
    }

    #[test]
    fn test_validate_rejects_shrinking_backoff() {
        let mut config = ExecutorConfig::default();
        config.retry.backoff_multiplier = 0.5;
        assert!(matches!(config.validate(), Err(ExecError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_zero_bytes_per_unit() {
        let mut config = ExecutorConfig::default();
        config.pricing.bytes_per_unit = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_parse_reports_bad_values() {
        std::env::set_var("SQL_EXEC_TEST_BAD_NUMBER", "ten");
        let parsed = env_parse::<u64>("SQL_EXEC_TEST_BAD_NUMBER");
        assert!(matches!(parsed, Err(ExecError::Config(_))));

        std::env::set_var("SQL_EXEC_TEST_GOOD_NUMBER", " 42 ");
        assert_eq!(env_parse::<u64>("SQL_EXEC_TEST_GOOD_NUMBER").unwrap(), Some(42));

        assert_eq!(env_parse::<u64>("SQL_EXEC_TEST_MISSING_NUMBER").unwrap(), None);
    }
}
