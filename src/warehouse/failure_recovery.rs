//! Failure Recovery
//!
//! Retries transient warehouse failures with exponential backoff:
//! - only `Transient` failures are retried; `Logic` and `Fatal` return at once
//! - every attempt and every backoff sleep stays inside one overall deadline
//! - no new attempt starts once cancellation is observed

use crate::error::{ClassifiedError, WarehouseError};
use crate::warehouse::error_classifier::ErrorClassifier;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Retry policy configuration
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Cap on any single delay
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    /// Fraction of each delay that may be randomly shaved off (0.0 = none)
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            jitter: 0.0,
        }
    }
}

impl RetryPolicy {
    pub fn new(initial_delay: Duration, max_delay: Duration, backoff_multiplier: f64) -> Self {
        Self {
            initial_delay,
            max_delay,
            backoff_multiplier,
            jitter: 0.0,
        }
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// Delay before retry number `attempt` (0-based), capped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(i32::MAX as u32) as i32;
        let delay_ms =
            (self.initial_delay.as_millis() as f64) * self.backoff_multiplier.powi(exponent);
        let delay_ms = delay_ms.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(delay_ms as u64)
    }

    fn jittered_delay(&self, attempt: u32) -> Duration {
        let delay = self.delay_for_attempt(attempt);
        if self.jitter <= 0.0 {
            return delay;
        }
        let shave = rand::thread_rng().gen_range(0.0..self.jitter);
        delay.mul_f64(1.0 - shave)
    }
}

/// Failure recovery handler
#[derive(Debug, Clone, Default)]
pub struct FailureRecovery {
    retry_policy: RetryPolicy,
    classifier: ErrorClassifier,
}

impl FailureRecovery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retry_policy(retry_policy: RetryPolicy) -> Self {
        Self {
            retry_policy,
            classifier: ErrorClassifier::new(),
        }
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    pub fn classifier(&self) -> &ErrorClassifier {
        &self.classifier
    }

    /// Run `operation` until it succeeds, fails non-transiently, runs out of
    /// time, or is cancelled.
    ///
    /// `operation` receives the budget remaining before `deadline`. Running
    /// out of time yields `Fatal` with `FatalKind::DeadlineExceeded`.
    pub async fn retry_transient<F, Fut, T>(
        &self,
        label: &str,
        deadline: Instant,
        cancel: &CancellationToken,
        mut operation: F,
    ) -> Result<T, ClassifiedError>
    where
        F: FnMut(Duration) -> Fut,
        Fut: Future<Output = Result<T, WarehouseError>>,
    {
        let budget = deadline.saturating_duration_since(Instant::now());
        let mut attempt: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(ClassifiedError::cancelled());
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(ClassifiedError::deadline_exceeded(format!(
                    "{} exceeded its deadline of {}s",
                    label,
                    budget.as_secs_f64()
                )));
            }

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ClassifiedError::cancelled()),
                outcome = tokio::time::timeout(remaining, operation(remaining)) => outcome,
            };

            let error = match outcome {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(error)) => error,
                Err(_) => {
                    return Err(ClassifiedError::deadline_exceeded(format!(
                        "{} exceeded its deadline of {}s",
                        label,
                        budget.as_secs_f64()
                    )));
                }
            };

            let classified = self.classifier.classify(&error);
            if !classified.is_transient() {
                return Err(classified);
            }

            let delay = self.retry_policy.jittered_delay(attempt);
            if Instant::now() + delay >= deadline {
                return Err(ClassifiedError::deadline_exceeded(format!(
                    "{} exceeded its deadline of {}s after {} attempt(s); last error: {}",
                    label,
                    budget.as_secs_f64(),
                    attempt + 1,
                    classified.message()
                )));
            }

            warn!(
                "{} failed with transient error (attempt {}), retrying in {:?}: {}",
                label,
                attempt + 1,
                delay,
                classified.message()
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ClassifiedError::cancelled()),
                _ = tokio::time::sleep(delay) => {}
            }
            attempt += 1;
        }
    }
}
