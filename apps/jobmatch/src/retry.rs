//! Retry policy shared by every outbound HTTP call in the pipeline.
//!
//! Attempts are counted from 1. A transient failure on attempt `n` sleeps for
//! `min(initial * 2^(n-1), max)` plus a random jitter, then tries again, until
//! `max_attempts` attempts have been made.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

/// Errors that know whether the failed call is worth repeating.
pub trait Transient {
    fn is_transient(&self) -> bool;
}

/// Exponential backoff with a ceiling and additive jitter.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Values below 1 behave as 1.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Upper bound of the random delay added to every backoff.
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            jitter: Duration::from_millis(100),
        }
    }
}

impl RetryPolicy {
    /// A policy that retries without sleeping.
    #[cfg(test)]
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            jitter: Duration::ZERO,
        }
    }

    /// Backoff before the attempt following failed attempt `attempt`, without jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(20);
        self.initial_backoff
            .saturating_mul(1u32 << exponent)
            .min(self.max_backoff)
    }

    fn delay(&self, attempt: u32) -> Duration {
        let jitter_ms = self.jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::thread_rng().gen_range(0..jitter_ms))
        };
        self.backoff(attempt) + jitter
    }
}

/// Why a retried operation finally gave up.
#[derive(Debug)]
pub enum RetryError<E> {
    /// A non-transient failure; no further attempts were made.
    Aborted { attempt: u32, error: E },
    /// Every attempt failed transiently.
    Exhausted { attempts: u32, last: E },
}

/// Runs `op` until it succeeds, fails non-transiently, or the policy runs out
/// of attempts. `op` receives the 1-based attempt number.
pub async fn retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    mut op: F,
) -> Result<T, RetryError<E>>
where
    E: Transient + Display,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        let error = match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };

        if !error.is_transient() {
            return Err(RetryError::Aborted { attempt, error });
        }
        if attempt >= max_attempts {
            return Err(RetryError::Exhausted {
                attempts: attempt,
                last: error,
            });
        }

        let delay = policy.delay(attempt);
        warn!(
            "{label} attempt {attempt}/{max_attempts} failed: {error}. Retrying after {}ms",
            delay.as_millis()
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}
