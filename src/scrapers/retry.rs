//! Bounded retry with jittered exponential backoff
//!
//! Delay after attempt `n` is `base_delay * 2^(n-1)`, capped at
//! `max_delay`, plus a uniform jitter in `[0, jitter]`. Only errors that
//! report themselves as retryable are attempted again.

use rand::Rng;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use crate::config::TrackerConfig;
use crate::error::{FetchError, ScrapeError};

pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for FetchError {
    fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

impl Retryable for ScrapeError {
    fn is_retryable(&self) -> bool {
        match self {
            ScrapeError::Fetch(e) => e.kind.is_retryable(),
            ScrapeError::Parse(_) => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&TrackerConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &TrackerConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: config.base_delay,
            max_delay: config.max_delay,
            jitter: config.jitter,
        }
    }

    /// Backoff before attempt `attempt + 1`, without jitter
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        let exp = self.base_delay.saturating_mul(factor);
        std::cmp::min(exp, self.max_delay)
    }

    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.backoff(attempt) + sample_jitter(self.jitter)
    }
}

fn sample_jitter(max: Duration) -> Duration {
    if max.is_zero() {
        return Duration::ZERO;
    }
    let ms = rand::rng().random_range(0..=max.as_millis() as u64);
    Duration::from_millis(ms)
}

#[derive(Debug)]
pub struct RetryOutcome<T, E> {
    pub result: Result<T, E>,
    pub attempts: u32,
}

/// Run `op` until it succeeds, fails with a non-retryable error, or
/// `max_attempts` is used up. The last error is returned, never raised.
///
/// `op` receives the 1-based attempt number.
pub async fn with_retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    target: &str,
    mut op: F,
) -> RetryOutcome<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match op(attempt).await {
            Ok(value) => {
                return RetryOutcome {
                    result: Ok(value),
                    attempts: attempt,
                };
            }
            Err(e) if !e.is_retryable() => {
                tracing::warn!("Not retrying {} after attempt {}: {}", target, attempt, e);
                return RetryOutcome {
                    result: Err(e),
                    attempts: attempt,
                };
            }
            Err(e) if attempt >= max_attempts => {
                tracing::error!("Giving up on {} after {} attempts: {}", target, attempt, e);
                return RetryOutcome {
                    result: Err(e),
                    attempts: attempt,
                };
            }
            Err(e) => {
                let delay = policy.delay_after(attempt);
                tracing::warn!(
                    "Retry {}/{} for {}. Waiting {:?} (reason: {})",
                    attempt,
                    max_attempts,
                    target,
                    delay,
                    e
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
