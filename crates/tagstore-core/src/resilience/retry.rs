//! Retry policy and the retry loop.

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use super::classify::is_retryable;
use crate::domain::StoreError;

/// Retry policy for failed operations.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt. Total attempts are `max_retries + 1`.
    pub max_retries: u32,

    /// Delay before the first retry.
    pub base_delay: Duration,

    /// Backoff multiplier for exponential backoff.
    pub multiplier: f64,

    /// Upper bound for any single delay.
    pub max_delay: Duration,

    /// Scale each delay by a random factor in `[0.5, 1.0]`.
    pub jitter: bool,
}

impl RetryPolicy {
    /// 3 retries, 1s base, doubling, capped at 30s, with jitter.
    pub fn default_v1() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(30),
            jitter: true,
        }
    }

    /// Delay before retry number `retry` (0-indexed), before jitter.
    ///
    /// `delay = min(base_delay * multiplier^retry, max_delay)`
    ///
    /// Example with base_delay=1s, multiplier=2.0, max_delay=30s:
    /// - retry 0: 1s
    /// - retry 1: 2s
    /// - retry 2: 4s
    /// - retry 5: 30s (capped)
    pub fn next_delay(&self, retry: u32) -> Duration {
        let base_secs = self.base_delay.as_secs_f64();
        let delay_secs = base_secs * self.multiplier.powi(retry.min(i32::MAX as u32) as i32);
        if !delay_secs.is_finite() || delay_secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(delay_secs)
    }

    /// Apply a jitter factor, clamped to `[0.5, 1.0]`. No-op when jitter is off.
    pub fn jittered(&self, delay: Duration, factor: f64) -> Duration {
        if !self.jitter {
            return delay;
        }
        delay.mul_f64(factor.clamp(0.5, 1.0))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::default_v1()
    }
}

/// What to do after a failed attempt.
#[derive(Debug)]
pub enum RetryStep {
    /// Sleep for `delay`, then run attempt number `attempt` (1-indexed).
    Retry { attempt: u32, delay: Duration },
    /// Stop and surface this error.
    GiveUp(StoreError),
}

/// Retry bookkeeping, independent of any timer.
///
/// Drive it by reporting each failure; it answers with the next step. The
/// loop that sleeps lives in [`RetryManager`], so tests can step the state
/// by hand.
#[derive(Debug, Clone, Default)]
pub struct RetryState {
    attempt: u32,
    next_delay: Option<Duration>,
    last_error: Option<String>,
}

impl RetryState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempts made so far.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn next_delay(&self) -> Option<Duration> {
        self.next_delay
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Record a failed attempt. `jitter_factor` is only used when the
    /// policy has jitter enabled.
    pub fn record_failure(&mut self, policy: &RetryPolicy, err: StoreError, jitter_factor: f64) -> RetryStep {
        self.attempt += 1;
        self.last_error = Some(err.to_string());

        if !is_retryable(&err) {
            self.next_delay = None;
            return RetryStep::GiveUp(err);
        }
        let retries_used = self.attempt - 1;
        if retries_used >= policy.max_retries {
            self.next_delay = None;
            return RetryStep::GiveUp(StoreError::MaxRetriesExceeded {
                attempts: self.attempt,
                last: Box::new(err),
            });
        }
        let delay = policy.jittered(policy.next_delay(retries_used), jitter_factor);
        self.next_delay = Some(delay);
        RetryStep::Retry {
            attempt: self.attempt + 1,
            delay,
        }
    }
}

/// Runs an operation under a [`RetryPolicy`].
#[derive(Debug, Clone, Default)]
pub struct RetryManager {
    policy: RetryPolicy,
}

impl RetryManager {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Call `op` until it succeeds, fails with a non-retryable error, or the
    /// retry budget is spent.
    pub async fn execute<T, F, Fut>(&self, name: &str, mut op: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let mut state = RetryState::new();
        loop {
            let err = match op().await {
                Ok(value) => {
                    if state.attempt() > 0 {
                        debug!(operation = name, attempts = state.attempt() + 1, "succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };
            let factor = rand::thread_rng().gen_range(0.5..=1.0);
            match state.record_failure(&self.policy, err, factor) {
                RetryStep::Retry { attempt, delay } => {
                    warn!(
                        operation = name,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = state.last_error().unwrap_or_default(),
                        "retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                RetryStep::GiveUp(err) => return Err(err),
            }
        }
    }
}
