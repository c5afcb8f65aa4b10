//! Circuit breakers and retries around store operations.
//!
//! Retry wraps the breaker: every attempt goes through the named breaker, so
//! an attempt against an open circuit uses up a retry slot without doing any
//! real work.

pub mod circuit_breaker;
pub mod classify;
pub mod retry;

use std::future::Future;
use std::sync::Arc;

pub use circuit_breaker::{BreakerPolicy, BreakerRegistry, BreakerState, BreakerStatus, CircuitBreaker};
pub use classify::{counts_as_failure, is_retryable};
pub use retry::{RetryManager, RetryPolicy, RetryState, RetryStep};

use crate::domain::StoreError;
use crate::ports::Clock;

pub struct ResilienceWrapper {
    retry: RetryManager,
    breakers: BreakerRegistry,
}

impl ResilienceWrapper {
    pub fn new(retry: RetryPolicy, breaker: BreakerPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            retry: RetryManager::new(retry),
            breakers: BreakerRegistry::new(breaker, clock),
        }
    }

    /// Run `op` under the breaker called `name`, retrying per policy.
    pub async fn execute<T, F, Fut>(&self, name: &str, mut op: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let breaker = self.breakers.get(name);
        self.retry.execute(name, || breaker.call(op())).await
    }

    pub fn breaker(&self, name: &str) -> Arc<CircuitBreaker> {
        self.breakers.get(name)
    }

    pub fn breaker_statuses(&self) -> Vec<BreakerStatus> {
        self.breakers.statuses()
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        self.retry.policy()
    }
}
