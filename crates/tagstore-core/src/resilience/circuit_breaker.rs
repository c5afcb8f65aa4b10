//! Named circuit breakers.
//!
//! State machine:
//! - CLOSED: calls pass; transient failures are counted.
//! - OPEN: calls fail fast with `CircuitOpen` until the recovery deadline.
//! - HALF_OPEN: one trial call passes. Success closes the circuit and zeroes
//!   the count; failure re-opens it with a new deadline. A trial dropped
//!   before it finishes hands the slot back, so the next call becomes the
//!   trial.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{info, warn};

use super::classify::counts_as_failure;
use crate::domain::StoreError;
use crate::ports::Clock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakerPolicy {
    /// Counted failures that trip the breaker.
    pub failure_threshold: u32,
    /// How long the breaker stays open before a trial call.
    pub recovery_timeout: Duration,
}

impl BreakerPolicy {
    pub fn default_v1() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
        }
    }
}

impl Default for BreakerPolicy {
    fn default() -> Self {
        Self::default_v1()
    }
}

/// Serialisable snapshot of a breaker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakerStatus {
    pub name: String,
    pub state: BreakerState,
    pub failure_count: u32,
    pub next_attempt: Option<DateTime<Utc>>,
    pub last_failure: Option<DateTime<Utc>>,
}

#[derive(Debug)]
struct Inner {
    state: BreakerState,
    failure_count: u32,
    next_attempt: Option<DateTime<Utc>>,
    last_failure: Option<DateTime<Utc>>,
    trial_in_flight: bool,
}

pub struct CircuitBreaker {
    name: String,
    policy: BreakerPolicy,
    clock: Arc<dyn Clock>,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, policy: BreakerPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            name: name.into(),
            policy,
            clock,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                failure_count: 0,
                next_attempt: None,
                last_failure: None,
                trial_in_flight: false,
            }),
        }
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> BreakerState {
        self.inner().state
    }

    pub fn failure_count(&self) -> u32 {
        self.inner().failure_count
    }

    pub fn status(&self) -> BreakerStatus {
        let inner = self.inner();
        BreakerStatus {
            name: self.name.clone(),
            state: inner.state,
            failure_count: inner.failure_count,
            next_attempt: inner.next_attempt,
            last_failure: inner.last_failure,
        }
    }

    /// Force the breaker back to CLOSED.
    pub fn reset(&self) {
        let mut inner = self.inner();
        inner.state = BreakerState::Closed;
        inner.failure_count = 0;
        inner.next_attempt = None;
        inner.trial_in_flight = false;
    }

    /// Run `call` through the breaker. The future is not polled when the
    /// circuit is open.
    pub async fn call<T, Fut>(&self, call: Fut) -> Result<T, StoreError>
    where
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let mut trial = TrialGuard {
            breaker: self,
            armed: self.admit()?,
        };
        let result = call.await;
        trial.armed = false;
        match result {
            Ok(value) => {
                self.on_success();
                Ok(value)
            }
            Err(err) => {
                if counts_as_failure(&err) {
                    self.on_failure();
                } else {
                    self.on_neutral();
                }
                Err(err)
            }
        }
    }

    /// Admit one call. `Ok(true)` means the call is the HALF_OPEN trial.
    fn admit(&self) -> Result<bool, StoreError> {
        let now = self.clock.now();
        let mut inner = self.inner();
        let state = inner.state;
        match state {
            BreakerState::Closed => Ok(false),
            BreakerState::Open => {
                let retry_at = inner.next_attempt.unwrap_or(now);
                if now < retry_at {
                    return Err(self.open_error(retry_at));
                }
                inner.state = BreakerState::HalfOpen;
                inner.trial_in_flight = true;
                info!(breaker = %self.name, "circuit half-open; allowing one trial call");
                Ok(true)
            }
            BreakerState::HalfOpen if inner.trial_in_flight => {
                Err(self.open_error(inner.next_attempt.unwrap_or(now)))
            }
            BreakerState::HalfOpen => {
                inner.trial_in_flight = true;
                Ok(true)
            }
        }
    }

    fn open_error(&self, retry_at: DateTime<Utc>) -> StoreError {
        StoreError::CircuitOpen {
            breaker: self.name.clone(),
            retry_at,
        }
    }

    fn on_success(&self) {
        let mut inner = self.inner();
        if inner.state != BreakerState::Closed {
            info!(breaker = %self.name, "circuit closed");
        }
        inner.state = BreakerState::Closed;
        inner.failure_count = 0;
        inner.next_attempt = None;
        inner.trial_in_flight = false;
    }

    /// A failure that says nothing about the dependency (bad request, not
    /// found). A trial ending this way still proves the dependency answers.
    fn on_neutral(&self) {
        let half_open = self.inner().state == BreakerState::HalfOpen;
        if half_open {
            self.on_success();
        }
    }

    /// The trial future was dropped without an outcome. Back to OPEN with the
    /// deadline that already passed, so the next call is admitted as the trial.
    fn on_abandoned_trial(&self) {
        let mut inner = self.inner();
        if inner.state == BreakerState::HalfOpen && inner.trial_in_flight {
            inner.state = BreakerState::Open;
            inner.trial_in_flight = false;
            warn!(breaker = %self.name, "trial call dropped before completion");
        }
    }

    fn on_failure(&self) {
        let now = self.clock.now();
        let mut inner = self.inner();
        inner.failure_count += 1;
        inner.last_failure = Some(now);
        inner.trial_in_flight = false;
        if inner.state == BreakerState::HalfOpen || inner.failure_count >= self.policy.failure_threshold {
            let retry_at = chrono::Duration::from_std(self.policy.recovery_timeout)
                .ok()
                .and_then(|recovery| now.checked_add_signed(recovery))
                .unwrap_or(DateTime::<Utc>::MAX_UTC);
            inner.state = BreakerState::Open;
            inner.next_attempt = Some(retry_at);
            warn!(
                breaker = %self.name,
                failures = inner.failure_count,
                %retry_at,
                "circuit opened"
            );
        }
    }
}

/// Clears the trial slot when the admitted future never completes.
struct TrialGuard<'a> {
    breaker: &'a CircuitBreaker,
    armed: bool,
}

impl Drop for TrialGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.breaker.on_abandoned_trial();
        }
    }
}

/// Breakers by name, created on first use with a shared policy.
pub struct BreakerRegistry {
    policy: BreakerPolicy,
    clock: Arc<dyn Clock>,
    breakers: Mutex<BTreeMap<String, Arc<CircuitBreaker>>>,
}

impl BreakerRegistry {
    pub fn new(policy: BreakerPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            policy,
            clock,
            breakers: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn get(&self, name: &str) -> Arc<CircuitBreaker> {
        let mut breakers = self.breakers.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(breakers.entry(name.to_string()).or_insert_with(|| {
            Arc::new(CircuitBreaker::new(name, self.policy.clone(), Arc::clone(&self.clock)))
        }))
    }

    /// Status of every breaker, ordered by name.
    pub fn statuses(&self) -> Vec<BreakerStatus> {
        let breakers = self.breakers.lock().unwrap_or_else(|e| e.into_inner());
        breakers.values().map(|b| b.status()).collect()
    }
}
