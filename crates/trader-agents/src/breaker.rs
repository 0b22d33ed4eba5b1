use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    Closed,
    Open,
    /// Cooldown elapsed; one trial call decides whether to close or re-open.
    HalfOpen,
}

#[derive(Debug)]
struct Inner {
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
}

/// Consecutive-failure circuit breaker guarding one analyst.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    failure_threshold: u32,
    cooldown: Duration,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            name: name.into(),
            failure_threshold: failure_threshold.max(1),
            cooldown,
            inner: Mutex::new(Inner {
                consecutive_failures: 0,
                opened_at: None,
                trial_in_flight: false,
            }),
        }
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        // State is a couple of counters; a poisoned lock still holds usable data.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn state_of(&self, inner: &Inner) -> BreakerState {
        match inner.opened_at {
            None => BreakerState::Closed,
            Some(opened) if opened.elapsed() < self.cooldown => BreakerState::Open,
            Some(_) => BreakerState::HalfOpen,
        }
    }

    pub fn state(&self) -> BreakerState {
        let inner = self.inner();
        self.state_of(&inner)
    }

    /// Whether a call may go through now. In half-open state only one trial
    /// call is admitted until its result is recorded.
    pub fn allow(&self) -> bool {
        let mut inner = self.inner();
        match self.state_of(&inner) {
            BreakerState::Closed => true,
            BreakerState::Open => false,
            BreakerState::HalfOpen => {
                if inner.trial_in_flight {
                    false
                } else {
                    inner.trial_in_flight = true;
                    true
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner();
        if inner.opened_at.is_some() {
            info!(analyst = %self.name, "Circuit breaker closed");
        }
        inner.consecutive_failures = 0;
        inner.opened_at = None;
        inner.trial_in_flight = false;
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner();
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);

        let trial_failed = inner.trial_in_flight;
        inner.trial_in_flight = false;

        if trial_failed || inner.consecutive_failures >= self.failure_threshold {
            inner.opened_at = Some(Instant::now());
            warn!(
                analyst = %self.name,
                consecutive_failures = inner.consecutive_failures,
                cooldown_secs = self.cooldown.as_secs(),
                "Circuit breaker opened"
            );
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.inner().consecutive_failures
    }

    /// Like [`allow`](Self::allow), but hands back a permit that travels
    /// with the call and settles the breaker from wherever the call ends.
    pub fn try_acquire(self: &Arc<Self>) -> Option<BreakerPermit> {
        self.allow().then(|| BreakerPermit {
            breaker: Arc::clone(self),
            settled: false,
        })
    }

    /// Release a half-open trial whose call was cancelled before it
    /// produced a result. The outcome is unknown, so nothing is counted.
    fn abandon(&self) {
        let mut inner = self.inner();
        if inner.trial_in_flight {
            inner.trial_in_flight = false;
            warn!(analyst = %self.name, "Breaker trial abandoned");
        }
    }
}

/// An admitted call. Dropping it unsettled (the call was cancelled or
/// panicked) frees the half-open trial slot for the next caller.
#[derive(Debug)]
pub struct BreakerPermit {
    breaker: Arc<CircuitBreaker>,
    settled: bool,
}

impl BreakerPermit {
    pub fn success(mut self) {
        self.settled = true;
        self.breaker.record_success();
    }

    pub fn failure(mut self) {
        self.settled = true;
        self.breaker.record_failure();
    }
}

impl Drop for BreakerPermit {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.abandon();
        }
    }
}
