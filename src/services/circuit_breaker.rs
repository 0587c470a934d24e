//! Circuit Breaker
//!
//! Counter-plus-timer guard around the upstream API, shared by every
//! pipeline invocation. Stops hammering a failing dependency and lets a
//! single probe through after the cool-down.

use crate::metrics::PipelineMetrics;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Observable breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl BreakerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: BreakerState,
    failures: u32,
    last_failure: Option<Instant>,
}

/// Shared breaker. Transitions are serialized behind one mutex so
/// `try_acquire` observations are globally consistent.
pub struct CircuitBreaker {
    failure_threshold: u32,
    timeout: Duration,
    inner: Mutex<BreakerInner>,
    metrics: Arc<PipelineMetrics>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, timeout: Duration, metrics: Arc<PipelineMetrics>) -> Self {
        Self {
            failure_threshold,
            timeout,
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                failures: 0,
                last_failure: None,
            }),
            metrics,
        }
    }

    /// Asks permission to place one upstream call.
    ///
    /// `Closed` always grants. `Open` grants once the cool-down has
    /// elapsed, and that grant IS the half-open probe: until its outcome
    /// is recorded, every other caller is rejected.
    pub fn try_acquire(&self) -> bool {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        match inner.state {
            BreakerState::Closed => true,
            BreakerState::HalfOpen => false,
            BreakerState::Open => {
                let cooled_down = inner
                    .last_failure
                    .is_some_and(|at| at.elapsed() >= self.timeout);
                if cooled_down {
                    self.transition(&mut inner, BreakerState::HalfOpen);
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Non-consuming query: is the upstream currently rejected outright?
    ///
    /// Unlike `try_acquire` this never takes the half-open probe, so it
    /// is safe to ask before a cache lookup. A cooled-down open breaker
    /// reports unblocked; the probe itself is only taken when a call
    /// actually reaches for the upstream.
    pub fn is_blocked(&self) -> bool {
        let inner = self.inner.lock().expect("breaker lock poisoned");
        match inner.state {
            BreakerState::Closed => false,
            BreakerState::HalfOpen => true,
            BreakerState::Open => !inner
                .last_failure
                .is_some_and(|at| at.elapsed() >= self.timeout),
        }
    }

    /// Records a successful upstream call.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        inner.failures = 0;
        if inner.state != BreakerState::Closed {
            self.transition(&mut inner, BreakerState::Closed);
        }
    }

    /// Records a failed upstream call (every transport/HTTP error, each
    /// retry attempt included).
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        inner.last_failure = Some(Instant::now());
        match inner.state {
            BreakerState::HalfOpen => {
                // Failed probe: straight back to open.
                self.transition(&mut inner, BreakerState::Open);
            }
            BreakerState::Closed => {
                inner.failures += 1;
                if inner.failures >= self.failure_threshold {
                    self.transition(&mut inner, BreakerState::Open);
                }
            }
            BreakerState::Open => {}
        }
    }

    pub fn state(&self) -> BreakerState {
        self.inner.lock().expect("breaker lock poisoned").state
    }

    pub fn failures(&self) -> u32 {
        self.inner.lock().expect("breaker lock poisoned").failures
    }

    fn transition(&self, inner: &mut BreakerInner, to: BreakerState) {
        tracing::warn!(from = inner.state.as_str(), to = to.as_str(), "circuit breaker transition");
        self.metrics
            .breaker_transitions_total
            .with_label_values(&[to.as_str()])
            .inc();
        inner.state = to;
    }
}
