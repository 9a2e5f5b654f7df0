//! Circuit breaker to stop hammering a failing upstream.
//!
//! Failures are counted over a rolling time window. Once enough calls have
//! been seen and the error rate crosses the threshold, the circuit opens and
//! calls are rejected without touching the network. After the sleep window a
//! single probe call is let through to test recovery.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use skycast_core::Upstream;
use std::collections::VecDeque;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

/// Circuit breaker configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Calls in the window before the error rate is evaluated
    pub volume_threshold: u32,

    /// Error rate, in percent, that trips the circuit
    pub error_threshold_percent: u8,

    /// Rolling window for counting outcomes
    #[serde(with = "crate::config::duration_str")]
    pub time_window: Duration,

    /// Time the circuit stays open before a probe is allowed
    #[serde(with = "crate::config::duration_str")]
    pub sleep_window: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            volume_threshold: 5,
            error_threshold_percent: 50,
            time_window: Duration::from_secs(60),
            sleep_window: Duration::from_secs(30),
        }
    }
}

/// State of a circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation
    Closed,

    /// Rejecting calls until the sleep window passes
    Open { opened_at: Instant },

    /// One probe call decides whether to close or reopen
    HalfOpen { probe_in_flight: bool },
}

/// Returned when a call is rejected by an open circuit.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("{upstream} circuit is open")]
pub struct CircuitOpenError {
    pub upstream: Upstream,
}

/// Outcome of [`CircuitBreaker::run`].
#[derive(Error, Debug)]
pub enum CircuitError<E> {
    #[error(transparent)]
    Open(#[from] CircuitOpenError),

    #[error(transparent)]
    Operation(E),
}

/// Decides whether an operation error counts against the circuit.
///
/// Errors that say nothing about upstream health (a lookup that simply had
/// no match) should return `false`.
pub trait CircuitFailure {
    fn is_circuit_failure(&self) -> bool {
        true
    }
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    // (when, failed)
    outcomes: VecDeque<(Instant, bool)>,
}

/// Per-upstream circuit breaker.
///
/// One instance is shared by every caller of the same upstream; the three
/// upstreams each get their own so an outage in one never trips another.
#[derive(Debug)]
pub struct CircuitBreaker {
    upstream: Upstream,
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    /// Create a closed circuit for an upstream.
    pub fn new(upstream: Upstream, config: CircuitBreakerConfig) -> Self {
        Self {
            upstream,
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                outcomes: VecDeque::new(),
            }),
        }
    }

    pub fn upstream(&self) -> Upstream {
        self.upstream
    }

    /// Run `operation` under the breaker.
    ///
    /// Rejects immediately when open; otherwise records the outcome and
    /// hands back the operation's own result.
    pub async fn run<T, E, F, Fut>(&self, operation: F) -> Result<T, CircuitError<E>>
    where
        E: CircuitFailure,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let permit = self.acquire()?;
        let result = operation().await;
        let failed = matches!(&result, Err(e) if e.is_circuit_failure());
        permit.complete(failed);
        result.map_err(CircuitError::Operation)
    }

    /// True when a call made now would be rejected.
    ///
    /// Does not change state; an expired open circuit reports closed here
    /// and moves to half-open on the next call.
    pub fn is_open(&self) -> bool {
        let inner = self.inner.lock();
        match inner.state {
            CircuitState::Open { opened_at } => opened_at.elapsed() < self.config.sleep_window,
            CircuitState::HalfOpen { probe_in_flight } => probe_in_flight,
            CircuitState::Closed => false,
        }
    }

    /// Current state of the circuit.
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Force the circuit closed and forget recorded outcomes.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.state = CircuitState::Closed;
        inner.outcomes.clear();
    }

    fn acquire(&self) -> Result<Permit<'_>, CircuitOpenError> {
        let mut inner = self.inner.lock();
        let rejected = CircuitOpenError {
            upstream: self.upstream,
        };

        match inner.state {
            CircuitState::Closed => Ok(Permit::new(self, false)),
            CircuitState::Open { opened_at } => {
                if opened_at.elapsed() < self.config.sleep_window {
                    return Err(rejected);
                }
                inner.state = CircuitState::HalfOpen {
                    probe_in_flight: true,
                };
                tracing::info!(
                    upstream = %self.upstream,
                    "Circuit half-open, sending probe"
                );
                Ok(Permit::new(self, true))
            }
            CircuitState::HalfOpen {
                probe_in_flight: true,
            } => Err(rejected),
            CircuitState::HalfOpen {
                probe_in_flight: false,
            } => {
                inner.state = CircuitState::HalfOpen {
                    probe_in_flight: true,
                };
                Ok(Permit::new(self, true))
            }
        }
    }

    fn record(&self, probe: bool, failed: bool) {
        let mut inner = self.inner.lock();
        let now = Instant::now();

        if probe {
            if failed {
                inner.state = CircuitState::Open { opened_at: now };
                tracing::warn!(
                    upstream = %self.upstream,
                    "Circuit reopened after failed recovery probe"
                );
            } else {
                inner.state = CircuitState::Closed;
                inner.outcomes.clear();
                tracing::info!(
                    upstream = %self.upstream,
                    "Circuit closed after successful recovery"
                );
            }
            return;
        }

        // A call admitted while closed may finish after another call tripped
        // the circuit; only closed circuits accumulate outcomes.
        if inner.state != CircuitState::Closed {
            return;
        }

        inner.outcomes.push_back((now, failed));
        let window = self.config.time_window;
        while let Some(&(at, _)) = inner.outcomes.front() {
            if now.duration_since(at) > window {
                inner.outcomes.pop_front();
            } else {
                break;
            }
        }

        let total = inner.outcomes.len() as u64;
        let failures = inner.outcomes.iter().filter(|(_, f)| *f).count() as u64;

        if total >= u64::from(self.config.volume_threshold)
            && failures * 100 >= u64::from(self.config.error_threshold_percent) * total
        {
            inner.state = CircuitState::Open { opened_at: now };
            inner.outcomes.clear();
            tracing::warn!(
                upstream = %self.upstream,
                failures,
                calls = total,
                "Circuit opened after error rate crossed threshold"
            );
        }
    }

    fn release_probe(&self) {
        let mut inner = self.inner.lock();
        if inner.state
            == (CircuitState::HalfOpen {
                probe_in_flight: true,
            })
        {
            inner.state = CircuitState::HalfOpen {
                probe_in_flight: false,
            };
        }
    }
}

/// Admission ticket for one call.
///
/// Dropping an uncompleted probe permit frees the probe slot, so a
/// cancelled probe cannot wedge the circuit half-open.
struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    probe: bool,
    completed: bool,
}

impl<'a> Permit<'a> {
    fn new(breaker: &'a CircuitBreaker, probe: bool) -> Self {
        Self {
            breaker,
            probe,
            completed: false,
        }
    }

    fn complete(mut self, failed: bool) {
        self.completed = true;
        self.breaker.record(self.probe, failed);
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if !self.completed && self.probe {
            self.breaker.release_probe();
        }
    }
}
